//! Responsiveness tool: how eagerly the assistant joins in this chat.

use async_trait::async_trait;
use convoy_core::{Responsiveness, Tool, ToolContext, ToolError, ToolResult};
use tracing::info;

use crate::args::optional_str;

pub struct ResponsivenessTool;

#[async_trait]
impl Tool for ResponsivenessTool {
    fn name(&self) -> &str {
        "assistant_responsiveness"
    }

    fn description(&self) -> &str {
        "Update how responsive the assistant is in this conversation. Use less_responsive to participate less, more_responsive to be more active, silent to only answer when addressed with the activation word, and default to reset."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "responsiveness": {
                    "type": "string",
                    "enum": ["less_responsive", "more_responsive", "silent", "default"]
                }
            },
            "required": ["responsiveness"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let Some(raw) = optional_str(&arguments, "responsiveness") else {
            return Ok(ToolResult::failed("missing responsiveness"));
        };
        let Some(mode) = Responsiveness::parse(raw) else {
            return Ok(ToolResult::failed("invalid responsiveness"));
        };

        let chat_id = &ctx.run.chat_id;
        if mode == Responsiveness::Default {
            ctx.settings.clear_responsiveness(chat_id).await;
        } else {
            ctx.settings.set_responsiveness(chat_id, mode).await;
        }
        info!(chat_id = %chat_id, mode = mode.as_str(), "Responsiveness updated");
        Ok(ToolResult::ok(format!("updated to {}", mode.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConversation, FakeTransport, context};
    use convoy_core::IncomingMessage;
    use std::sync::Arc;

    #[tokio::test]
    async fn sets_and_resets_mode() {
        let ctx = context(
            IncomingMessage::new("chat-1"),
            Arc::new(FakeConversation::new()),
            Arc::new(FakeTransport::default()),
        );

        let result = ResponsivenessTool
            .execute(&ctx, serde_json::json!({"responsiveness": "silent"}))
            .await
            .unwrap();
        assert_eq!(result.output, "updated to silent");
        assert_eq!(ctx.settings.responsiveness("chat-1").await, Responsiveness::Silent);

        ResponsivenessTool
            .execute(&ctx, serde_json::json!({"responsiveness": "default"}))
            .await
            .unwrap();
        assert_eq!(ctx.settings.responsiveness("chat-1").await, Responsiveness::Default);

        let bad = ResponsivenessTool
            .execute(&ctx, serde_json::json!({"responsiveness": "loud"}))
            .await
            .unwrap();
        assert!(!bad.success);
    }
}
