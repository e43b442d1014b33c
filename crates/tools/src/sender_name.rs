//! Sender name tool: remembers what to call a person across chats.

use async_trait::async_trait;
use convoy_core::{Tool, ToolContext, ToolError, ToolResult};
use tracing::info;

use crate::args::optional_str;

pub struct SenderNameTool;

#[async_trait]
impl Tool for SenderNameTool {
    fn name(&self) -> &str {
        "assistant_name"
    }

    fn description(&self) -> &str {
        "Store or forget the current sender's name for use across chats. Only store a name after the person explicitly agrees."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["store", "set", "forget"]},
                "name": {"type": "string"}
            }
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let Some(sender) = ctx.message.sender.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Ok(ToolResult::failed("no sender"));
        };
        let action = optional_str(&arguments, "action")
            .unwrap_or("store")
            .to_ascii_lowercase();

        if matches!(action.as_str(), "forget" | "remove" | "delete") {
            ctx.settings.clear_sender_name(sender).await;
            info!(sender = %sender, "Sender name forgotten");
            return Ok(ToolResult::ok("removed name for sender"));
        }

        let Some(name) = optional_str(&arguments, "name") else {
            return Ok(ToolResult::failed("missing name"));
        };
        ctx.settings.set_sender_name(sender, name).await;
        info!(sender = %sender, "Sender name stored");
        Ok(ToolResult::ok("stored name for sender"))
    }
}
