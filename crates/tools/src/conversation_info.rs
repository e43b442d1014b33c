//! Current conversation info: display name and participants.

use async_trait::async_trait;
use convoy_core::{Tool, ToolContext, ToolError, ToolResult};

pub struct ConversationInfoTool;

#[async_trait]
impl Tool for ConversationInfoTool {
    fn name(&self) -> &str {
        "current_conversation_info"
    }

    fn description(&self) -> &str {
        "Fetch metadata about the current conversation (display name, participants, whether it is a group)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        _arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let info = ctx
            .transport
            .chat_info(&ctx.run.chat_id)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            })?;
        let output = serde_json::json!({
            "display_name": info.display_name,
            "participants": info.participants,
            "is_group": info.is_group || ctx.message.is_group_chat(),
        });
        Ok(ToolResult::ok(output.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConversation, FakeTransport, context};
    use convoy_core::IncomingMessage;
    use std::sync::Arc;

    #[tokio::test]
    async fn reports_participants() {
        let ctx = context(
            IncomingMessage::new("chat-1"),
            Arc::new(FakeConversation::new()),
            Arc::new(FakeTransport::default()),
        );
        let result = ConversationInfoTool.execute(&ctx, serde_json::json!({})).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(value["display_name"], "Weekend plans");
        assert_eq!(value["participants"].as_array().unwrap().len(), 2);
    }
}
