//! Rename tool: changes a group chat's display name.

use async_trait::async_trait;
use convoy_core::{Tool, ToolContext, ToolError, ToolResult};
use tracing::{debug, info};

use crate::args::required_str;

pub struct RenameConversationTool;

#[async_trait]
impl Tool for RenameConversationTool {
    fn name(&self) -> &str {
        "rename_conversation"
    }

    fn description(&self) -> &str {
        "Rename the current group chat. Use when someone asks to rename the group or the chat."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        })
    }

    fn group_only(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let name = required_str(&arguments, "name")?;
        if !ctx.conversation.is_latest(&ctx.run).await {
            debug!(chat_id = %ctx.run.chat_id, sequence = ctx.run.sequence, "rename skipped, run superseded");
            return Ok(ToolResult::ok("not renamed: a newer message arrived in this chat"));
        }
        ctx.transport
            .rename_chat(&ctx.run.chat_id, name)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            })?;
        info!(chat_id = %ctx.run.chat_id, name = %name, "Chat renamed");
        Ok(ToolResult::ok("renamed"))
    }
}
