//! Send reaction tool: tapback on a message in the current chat.

use async_trait::async_trait;
use convoy_core::tool::REPLY_TARGET_ARG;
use convoy_core::{ALLOWED_REACTIONS, Delivery, Tool, ToolContext, ToolError, ToolResult};
use tracing::{debug, info};

use crate::args::{optional_str, optional_u32, required_str};

pub struct SendReactionTool;

#[async_trait]
impl Tool for SendReactionTool {
    fn name(&self) -> &str {
        "send_reaction"
    }

    fn description(&self) -> &str {
        "Send a reaction to a specific message. Prefix a reaction with '-' to remove it."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "chatId": {"type": "string"},
                REPLY_TARGET_ARG: {"type": "string"},
                "reaction": {"type": "string", "enum": ALLOWED_REACTIONS},
                "partIndex": {"type": "integer", "minimum": 0}
            },
            "required": ["chatId", "reaction"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let chat_id = required_str(&arguments, "chatId")?;
        let reaction = required_str(&arguments, "reaction")?.to_ascii_lowercase();
        if chat_id != ctx.run.chat_id {
            return Err(ToolError::InvalidArguments(format!(
                "chatId '{chat_id}' is not the current conversation"
            )));
        }
        if !ALLOWED_REACTIONS.contains(&reaction.as_str()) {
            return Err(ToolError::InvalidArguments(format!(
                "Unsupported reaction '{reaction}'"
            )));
        }
        // Outside a thread the target defaults to the message being answered
        let Some(target) = optional_str(&arguments, REPLY_TARGET_ARG).or(ctx.message.id()) else {
            return Err(ToolError::InvalidArguments(format!(
                "Missing '{REPLY_TARGET_ARG}' argument"
            )));
        };

        if !ctx.conversation.is_latest(&ctx.run).await {
            debug!(chat_id = %chat_id, sequence = ctx.run.sequence, "send_reaction skipped, run superseded");
            return Ok(ToolResult::ok("not sent: a newer message arrived in this chat"));
        }

        ctx.transport
            .send_reaction(chat_id, target, &reaction, optional_u32(&arguments, "partIndex"))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            })?;
        info!(chat_id = %chat_id, reaction = %reaction, "Reaction sent by tool");
        ctx.conversation
            .record_assistant_turn(&ctx.run, format!("[reaction: {reaction}]"))
            .await;

        Ok(ToolResult::ok("sent").with_delivery(Delivery::Reaction))
    }
}
