//! Send text tool: replies in the current chat, optionally in a thread or
//! with a screen effect.

use async_trait::async_trait;
use convoy_core::tool::REPLY_TARGET_ARG;
use convoy_core::{Delivery, SendTextRequest, Tool, ToolContext, ToolError, ToolResult};
use tracing::{debug, info};

use crate::args::{optional_str, optional_u32, required_str};

pub struct SendTextTool;

#[async_trait]
impl Tool for SendTextTool {
    fn name(&self) -> &str {
        "send_text"
    }

    fn description(&self) -> &str {
        "Send a text reply in the current chat. You may apply a message effect sparingly (e.g. confetti for celebrations)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "chatId": {"type": "string"},
                "message": {"type": "string"},
                REPLY_TARGET_ARG: {
                    "type": "string",
                    "description": "Message id to reply to in a thread. Always set this when the original message is in a thread."
                },
                "effect": {
                    "type": "string",
                    "description": "Optional message effect, used sparingly.",
                    "enum": EFFECT_NAMES
                },
                "partIndex": {"type": "integer", "minimum": 0}
            },
            "required": ["chatId", "message"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let chat_id = required_str(&arguments, "chatId")?;
        let message = required_str(&arguments, "message")?;
        if chat_id != ctx.run.chat_id {
            return Err(ToolError::InvalidArguments(format!(
                "chatId '{chat_id}' is not the current conversation"
            )));
        }

        if !ctx.conversation.is_latest(&ctx.run).await {
            debug!(chat_id = %chat_id, sequence = ctx.run.sequence, "send_text skipped, run superseded");
            return Ok(ToolResult::ok("not sent: a newer message arrived in this chat"));
        }

        let mut request = SendTextRequest::new(chat_id, message)
            .replying_to(optional_str(&arguments, REPLY_TARGET_ARG).map(str::to_string));
        request.part_index = optional_u32(&arguments, "partIndex");
        request.effect_id = optional_str(&arguments, "effect")
            .and_then(effect_id)
            .map(str::to_string);

        ctx.transport
            .send_text(request)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            })?;
        info!(chat_id = %chat_id, "Text sent by tool");
        ctx.conversation
            .record_assistant_turn(&ctx.run, message.to_string())
            .await;

        Ok(ToolResult::ok("sent").with_delivery(Delivery::Text))
    }
}

const EFFECT_NAMES: &[&str] = &[
    "slam",
    "gentle",
    "invisible",
    "loud",
    "confetti",
    "echo",
    "fireworks",
    "happy_birthday",
    "heart",
    "love",
    "lasers",
    "shooting_star",
    "sparkles",
    "spotlight",
];

/// Platform identifier for an effect name; `None` for unknown names.
pub fn effect_id(name: &str) -> Option<&'static str> {
    let normalized = name.trim().to_ascii_lowercase().replace(['-', ' '], "_");
    let id = match normalized.as_str() {
        "slam" | "impact" => "com.apple.MobileSMS.expressivesend.impact",
        "gentle" => "com.apple.MobileSMS.expressivesend.gentle",
        "invisible" | "invisible_ink" => "com.apple.MobileSMS.expressivesend.invisibleink",
        "loud" => "com.apple.MobileSMS.expressivesend.loud",
        "confetti" => "com.apple.messages.effect.CKConfettiEffect",
        "echo" => "com.apple.messages.effect.CKEchoEffect",
        "fireworks" => "com.apple.messages.effect.CKFireworksEffect",
        "happy_birthday" | "celebration" => "com.apple.messages.effect.CKHappyBirthdayEffect",
        "heart" | "love" => "com.apple.messages.effect.CKHeartEffect",
        "lasers" => "com.apple.messages.effect.CKLasersEffect",
        "shooting_star" => "com.apple.messages.effect.CKShootingStarEffect",
        "sparkles" => "com.apple.messages.effect.CKSparklesEffect",
        "spotlight" => "com.apple.messages.effect.CKSpotlightEffect",
        _ => return None,
    };
    Some(id)
}
