//! Thread context tool: the latest message and images seen in a thread.

use async_trait::async_trait;
use convoy_core::{ThreadContext, Tool, ToolContext, ToolError, ToolResult};
use tracing::debug;

use crate::args::optional_str;

pub struct ThreadContextTool;

#[async_trait]
impl Tool for ThreadContextTool {
    fn name(&self) -> &str {
        "get_thread_context"
    }

    fn description(&self) -> &str {
        "Get the latest message and images for the current thread. Use when asked about the last message in this thread or images sent earlier in it."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "threadRootId": {
                    "type": "string",
                    "description": "Thread to look up (defaults to the current thread)"
                }
            }
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let Some(root) = optional_str(&arguments, "threadRootId").or(ctx.message.thread_root())
        else {
            return Ok(ToolResult::failed("no thread"));
        };

        let context = match ctx.conversation.thread_context(&ctx.run.chat_id, root).await {
            Some(context) => context,
            None => match ctx.transport.get_message(root).await {
                Ok(Some(message)) => ThreadContext {
                    thread_root_id: root.to_string(),
                    last_message_id: Some(message.id),
                    last_text: message.text,
                    last_sender: message.sender,
                    last_timestamp: message.timestamp,
                    last_image_urls: Vec::new(),
                },
                Ok(None) => return Ok(ToolResult::failed("no context")),
                Err(e) => {
                    debug!(thread_root = %root, error = %e, "Thread root lookup failed");
                    return Ok(ToolResult::failed("no context"));
                }
            },
        };

        let output = serde_json::to_string(&context)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            })?;
        Ok(ToolResult::ok(output))
    }
}
