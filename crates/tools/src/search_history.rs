//! Conversation history search: case-insensitive substring match over the
//! platform's stored messages for the current chat.

use async_trait::async_trait;
use convoy_core::{Tool, ToolContext, ToolError, ToolResult};
use serde::Serialize;

use crate::args::{optional_str, optional_usize};

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

pub struct SearchHistoryTool;

#[derive(Serialize)]
struct Hit {
    id: String,
    text: Option<String>,
    sender: Option<String>,
    from_me: bool,
    timestamp: String,
}

#[async_trait]
impl Tool for SearchHistoryTool {
    fn name(&self) -> &str {
        "search_convo_history"
    }

    fn description(&self) -> &str {
        "Search recent message history for the current conversation. Matching is a case-insensitive substring search, so try variations of the text you are looking for."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer", "minimum": 1, "maximum": MAX_LIMIT},
                "offset": {"type": "integer", "minimum": 0}
            }
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let query = optional_str(&arguments, "query").unwrap_or("");
        let limit = optional_usize(&arguments, "limit")
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT);
        let offset = optional_usize(&arguments, "offset").unwrap_or(0);

        let messages = ctx
            .transport
            .search_messages(&ctx.run.chat_id, query, limit, offset)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            })?;
        if messages.is_empty() {
            return Ok(ToolResult::ok("not found"));
        }

        let hits: Vec<Hit> = messages
            .into_iter()
            .map(|m| Hit {
                id: m.id,
                text: m.text,
                sender: m.sender,
                from_me: m.from_me,
                timestamp: m.timestamp.to_rfc3339(),
            })
            .collect();
        let output = serde_json::to_string(&serde_json::json!({ "messages": hits })).map_err(|e| {
            ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(ToolResult::ok(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConversation, FakeTransport, context, platform_message};
    use convoy_core::IncomingMessage;
    use std::sync::Arc;

    fn ctx() -> ToolContext {
        let transport = FakeTransport {
            messages: vec![
                platform_message("m3", "Dinner at 8?"),
                platform_message("m2", "dinner plans tonight"),
                platform_message("m1", "good morning"),
            ],
            ..Default::default()
        };
        context(
            IncomingMessage::new("chat-1"),
            Arc::new(FakeConversation::new()),
            Arc::new(transport),
        )
    }

    #[tokio::test]
    async fn finds_case_insensitive_matches() {
        let result = SearchHistoryTool
            .execute(&ctx(), serde_json::json!({"query": "DINNER"}))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(value["messages"].as_array().unwrap().len(), 2);
        assert_eq!(value["messages"][0]["id"], "m3");
    }

    #[tokio::test]
    async fn offset_and_empty_result() {
        let result = SearchHistoryTool
            .execute(&ctx(), serde_json::json!({"query": "dinner", "offset": 1, "limit": 5}))
            .await
            .unwrap();
        assert!(result.output.contains("m2"));
        assert!(!result.output.contains("m3"));

        let none = SearchHistoryTool
            .execute(&ctx(), serde_json::json!({"query": "karaoke"}))
            .await
            .unwrap();
        assert_eq!(none.output, "not found");
    }
}
