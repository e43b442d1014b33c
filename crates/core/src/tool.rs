//! Tool trait: the abstraction over model-invocable capabilities.
//!
//! The engine does not know what tools do. It dispatches by name, hides
//! group-only tools outside group chats, and fills in the reply target when
//! a tool accepts one and the model left it out.

use crate::conversation::{AgentWorkflowContext, ConversationAccess};
use crate::error::ToolError;
use crate::message::IncomingMessage;
use crate::provider::ToolDefinition;
use crate::settings::SettingsStore;
use crate::transport::Transport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Argument name a tool uses for the message it replies or reacts to.
pub const REPLY_TARGET_ARG: &str = "selectedMessageId";

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's call_id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// An outward effect a tool produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Text,
    Reaction,
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// Text fed back to the model
    pub output: String,

    /// Set when the tool actually sent something to the chat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered: Option<Delivery>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            delivered: None,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            delivered: None,
        }
    }

    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivered = Some(delivery);
        self
    }
}

/// Everything a tool handler can reach while it runs.
#[derive(Clone)]
pub struct ToolContext {
    pub run: AgentWorkflowContext,
    /// The inbound message that started the run
    pub message: IncomingMessage,
    pub conversation: Arc<dyn ConversationAccess>,
    pub transport: Arc<dyn Transport>,
    pub settings: Arc<dyn SettingsStore>,
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "send_text").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Tools that only make sense with several participants.
    fn group_only(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }

    fn accepts_reply_target(&self) -> bool {
        self.parameters_schema()
            .get("properties")
            .and_then(|p| p.get(REPLY_TARGET_ARG))
            .is_some()
    }
}

/// A name-keyed registry of tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Definitions visible in a chat, sorted by name so requests are stable.
    pub fn definitions_for(&self, is_group: bool) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .filter(|t| is_group || !t.group_only())
            .map(|t| t.to_definition())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool call in the context of one run.
    pub async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        if tool.group_only() && !ctx.message.is_group_chat() {
            return Err(ToolError::GroupOnly(call.name.clone()));
        }

        let mut arguments = match &call.arguments {
            serde_json::Value::Null => serde_json::json!({}),
            serde_json::Value::Object(_) => call.arguments.clone(),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "expected a JSON object, got {other}"
                )));
            }
        };

        if tool.accepts_reply_target() {
            inject_reply_target(&mut arguments, ctx.message.thread_root());
        }

        tool.execute(ctx, arguments).await
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn inject_reply_target(arguments: &mut serde_json::Value, thread_root: Option<&str>) {
    let Some(root) = thread_root else { return };
    let Some(map) = arguments.as_object_mut() else { return };
    let missing = match map.get(REPLY_TARGET_ARG) {
        None | Some(serde_json::Value::Null) => true,
        Some(serde_json::Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    };
    if missing {
        map.insert(REPLY_TARGET_ARG.to_string(), serde_json::Value::String(root.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "selectedMessageId": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            _ctx: &ToolContext,
            arguments: serde_json::Value,
        ) -> Result<ToolResult, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("");
            let target = arguments[REPLY_TARGET_ARG].as_str().unwrap_or("-");
            Ok(ToolResult::ok(format!("{text}@{target}")))
        }
    }

    struct GroupTool;

    #[async_trait]
    impl Tool for GroupTool {
        fn name(&self) -> &str {
            "group_only"
        }
        fn description(&self) -> &str {
            "Only in groups"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        fn group_only(&self) -> bool {
            true
        }
        async fn execute(
            &self,
            _ctx: &ToolContext,
            _arguments: serde_json::Value,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok("done"))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(GroupTool));
        registry
    }

    #[test]
    fn registry_register_and_lookup() {
        let registry = registry();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.names(), vec!["echo", "group_only"]);
    }

    #[test]
    fn group_only_tools_hidden_in_direct_chats() {
        let registry = registry();
        let direct = registry.definitions_for(false);
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].name, "echo");
        assert_eq!(registry.definitions_for(true).len(), 2);
    }

    #[test]
    fn reply_target_injected_only_when_missing() {
        let mut args = serde_json::json!({"text": "hi"});
        inject_reply_target(&mut args, Some("root-1"));
        assert_eq!(args[REPLY_TARGET_ARG], "root-1");

        let mut explicit = serde_json::json!({"text": "hi", "selectedMessageId": "other"});
        inject_reply_target(&mut explicit, Some("root-1"));
        assert_eq!(explicit[REPLY_TARGET_ARG], "other");

        let mut no_thread = serde_json::json!({"text": "hi"});
        inject_reply_target(&mut no_thread, None);
        assert!(no_thread.get(REPLY_TARGET_ARG).is_none());
    }

    #[test]
    fn reply_target_detection_reads_schema() {
        assert!(EchoTool.accepts_reply_target());
        assert!(!GroupTool.accepts_reply_target());
    }
}
