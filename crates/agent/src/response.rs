//! Reading model output: function calls, reply text, reactions, images.

use convoy_core::{InputItem, ModelResponse, OutputContent, OutputItem};
use serde::{Deserialize, Serialize};

/// Reply text meaning "send nothing".
pub const NO_RESPONSE: &str = "NO_RESPONSE";

pub use convoy_core::ALLOWED_REACTIONS;

const REACTION_DIRECTIVE_PREFIX: &str = "[reaction:";

/// A function call the model asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallRequest {
    pub call_id: String,
    pub name: String,
    /// Raw JSON text as produced by the model
    pub arguments: String,
}

pub fn function_calls(response: &ModelResponse) -> Vec<FunctionCallRequest> {
    response
        .output
        .iter()
        .filter_map(|item| match item {
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => Some(FunctionCallRequest {
                call_id: call_id.clone(),
                name: name.clone(),
                arguments: arguments.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// The model's own reasoning and call items, replayed ahead of tool outputs.
pub fn tool_context_items(response: &ModelResponse) -> Vec<InputItem> {
    response
        .output
        .iter()
        .filter_map(|item| match item {
            OutputItem::Reasoning { id, summary } => Some(InputItem::Reasoning {
                id: id.clone(),
                summary: summary.clone(),
            }),
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => Some(InputItem::FunctionCall {
                call_id: call_id.clone(),
                name: name.clone(),
                arguments: arguments.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// All assistant text parts joined with single spaces.
pub fn extract_text(response: &ModelResponse) -> String {
    let parts: Vec<&str> = response
        .output
        .iter()
        .filter_map(|item| match item {
            OutputItem::Message { content, .. } => Some(content),
            _ => None,
        })
        .flatten()
        .filter_map(|part| match part {
            OutputContent::OutputText { text } => Some(text.trim()),
            _ => None,
        })
        .filter(|text| !text.is_empty())
        .collect();
    parts.join(" ")
}

/// Unwrap `{"message": "..."}` replies some models produce.
pub fn normalize_text(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(trimmed) {
            if let Some(serde_json::Value::String(message)) = map.get("message") {
                return message.trim().to_string();
            }
        }
    }
    trimmed.to_string()
}

pub fn is_no_response(text: &str) -> bool {
    text.trim() == NO_RESPONSE
}

/// Any `[reaction: ...]` shaped text, valid name or not.
pub fn looks_like_reaction_directive(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed
        .get(..REACTION_DIRECTIVE_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(REACTION_DIRECTIVE_PREFIX))
        && trimmed.ends_with(']')
}

/// The reaction name when the whole text is `[reaction: <allowed name>]`.
pub fn parse_reaction(text: &str) -> Option<String> {
    if !looks_like_reaction_directive(text) {
        return None;
    }
    let trimmed = text.trim();
    let inner = &trimmed[REACTION_DIRECTIVE_PREFIX.len()..trimmed.len() - 1];
    let name = inner.trim().to_ascii_lowercase();
    ALLOWED_REACTIONS.contains(&name.as_str()).then_some(name)
}

/// Payloads of completed image-generation calls, at most `cap`.
pub fn generated_images(response: &ModelResponse, cap: usize) -> Vec<String> {
    response
        .output
        .iter()
        .filter_map(|item| match item {
            OutputItem::ImageGenerationCall {
                status,
                result: Some(result),
                ..
            } if status.as_deref() == Some("completed") && !result.trim().is_empty() => {
                Some(result.clone())
            }
            _ => None,
        })
        .take(cap)
        .collect()
}
