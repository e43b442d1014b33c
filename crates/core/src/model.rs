//! Model input and output items.
//!
//! The engine speaks an item-based protocol: the input is an ordered list of
//! messages, prior function calls, and their outputs; the output is a list of
//! assistant messages, function-call requests, reasoning items, and
//! image-generation results. Every type here is serde-serializable so it can
//! cross the durable activity boundary unchanged.

use serde::{Deserialize, Serialize};

/// Who authored an input message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputRole {
    System,
    Developer,
    User,
    Assistant,
}

/// One part of an input message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
    OutputText { text: String },
    InputImage { image_url: String },
    InputFile {
        filename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_url: Option<String>,
    },
}

/// One element of the ordered model input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message {
        role: InputRole,
        content: Vec<ContentPart>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
    Reasoning {
        id: String,
        #[serde(default)]
        summary: Vec<serde_json::Value>,
    },
}

impl InputItem {
    pub fn text(role: InputRole, text: impl Into<String>) -> Self {
        let text = text.into();
        let part = match role {
            InputRole::Assistant => ContentPart::OutputText { text },
            _ => ContentPart::InputText { text },
        };
        Self::Message {
            role,
            content: vec![part],
        }
    }
}

/// One part of an assistant output message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText { text: String },
    Refusal { refusal: String },
    #[serde(other)]
    Unknown,
}

/// One element of a model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    FunctionCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
    Reasoning {
        id: String,
        #[serde(default)]
        summary: Vec<serde_json::Value>,
    },
    ImageGenerationCall {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// A complete model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

impl ModelResponse {
    /// A response holding a single assistant text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            output: vec![OutputItem::Message {
                id: None,
                content: vec![OutputContent::OutputText { text: text.into() }],
            }],
        }
    }

    /// A response holding a single function-call request.
    pub fn function_call(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: String::new(),
            output: vec![OutputItem::FunctionCall {
                id: None,
                call_id: call_id.into(),
                name: name.into(),
                arguments: arguments.to_string(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_items_parse_from_wire_shape() {
        let raw = serde_json::json!({
            "id": "resp_1",
            "output": [
                {"type": "reasoning", "id": "rs_1", "summary": []},
                {"type": "function_call", "id": "fc_1", "call_id": "call_1",
                 "name": "send_text", "arguments": "{\"message\":\"hi\"}"},
                {"type": "message", "id": "msg_1", "role": "assistant",
                 "content": [{"type": "output_text", "text": "hi", "annotations": []}]},
                {"type": "web_search_call", "id": "ws_1", "status": "completed"}
            ]
        });
        let parsed: ModelResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.output.len(), 4);
        assert!(matches!(parsed.output[1], OutputItem::FunctionCall { ref name, .. } if name == "send_text"));
        assert!(matches!(parsed.output[3], OutputItem::Unknown));
    }

    #[test]
    fn assistant_text_input_uses_output_text_part() {
        let item = InputItem::text(InputRole::Assistant, "done");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["content"][0]["type"], "output_text");
    }
}
