//! Responses-style LLM provider.
//!
//! Speaks the item-based `/responses` endpoint: the request carries ordered
//! input items (messages, prior function calls, their outputs) plus function
//! and hosted tools; the response is a list of output items. Works with
//! OpenAI and any gateway exposing the same shape.

use async_trait::async_trait;
use convoy_config::AppConfig;
use convoy_core::error::ProviderError;
use convoy_core::provider::{HostedTool, ModelRequest, ToolDefinition};
use convoy_core::{ModelResponse, Provider};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

/// Fallback wait when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub struct OpenAiResponsesProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiResponsesProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured("API key is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .model
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("model.api_key is not set".into()))?;
        Self::new(&config.model.api_url, api_key, config.timeouts.llm())
    }

    pub fn endpoint(&self) -> String {
        format!("{}/responses", self.base_url)
    }
}

/// JSON body for one `/responses` call.
pub fn request_body(request: &ModelRequest) -> Value {
    let mut tools: Vec<Value> = request.tools.iter().map(function_tool).collect();
    tools.extend(request.hosted_tools.iter().map(|hosted| match hosted {
        HostedTool::ImageGeneration => json!({"type": "image_generation"}),
        HostedTool::WebSearch => json!({"type": "web_search_preview"}),
    }));

    let mut body = json!({
        "model": request.model,
        "input": request.input,
        "temperature": request.temperature,
    });
    if let Some(max) = request.max_output_tokens {
        body["max_output_tokens"] = json!(max);
    }
    if !tools.is_empty() {
        body["tools"] = Value::Array(tools);
        body["tool_choice"] = json!("auto");
        body["parallel_tool_calls"] = json!(request.parallel_tool_calls);
    }
    body
}

fn function_tool(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
        "strict": false,
    })
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Map a non-success status to a provider error.
fn status_error(status: StatusCode, retry_after: Option<&str>, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .map(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            retry_after_secs: retry_after
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthenticationFailed(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::Timeout(message),
        _ => ProviderError::ApiError {
            status_code: status.as_u16(),
            message,
        },
    }
}

/// Parse a success body. A response with `status: "failed"` is an error even on 200.
fn parse_response(body: &str) -> Result<ModelResponse, ProviderError> {
    let raw: Value = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

    if raw["status"] == "failed" {
        let message = raw["error"]["message"]
            .as_str()
            .unwrap_or("response failed")
            .to_string();
        return Err(ProviderError::ApiError {
            status_code: 500,
            message,
        });
    }

    serde_json::from_value(raw).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl Provider for OpenAiResponsesProvider {
    fn name(&self) -> &str {
        "openai-responses"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        let body = request_body(&request);
        debug!(
            model = %request.model,
            items = request.input.len(),
            tools = request.tools.len(),
            "Sending model request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !status.is_success() {
            let error = status_error(status, retry_after.as_deref(), &text);
            warn!(status = status.as_u16(), error = %error, "Model request rejected");
            return Err(error);
        }

        let parsed = parse_response(&text)?;
        debug!(response_id = %parsed.id, items = parsed.output.len(), "Model responded");
        Ok(parsed)
    }
}
