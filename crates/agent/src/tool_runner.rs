//! Executes the function calls of one model turn.
//!
//! Every call is bounded by a timeout. Failures of any kind become text the
//! model can read (`Error: ...`) instead of failing the run. Outputs always
//! come back in the order the model issued the calls.

use chrono::Utc;
use convoy_core::{Delivery, DomainEvent, EventBus, ToolCall, ToolContext, ToolError, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::response::FunctionCallRequest;

/// Result of one executed call, fed back to the model by `call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub call_id: String,
    pub name: String,
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered: Option<Delivery>,
    pub duration_ms: u64,
}

pub struct ToolRunner {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    parallel: bool,
    event_bus: Option<Arc<EventBus>>,
}

impl ToolRunner {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(30),
            parallel: false,
            event_bus: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the calls of one turn concurrently. Only safe when no two tools
    /// share mutable state.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub async fn run_all(&self, ctx: &ToolContext, calls: &[FunctionCallRequest]) -> Vec<ToolOutcome> {
        debug!(chat_id = %ctx.run.chat_id, tool_count = calls.len(), "Executing tool calls");
        if self.parallel {
            futures::future::join_all(calls.iter().map(|call| self.run_one(ctx, call))).await
        } else {
            let mut outcomes = Vec::with_capacity(calls.len());
            for call in calls {
                outcomes.push(self.run_one(ctx, call).await);
            }
            outcomes
        }
    }

    async fn run_one(&self, ctx: &ToolContext, call: &FunctionCallRequest) -> ToolOutcome {
        let start = Instant::now();
        let result = match parse_arguments(&call.arguments) {
            Ok(arguments) => {
                let tool_call = ToolCall {
                    id: call.call_id.clone(),
                    name: call.name.clone(),
                    arguments,
                };
                match tokio::time::timeout(self.timeout, self.registry.execute(ctx, &tool_call)).await {
                    Ok(result) => result,
                    Err(_) => Err(ToolError::Timeout {
                        tool_name: call.name.clone(),
                        timeout_secs: self.timeout.as_secs(),
                    }),
                }
            }
            Err(e) => Err(e),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(tool_result) => ToolOutcome {
                call_id: call.call_id.clone(),
                name: call.name.clone(),
                success: tool_result.success,
                output: tool_result.output,
                delivered: tool_result.delivered,
                duration_ms,
            },
            Err(e) => {
                warn!(chat_id = %ctx.run.chat_id, tool = %call.name, error = %e, "Tool execution failed");
                ToolOutcome {
                    call_id: call.call_id.clone(),
                    name: call.name.clone(),
                    success: false,
                    // Reported to the model so it can recover
                    output: format!("Error: {e}"),
                    delivered: None,
                    duration_ms,
                }
            }
        };

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                chat_id: ctx.run.chat_id.clone(),
                tool_name: call.name.clone(),
                success: outcome.success,
                duration_ms,
                timestamp: Utc::now(),
            });
        }
        outcome
    }
}

fn parse_arguments(raw: &str) -> Result<serde_json::Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
