//! The activity boundary.
//!
//! Every step that touches the outside world (store reads and writes, model
//! calls, tools, sends, the clock) is an activity with JSON-serializable input
//! and output. The orchestration in [`crate::loop_runner`] only ever sees
//! activity results, so a durable engine can record, replay, and retry them.

use async_trait::async_trait;
use chrono::Utc;
use convoy_config::AppConfig;
use convoy_core::{
    ActivityError, AgentWorkflowContext, ConversationAccess, ConversationTurn, DomainEvent, EventBus, HostedTool,
    IncomingMessage, InputItem, ModelRequest, ModelResponse, Provider, ProviderError,
    SendTextRequest, SettingsStore, ToolContext, ToolRegistry, Transport, TransportError,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::input::{InputBuilder, PromptSettings};
use crate::materializer::{Materialization, decode_image};
use crate::response::FunctionCallRequest;
use crate::store::{ConversationStore, SendGate};
use crate::tool_runner::{ToolOutcome, ToolRunner};

/// Claim key for the single materialized reply of a run.
const MATERIALIZE_KEY: &str = "materialize";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "activity", rename_all = "snake_case")]
pub enum ActivityRequest {
    LoadHistory {
        chat_id: String,
        sequence: u64,
    },
    BuildInput {
        message: IncomingMessage,
        history: Vec<ConversationTurn>,
    },
    InvokeModel {
        chat_id: String,
        is_group: bool,
        input: Vec<InputItem>,
    },
    ExecuteTools {
        run: AgentWorkflowContext,
        message: IncomingMessage,
        calls: Vec<FunctionCallRequest>,
    },
    Deliver {
        run: AgentWorkflowContext,
        message: IncomingMessage,
        materialization: Materialization,
    },
    Finalize {
        run: AgentWorkflowContext,
        message: IncomingMessage,
    },
}

impl ActivityRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadHistory { .. } => "load_history",
            Self::BuildInput { .. } => "build_input",
            Self::InvokeModel { .. } => "invoke_model",
            Self::ExecuteTools { .. } => "execute_tools",
            Self::Deliver { .. } => "deliver",
            Self::Finalize { .. } => "finalize",
        }
    }
}

/// How a delivery attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    /// A newer run owns the chat; nothing was sent.
    Suppressed,
    /// An earlier attempt of this activity already sent it.
    AlreadySent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output", rename_all = "snake_case")]
pub enum ActivityOutput {
    History { turns: Vec<ConversationTurn> },
    Input { items: Vec<InputItem> },
    Model { response: ModelResponse },
    ToolOutcomes { outcomes: Vec<ToolOutcome> },
    Delivered { outcome: DeliveryOutcome },
    Finalized { responded: bool, cursor_advanced: bool },
}

#[async_trait]
pub trait ActivityExecutor: Send + Sync {
    async fn execute(&self, request: ActivityRequest) -> Result<ActivityOutput, ActivityError>;
}

#[derive(Debug, Clone)]
struct ModelSettings {
    model: String,
    temperature: f32,
    max_output_tokens: Option<u32>,
    hosted_tools: Vec<HostedTool>,
    parallel_tool_calls: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-mini".into(),
            temperature: 0.2,
            max_output_tokens: Some(600),
            hosted_tools: Vec::new(),
            parallel_tool_calls: false,
        }
    }
}

/// The production activity implementation.
pub struct AgentActivities {
    store: Arc<ConversationStore>,
    provider: Arc<dyn Provider>,
    transport: Arc<dyn Transport>,
    settings: Arc<dyn SettingsStore>,
    tools: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    input: InputBuilder,
    runner: ToolRunner,
    model: ModelSettings,
    llm_timeout: Duration,
    transport_timeout: Duration,
    http: reqwest::Client,
}

impl AgentActivities {
    pub fn new(
        store: Arc<ConversationStore>,
        provider: Arc<dyn Provider>,
        transport: Arc<dyn Transport>,
        settings: Arc<dyn SettingsStore>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let input = InputBuilder::new(transport.clone(), settings.clone(), tools.clone());
        let runner = ToolRunner::new(tools.clone()).with_event_bus(event_bus.clone());
        Self {
            store,
            provider,
            transport,
            settings,
            tools,
            event_bus,
            input,
            runner,
            model: ModelSettings::default(),
            llm_timeout: Duration::from_secs(120),
            transport_timeout: Duration::from_secs(15),
            http: reqwest::Client::new(),
        }
    }

    /// Apply model, limit, and timeout settings.
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        let mut hosted_tools = Vec::new();
        if config.model.image_generation {
            hosted_tools.push(HostedTool::ImageGeneration);
        }
        if config.model.web_search {
            hosted_tools.push(HostedTool::WebSearch);
        }
        self.model = ModelSettings {
            model: config.model.model.clone(),
            temperature: config.model.temperature,
            max_output_tokens: Some(config.model.max_output_tokens),
            hosted_tools,
            parallel_tool_calls: config.agent.parallel_tool_calls,
        };
        self.llm_timeout = config.timeouts.llm();
        self.transport_timeout = config.timeouts.transport();
        self.input = InputBuilder::new(
            self.transport.clone(),
            self.settings.clone(),
            self.tools.clone(),
        )
        .with_prompt(PromptSettings {
            assistant_name: config.agent.assistant_name.clone(),
            max_images: config.agent.max_image_attachments,
            max_files: config.agent.max_file_attachments,
        })
        .with_transport_timeout(self.transport_timeout);
        self.runner = ToolRunner::new(self.tools.clone())
            .with_timeout(config.timeouts.tool())
            .with_parallel(config.agent.parallel_tool_calls)
            .with_event_bus(self.event_bus.clone());
        self
    }

    async fn invoke_model(
        &self,
        chat_id: &str,
        is_group: bool,
        input: Vec<InputItem>,
    ) -> Result<ModelResponse, ActivityError> {
        let request = ModelRequest {
            model: self.model.model.clone(),
            input,
            tools: self.tools.definitions_for(is_group),
            hosted_tools: self.model.hosted_tools.clone(),
            temperature: self.model.temperature,
            max_output_tokens: self.model.max_output_tokens,
            parallel_tool_calls: self.model.parallel_tool_calls,
        };
        match tokio::time::timeout(self.llm_timeout, self.provider.complete(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                warn!(chat_id = %chat_id, provider = self.provider.name(), error = %e, "Model invocation failed");
                Err(classify_provider_error(e))
            }
            Err(_) => {
                warn!(chat_id = %chat_id, timeout_secs = self.llm_timeout.as_secs(), "Model invocation timed out");
                Err(ActivityError::Retryable {
                    activity: "invoke_model".into(),
                    reason: format!("timed out after {}s", self.llm_timeout.as_secs()),
                })
            }
        }
    }

    async fn deliver(
        &self,
        run: &AgentWorkflowContext,
        message: &IncomingMessage,
        materialization: Materialization,
    ) -> DeliveryOutcome {
        if materialization == Materialization::Nothing {
            return DeliveryOutcome::Sent;
        }
        match self.store.authorize_send(run, MATERIALIZE_KEY).await {
            SendGate::Allowed => {}
            SendGate::AlreadySent => return DeliveryOutcome::AlreadySent,
            SendGate::Superseded => {
                info!(chat_id = %run.chat_id, sequence = run.sequence, "Run superseded, reply suppressed");
                self.event_bus.publish(DomainEvent::RunSuppressed {
                    chat_id: run.chat_id.clone(),
                    sequence: run.sequence,
                    timestamp: Utc::now(),
                });
                return DeliveryOutcome::Suppressed;
            }
        }

        let (kind, sent, turn) = match materialization {
            Materialization::Images { images, caption } => {
                let mut attachments = Vec::with_capacity(images.len());
                for (index, payload) in images.iter().enumerate() {
                    if let Some(attachment) =
                        decode_image(payload, index, &self.http, self.transport_timeout).await
                    {
                        attachments.push(attachment);
                    }
                }
                if attachments.is_empty() {
                    warn!(chat_id = %run.chat_id, "No generated image could be decoded");
                    return DeliveryOutcome::Failed;
                }
                let sent = self
                    .bounded(
                        "send_multipart",
                        self.transport
                            .send_multipart(&run.chat_id, caption.as_deref(), attachments),
                    )
                    .await;
                ("image", sent, caption.unwrap_or_else(|| "[image]".into()))
            }
            Materialization::Reaction { reaction } => {
                let Some(target) = message.id() else {
                    warn!(chat_id = %run.chat_id, "Cannot react to a message without an id");
                    return DeliveryOutcome::Failed;
                };
                let sent = self
                    .bounded(
                        "send_reaction",
                        self.transport
                            .send_reaction(&run.chat_id, target, &reaction, None),
                    )
                    .await;
                ("reaction", sent, format!("[reaction: {reaction}]"))
            }
            Materialization::Text { text } => {
                let request = SendTextRequest::new(&run.chat_id, &text)
                    .replying_to(message.thread_root().map(str::to_string));
                let sent = self
                    .bounded("send_text", self.transport.send_text(request))
                    .await;
                ("text", sent, text)
            }
            Materialization::Nothing => return DeliveryOutcome::Sent,
        };

        match sent {
            Ok(()) => {
                info!(chat_id = %run.chat_id, sequence = run.sequence, kind, "Reply sent");
                self.store.record_assistant_turn(run, turn).await;
                self.event_bus.publish(DomainEvent::ReplySent {
                    chat_id: run.chat_id.clone(),
                    kind: kind.to_string(),
                    timestamp: Utc::now(),
                });
                DeliveryOutcome::Sent
            }
            Err(e) => {
                warn!(chat_id = %run.chat_id, kind, error = %e, "Reply could not be sent");
                DeliveryOutcome::Failed
            }
        }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        match tokio::time::timeout(self.transport_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                operation: operation.to_string(),
                timeout_secs: self.transport_timeout.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl ActivityExecutor for AgentActivities {
    async fn execute(&self, request: ActivityRequest) -> Result<ActivityOutput, ActivityError> {
        match request {
            ActivityRequest::LoadHistory { chat_id, sequence } => Ok(ActivityOutput::History {
                turns: self.store.history_for(&chat_id, Some(sequence)).await,
            }),
            ActivityRequest::BuildInput { message, history } => Ok(ActivityOutput::Input {
                items: self.input.build(&message, &history).await,
            }),
            ActivityRequest::InvokeModel {
                chat_id,
                is_group,
                input,
            } => Ok(ActivityOutput::Model {
                response: self.invoke_model(&chat_id, is_group, input).await?,
            }),
            ActivityRequest::ExecuteTools {
                run,
                message,
                calls,
            } => {
                let ctx = ToolContext {
                    run,
                    message,
                    conversation: self.store.clone(),
                    transport: self.transport.clone(),
                    settings: self.settings.clone(),
                };
                Ok(ActivityOutput::ToolOutcomes {
                    outcomes: self.runner.run_all(&ctx, &calls).await,
                })
            }
            ActivityRequest::Deliver {
                run,
                message,
                materialization,
            } => Ok(ActivityOutput::Delivered {
                outcome: self.deliver(&run, &message, materialization).await,
            }),
            ActivityRequest::Finalize { run, message } => {
                let report = self.store.finalize(&run, &message).await;
                self.event_bus.publish(DomainEvent::RunFinalized {
                    chat_id: run.chat_id.clone(),
                    sequence: run.sequence,
                    responded: report.responded,
                    timestamp: Utc::now(),
                });
                Ok(ActivityOutput::Finalized {
                    responded: report.responded,
                    cursor_advanced: report.cursor_advanced,
                })
            }
        }
    }
}

/// Transient provider failures are worth another attempt; the rest are not.
pub fn classify_provider_error(error: ProviderError) -> ActivityError {
    let retryable = match &error {
        ProviderError::RateLimited { .. } | ProviderError::Timeout(_) | ProviderError::Network(_) => {
            true
        }
        ProviderError::ApiError { status_code, .. } => *status_code >= 500,
        ProviderError::AuthenticationFailed(_)
        | ProviderError::NotConfigured(_)
        | ProviderError::InvalidResponse(_) => false,
    };
    let activity = "invoke_model".to_string();
    let reason = error.to_string();
    if retryable {
        ActivityError::Retryable { activity, reason }
    } else {
        ActivityError::Fatal { activity, reason }
    }
}
