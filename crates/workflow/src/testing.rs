//! Scripted activities for engine and dispatcher tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use convoy_agent::{
    ActivityExecutor, ActivityOutput, ActivityRequest, ConversationStore, DeliveryOutcome,
    Materialization, SendGate, WorkflowInput,
};
use convoy_core::{
    ActivityError, AgentWorkflowContext, ConversationAccess, IncomingMessage, InputItem, InputRole,
    ModelResponse,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Replies "ok" to everything, records what was delivered and finalized.
#[derive(Default)]
pub struct ScriptedActivities {
    store: Option<Arc<ConversationStore>>,
    failures_left: AtomicUsize,
    failures_retryable: bool,
    /// Model calls for this text never return
    block_forever: Option<String>,
    /// Model calls for this text wait for `release`
    block_until_release: Option<String>,
    pub model_calls: AtomicUsize,
    pub model_entered: Notify,
    pub release: Notify,
    delivered: Mutex<Vec<(u64, DeliveryOutcome)>>,
    finalized: Mutex<Vec<u64>>,
}

impl ScriptedActivities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: Arc<ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The first `count` model calls fail.
    pub fn with_model_failures(mut self, count: usize, retryable: bool) -> Self {
        self.failures_left = AtomicUsize::new(count);
        self.failures_retryable = retryable;
        self
    }

    pub fn blocking_on(mut self, text: &str) -> Self {
        self.block_forever = Some(text.to_string());
        self
    }

    pub fn blocking_until_released(mut self, text: &str) -> Self {
        self.block_until_release = Some(text.to_string());
        self
    }

    pub fn model_calls(&self) -> usize {
        self.model_calls.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<(u64, DeliveryOutcome)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn finalized(&self) -> Vec<u64> {
        self.finalized.lock().unwrap().clone()
    }

    async fn deliver(&self, run: &AgentWorkflowContext, materialization: Materialization) -> DeliveryOutcome {
        let content = match materialization {
            Materialization::Text { text } => text,
            Materialization::Reaction { reaction } => format!("[reaction: {reaction}]"),
            Materialization::Images { caption, .. } => caption.unwrap_or_else(|| "[image]".into()),
            Materialization::Nothing => return DeliveryOutcome::Suppressed,
        };
        let Some(store) = &self.store else {
            return DeliveryOutcome::Sent;
        };
        match store.authorize_send(run, "materialize").await {
            SendGate::Allowed => {
                store.record_assistant_turn(run, content).await;
                DeliveryOutcome::Sent
            }
            SendGate::Superseded => DeliveryOutcome::Suppressed,
            SendGate::AlreadySent => DeliveryOutcome::AlreadySent,
        }
    }
}

fn mentions(input: &[InputItem], text: &Option<String>) -> bool {
    match text {
        Some(text) => serde_json::to_string(input)
            .map(|json| json.contains(text.as_str()))
            .unwrap_or(false),
        None => false,
    }
}

#[async_trait]
impl ActivityExecutor for ScriptedActivities {
    async fn execute(&self, request: ActivityRequest) -> Result<ActivityOutput, ActivityError> {
        match request {
            ActivityRequest::LoadHistory { chat_id, sequence } => {
                let turns = match &self.store {
                    Some(store) => store.history_for(&chat_id, Some(sequence)).await,
                    None => Vec::new(),
                };
                Ok(ActivityOutput::History { turns })
            }
            ActivityRequest::BuildInput { message, .. } => Ok(ActivityOutput::Input {
                items: vec![InputItem::text(InputRole::User, message.text_or_empty())],
            }),
            ActivityRequest::InvokeModel { input, .. } => {
                self.model_calls.fetch_add(1, Ordering::SeqCst);
                self.model_entered.notify_one();

                let failing = self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if failing {
                    let reason = "scripted failure".to_string();
                    return Err(if self.failures_retryable {
                        ActivityError::Retryable {
                            activity: "invoke_model".into(),
                            reason,
                        }
                    } else {
                        ActivityError::Fatal {
                            activity: "invoke_model".into(),
                            reason,
                        }
                    });
                }
                if mentions(&input, &self.block_forever) {
                    std::future::pending::<()>().await;
                }
                if mentions(&input, &self.block_until_release) {
                    self.release.notified().await;
                }
                Ok(ActivityOutput::Model {
                    response: ModelResponse::text("ok"),
                })
            }
            ActivityRequest::ExecuteTools { .. } => Ok(ActivityOutput::ToolOutcomes { outcomes: vec![] }),
            ActivityRequest::Deliver {
                run, materialization, ..
            } => {
                let outcome = self.deliver(&run, materialization).await;
                self.delivered.lock().unwrap().push((run.sequence, outcome));
                Ok(ActivityOutput::Delivered { outcome })
            }
            ActivityRequest::Finalize { run, message } => {
                self.finalized.lock().unwrap().push(run.sequence);
                let (responded, cursor_advanced) = match &self.store {
                    Some(store) => {
                        let report = store.finalize(&run, &message).await;
                        (report.responded, report.cursor_advanced)
                    }
                    None => (false, true),
                };
                Ok(ActivityOutput::Finalized {
                    responded,
                    cursor_advanced,
                })
            }
        }
    }
}

/// Input for a run on `chat-1` that has already been admitted as `sequence`.
pub fn run_input(sequence: u64, message_id: &str, text: &str) -> WorkflowInput {
    let message = IncomingMessage::new("chat-1")
        .with_id(message_id)
        .with_text(text)
        .with_sender("+15550001")
        .with_timestamp(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    WorkflowInput {
        run: AgentWorkflowContext {
            run_id: "chat-chat-1".into(),
            chat_id: "chat-1".into(),
            message_id: Some(message_id.to_string()),
            sequence,
            started_at: Utc::now(),
        },
        message,
    }
}
