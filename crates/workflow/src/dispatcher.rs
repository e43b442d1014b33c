//! Workflow dispatcher.
//!
//! Turns one inbound message into at most one run:
//!
//! 1. admission (pure policy, no state touched on reject)
//! 2. dedup check and registration as the chat's latest run, atomically
//! 3. execution, inline or on a durable engine
//!
//! The workflow id is derived from the chat id, so every run for a chat
//! shares it. A newer message supersedes the older run: inline runs are
//! suppressed at send time, durable runs are terminated by the engine.

use chrono::Utc;
use convoy_agent::{
    ActivityExecutor, ActivityRequest, AdmissionGate, AdmitOutcome, ConversationStore,
    MessageWorkflow, RejectReason, WorkflowInput, WorkflowReport,
};
use convoy_config::AppConfig;
use convoy_core::{DomainEvent, EventBus, IncomingMessage, SettingsStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::durable::DurableEngine;

/// Where runs execute. Chosen once, at construction.
pub enum ExecutionMode {
    Inline,
    Durable(Arc<dyn DurableEngine>),
}

impl ExecutionMode {
    pub fn name(&self) -> &str {
        match self {
            Self::Inline => "inline",
            Self::Durable(engine) => engine.name(),
        }
    }
}

/// What happened to a dispatched message.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Dropped(RejectReason),
    Duplicate,
    /// The chat's state could not be reached.
    Unavailable,
    /// Inline run finished.
    Completed(WorkflowReport),
    /// Handed to the durable engine.
    Submitted { workflow_id: String },
    /// The durable engine refused the run; it was finalized without a reply.
    Rejected { reason: String },
}

pub struct Dispatcher {
    gate: AdmissionGate,
    settings: Arc<dyn SettingsStore>,
    store: Arc<ConversationStore>,
    activities: Arc<dyn ActivityExecutor>,
    workflow: MessageWorkflow,
    mode: ExecutionMode,
    id_prefix: String,
    event_bus: Arc<EventBus>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<ConversationStore>,
        settings: Arc<dyn SettingsStore>,
        activities: Arc<dyn ActivityExecutor>,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            gate: AdmissionGate::default(),
            settings,
            store,
            activities,
            workflow: MessageWorkflow::new(),
            mode,
            id_prefix: "chat-".into(),
            event_bus: Arc::new(EventBus::default()),
        }
    }

    /// Admission rules, workflow id prefix, and tool-loop bound from config.
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.gate = AdmissionGate::new(&config.agent.supported_service, &config.agent.activation_token);
        self.workflow = MessageWorkflow::new().with_max_tool_iterations(config.agent.max_tool_iterations);
        self.id_prefix = config.workflow.id_prefix.clone();
        self
    }

    pub fn with_workflow(mut self, workflow: MessageWorkflow) -> Self {
        self.workflow = workflow;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn workflow_id(&self, chat_id: &str) -> String {
        format!("{}{}", self.id_prefix, chat_id)
    }

    pub async fn dispatch(&self, message: IncomingMessage) -> DispatchOutcome {
        let responsiveness = self.settings.responsiveness(&message.chat_id).await;
        if let convoy_agent::AdmissionDecision::Reject(reason) =
            self.gate.evaluate(&message, responsiveness)
        {
            debug!(chat_id = %message.chat_id, reason = %reason, "Message dropped by admission");
            self.dropped(&message.chat_id, reason.to_string());
            return DispatchOutcome::Dropped(reason);
        }

        let workflow_id = self.workflow_id(&message.chat_id);
        let run = match self.store.admit(&message, workflow_id.as_str(), Utc::now()).await {
            AdmitOutcome::Admitted(run) => run,
            AdmitOutcome::Duplicate => {
                debug!(chat_id = %message.chat_id, message_id = ?message.id(), "Duplicate message dropped");
                self.dropped(&message.chat_id, "duplicate".into());
                return DispatchOutcome::Duplicate;
            }
            AdmitOutcome::Unavailable => {
                warn!(chat_id = %message.chat_id, "Conversation store unavailable, message dropped");
                return DispatchOutcome::Unavailable;
            }
        };

        info!(
            chat_id = %run.chat_id,
            sequence = run.sequence,
            mode = self.mode.name(),
            "Dispatching run"
        );
        self.event_bus.publish(DomainEvent::RunStarted {
            chat_id: run.chat_id.clone(),
            run_id: run.run_id.clone(),
            sequence: run.sequence,
            timestamp: Utc::now(),
        });

        let input = WorkflowInput { run, message };
        match &self.mode {
            ExecutionMode::Inline => {
                DispatchOutcome::Completed(self.workflow.run(self.activities.as_ref(), input).await)
            }
            ExecutionMode::Durable(engine) => self.submit(engine.as_ref(), &workflow_id, input).await,
        }
    }

    async fn submit(
        &self,
        engine: &dyn DurableEngine,
        workflow_id: &str,
        input: WorkflowInput,
    ) -> DispatchOutcome {
        let (chat_id, sequence) = (input.run.chat_id.clone(), input.run.sequence);
        match engine.start(workflow_id, input.clone()).await {
            Ok(started) => {
                if let Some(terminated) = started.terminated_sequence {
                    // A terminated run never finalizes; commit what it left behind
                    let committed = self.store.abandon_before(&chat_id, sequence).await;
                    debug!(chat_id = %chat_id, terminated, committed, "Committed turns of terminated run");
                }
                DispatchOutcome::Submitted {
                    workflow_id: started.workflow_id,
                }
            }
            Err(e) => {
                warn!(chat_id = %chat_id, workflow_id = %workflow_id, error = %e, "Durable engine refused run");
                let finalize = ActivityRequest::Finalize {
                    run: input.run,
                    message: input.message,
                };
                if let Err(e) = self.activities.execute(finalize).await {
                    warn!(chat_id = %chat_id, error = %e, "Finalize after refused start failed");
                }
                DispatchOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn dropped(&self, chat_id: &str, reason: String) {
        self.event_bus.publish(DomainEvent::MessageDropped {
            chat_id: chat_id.to_string(),
            reason,
            timestamp: Utc::now(),
        });
    }
}
