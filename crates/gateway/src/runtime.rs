//! Wiring: builds the store, activities, and dispatcher from config.

use convoy_agent::{AgentActivities, ConversationStore, MessageWorkflow, StoreConfig};
use convoy_channels::BlueBubblesTransport;
use convoy_config::{AppConfig, WorkflowMode};
use convoy_core::{DomainEvent, EventBus, InMemorySettingsStore, Provider, SettingsStore, Transport};
use convoy_providers::OpenAiResponsesProvider;
use convoy_workflow::{Dispatcher, ExecutionMode, LocalDurableEngine, RetryPolicy};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything a running server shares.
pub struct Runtime {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<ConversationStore>,
    pub event_bus: Arc<EventBus>,
    /// Present in durable mode.
    pub engine: Option<Arc<LocalDurableEngine>>,
}

/// Build a runtime talking to the configured LLM endpoint and platform.
pub fn assemble(config: &AppConfig) -> convoy_core::Result<Runtime> {
    let provider = Arc::new(OpenAiResponsesProvider::from_config(config)?);
    let transport = Arc::new(BlueBubblesTransport::from_config(config)?);
    Ok(assemble_with(config, provider, transport))
}

/// Build a runtime around the given collaborators.
pub fn assemble_with(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    transport: Arc<dyn Transport>,
) -> Runtime {
    let event_bus = Arc::new(EventBus::default());
    let settings: Arc<dyn SettingsStore> = Arc::new(InMemorySettingsStore::new());
    let store = Arc::new(ConversationStore::new(
        transport.clone(),
        StoreConfig::from_config(config),
    ));
    let tools = Arc::new(convoy_tools::default_registry());

    let activities = Arc::new(
        AgentActivities::new(
            store.clone(),
            provider,
            transport,
            settings.clone(),
            tools,
            event_bus.clone(),
        )
        .with_config(config),
    );

    let workflow = MessageWorkflow::new().with_max_tool_iterations(config.agent.max_tool_iterations);
    let (mode, engine) = match config.workflow.mode {
        WorkflowMode::Inline => (ExecutionMode::Inline, None),
        WorkflowMode::Durable => {
            let engine = Arc::new(LocalDurableEngine::new(
                activities.clone(),
                workflow.clone(),
                RetryPolicy::from_config(config),
            ));
            (ExecutionMode::Durable(engine.clone()), Some(engine))
        }
    };

    let dispatcher = Dispatcher::new(store.clone(), settings, activities, mode)
        .with_config(config)
        .with_workflow(workflow)
        .with_event_bus(event_bus.clone());
    info!(mode = dispatcher.mode().name(), model = %config.model.model, "Runtime assembled");

    Runtime {
        dispatcher: Arc::new(dispatcher),
        store,
        event_bus,
        engine,
    }
}

/// Log every domain event at debug until the bus closes.
pub fn spawn_event_logger(event_bus: &EventBus) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::MessageDropped { chat_id, reason, .. } => {
            debug!(chat_id = %chat_id, reason = %reason, "event: message dropped")
        }
        DomainEvent::RunStarted { chat_id, sequence, .. } => {
            debug!(chat_id = %chat_id, sequence, "event: run started")
        }
        DomainEvent::RunSuppressed { chat_id, sequence, .. } => {
            debug!(chat_id = %chat_id, sequence, "event: run suppressed")
        }
        DomainEvent::ToolExecuted {
            chat_id,
            tool_name,
            success,
            duration_ms,
            ..
        } => debug!(chat_id = %chat_id, tool = %tool_name, success, duration_ms, "event: tool executed"),
        DomainEvent::ReplySent { chat_id, kind, .. } => {
            debug!(chat_id = %chat_id, kind = %kind, "event: reply sent")
        }
        DomainEvent::RunFinalized {
            chat_id,
            sequence,
            responded,
            ..
        } => debug!(chat_id = %chat_id, sequence, responded, "event: run finalized"),
    }
}
