//! Domain event system: decoupled observation of run lifecycles.
//!
//! Events are published as a run moves through admission, execution, and
//! finalize. Subscribers (logging, tests, the gateway) react without the
//! engine knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// Admission or dedup turned a message away
    MessageDropped {
        chat_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A run was registered as the chat's latest
    RunStarted {
        chat_id: String,
        run_id: String,
        sequence: u64,
        timestamp: DateTime<Utc>,
    },

    /// A run reached materialization after a newer run took over
    RunSuppressed {
        chat_id: String,
        sequence: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        chat_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Something was sent to the chat
    ReplySent {
        chat_id: String,
        kind: String,
        timestamp: DateTime<Utc>,
    },

    /// Finalize bookkeeping completed
    RunFinalized {
        chat_id: String,
        sequence: u64,
        responded: bool,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
