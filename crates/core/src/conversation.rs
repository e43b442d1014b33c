//! Per-chat bookkeeping types shared between the store, the agent, and tools.

use crate::message::ConversationTurn;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The last message processed for a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupCursor {
    pub message_id: Option<String>,
    pub fingerprint: String,
    /// Run sequence that set this cursor (0 for hydration).
    pub sequence: u64,
}

/// Latest known state of one thread inside a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadContext {
    pub thread_root_id: String,
    pub last_message_id: Option<String>,
    pub last_text: Option<String>,
    pub last_sender: Option<String>,
    pub last_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub last_image_urls: Vec<String>,
}

impl ThreadContext {
    /// Last writer wins, except an empty image list keeps the previous images.
    pub fn merged_over(mut self, previous: Option<&ThreadContext>) -> Self {
        if self.last_image_urls.is_empty() {
            if let Some(prev) = previous {
                self.last_image_urls = prev.last_image_urls.clone();
            }
        }
        self
    }
}

/// Identity of one dispatched run.
///
/// `run_id` is chat-scoped (one per chat, reused by every run); `sequence`
/// tells generations apart and is what supersession compares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentWorkflowContext {
    pub run_id: String,
    pub chat_id: String,
    pub message_id: Option<String>,
    pub sequence: u64,
    pub started_at: DateTime<Utc>,
}

/// What tools and the materializer may ask of the conversation store.
#[async_trait]
pub trait ConversationAccess: Send + Sync {
    /// Whether `run` is still the newest run registered for its chat.
    async fn is_latest(&self, run: &AgentWorkflowContext) -> bool;

    /// Record something the run actually sent. Committed to history at finalize.
    async fn record_assistant_turn(&self, run: &AgentWorkflowContext, content: String);

    async fn thread_context(&self, chat_id: &str, thread_root_id: &str) -> Option<ThreadContext>;

    async fn history(&self, chat_id: &str) -> Vec<ConversationTurn>;
}
