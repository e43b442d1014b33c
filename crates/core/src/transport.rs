//! Transport trait: the messaging platform seen from the engine.
//!
//! Implementations bound every call with a timeout and report failures as
//! [`TransportError`]. Callers in the engine never propagate those errors:
//! a failed send is logged and the run carries on to finalize.

use crate::error::TransportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message as stored by the platform (used for hydration and search).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformMessage {
    pub id: String,
    pub text: Option<String>,
    pub from_me: bool,
    pub sender: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub attachment_count: usize,
}

/// Raw attachment bytes fetched from the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentData {
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A file to upload as part of a multi-part message.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Chat metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub chat_id: String,
    pub display_name: Option<String>,
    pub participants: Vec<String>,
    pub is_group: bool,
}

/// An outbound text message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendTextRequest {
    pub chat_id: String,
    pub text: String,
    /// Message to reply to (thread root), if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_index: Option<u32>,
    /// Platform effect identifier (e.g. `com.apple.MobileSMS.expressivesend.loud`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_id: Option<String>,
}

impl SendTextRequest {
    pub fn new(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            text: text.into(),
            reply_to: None,
            part_index: None,
            effect_id: None,
        }
    }

    pub fn replying_to(mut self, message_id: Option<String>) -> Self {
        self.reply_to = message_id;
        self
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// A human-readable name (e.g., "bluebubbles").
    fn name(&self) -> &str;

    /// Recent messages in a chat, newest first.
    async fn recent_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<PlatformMessage>, TransportError>;

    async fn get_message(&self, message_id: &str)
    -> Result<Option<PlatformMessage>, TransportError>;

    async fn send_text(&self, request: SendTextRequest) -> Result<(), TransportError>;

    async fn send_reaction(
        &self,
        chat_id: &str,
        message_id: &str,
        reaction: &str,
        part_index: Option<u32>,
    ) -> Result<(), TransportError>;

    async fn send_multipart(
        &self,
        chat_id: &str,
        caption: Option<&str>,
        attachments: Vec<OutboundAttachment>,
    ) -> Result<(), TransportError>;

    async fn download_attachment(&self, attachment_id: &str)
    -> Result<AttachmentData, TransportError>;

    async fn chat_info(&self, chat_id: &str) -> Result<ChatInfo, TransportError>;

    async fn rename_chat(&self, chat_id: &str, name: &str) -> Result<(), TransportError>;

    /// Full-text search over one chat, newest first.
    async fn search_messages(
        &self,
        chat_id: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PlatformMessage>, TransportError>;
}
