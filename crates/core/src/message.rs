//! Inbound message and history turn types.
//!
//! An [`IncomingMessage`] is produced by the transport layer for every webhook
//! event and never changes afterwards. [`ConversationTurn`]s are what the
//! conversation store keeps as bounded history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat ids with this prefix are group chats even when the platform omits the flag.
pub const GROUP_CHAT_PREFIX: &str = "iMessage;+;chat";

/// Reactions the platform understands. A leading `-` removes a reaction.
pub const ALLOWED_REACTIONS: &[&str] = &[
    "love",
    "like",
    "dislike",
    "laugh",
    "emphasize",
    "question",
    "-love",
    "-like",
    "-dislike",
    "-laugh",
    "-emphasize",
    "-question",
];

/// The role of a turn in the replayed history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The other party in the chat
    User,
    /// Something the assistant sent
    Assistant,
}

/// One entry of a chat's bounded history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp,
        }
    }

    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp,
        }
    }
}

/// An attachment on an inbound message.
///
/// The platform may hand over the bytes in several shapes; resolution order is
/// `data_url`, then `base64` + `mime_type`, then `url`, then a download by `id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingAttachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "heic", "heif", "webp"];

impl IncomingAttachment {
    pub fn is_image(&self) -> bool {
        if let Some(mime) = &self.mime_type {
            return mime.to_ascii_lowercase().starts_with("image/");
        }
        if let Some(data_url) = &self.data_url {
            return data_url.starts_with("data:image/");
        }
        self.file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    }
}

/// A normalized inbound chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_root_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<IncomingAttachment>,
}

impl IncomingMessage {
    /// A bare message for `chat_id` stamped with the current time.
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            message_id: None,
            thread_root_id: None,
            text: None,
            from_me: false,
            service: None,
            sender: None,
            is_group: false,
            timestamp: Utc::now(),
            attachments: Vec::new(),
        }
    }

    pub fn with_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_thread_root(mut self, root: impl Into<String>) -> Self {
        self.thread_root_id = Some(root.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_attachment(mut self, attachment: IncomingAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn from_me(mut self, from_me: bool) -> Self {
        self.from_me = from_me;
        self
    }

    pub fn group(mut self, is_group: bool) -> Self {
        self.is_group = is_group;
        self
    }

    /// The message id, treating an empty string as absent.
    pub fn id(&self) -> Option<&str> {
        self.message_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// The thread this message replies into, if any.
    pub fn thread_root(&self) -> Option<&str> {
        self.thread_root_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn is_group_chat(&self) -> bool {
        self.is_group || self.chat_id.starts_with(GROUP_CHAT_PREFIX)
    }

    /// Dedup key: the message id when present, otherwise
    /// `sender|text|epochMillis|attachmentCount`.
    pub fn fingerprint(&self) -> String {
        match self.id() {
            Some(id) => id.to_string(),
            None => format!(
                "{}|{}|{}|{}",
                self.sender.as_deref().unwrap_or(""),
                self.text_or_empty(),
                self.timestamp.timestamp_millis(),
                self.attachments.len()
            ),
        }
    }

    pub fn image_attachments(&self) -> impl Iterator<Item = &IncomingAttachment> {
        self.attachments.iter().filter(|a| a.is_image())
    }

    pub fn file_attachments(&self) -> impl Iterator<Item = &IncomingAttachment> {
        self.attachments.iter().filter(|a| !a.is_image())
    }

    /// One-line rendering used as the user turn in history.
    pub fn summary_for_history(&self) -> String {
        let sender = self
            .sender
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("unknown");
        let text = self.text_or_empty().trim();
        let text = if text.is_empty() { "[no text]" } else { text };
        let mut summary = format!("{sender}: {text}");
        let images = self.image_attachments().count();
        if images > 0 {
            summary.push_str(&format!(" [{images} image(s)]"));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed(text: &str) -> IncomingMessage {
        IncomingMessage::new("chat-1")
            .with_sender("+15550001")
            .with_text(text)
            .with_timestamp(Utc.timestamp_millis_opt(1_700_000_000_123).unwrap())
    }

    #[test]
    fn fingerprint_prefers_message_id() {
        let msg = fixed("hi").with_id("msg-9");
        assert_eq!(msg.fingerprint(), "msg-9");
    }

    #[test]
    fn fingerprint_equal_for_identical_anonymous_messages() {
        assert_eq!(fixed("hi").fingerprint(), fixed("hi").fingerprint());
        assert_eq!(fixed("hi").fingerprint(), "+15550001|hi|1700000000123|0");
    }

    #[test]
    fn fingerprint_changes_with_any_field() {
        let base = fixed("hi").fingerprint();
        assert_ne!(fixed("hey").fingerprint(), base);
        assert_ne!(fixed("hi").with_sender("+15550002").fingerprint(), base);
        assert_ne!(
            fixed("hi")
                .with_timestamp(Utc.timestamp_millis_opt(1_700_000_000_124).unwrap())
                .fingerprint(),
            base
        );
        assert_ne!(
            fixed("hi")
                .with_attachment(IncomingAttachment::default())
                .fingerprint(),
            base
        );
    }

    #[test]
    fn empty_id_counts_as_absent() {
        let msg = fixed("hi").with_id("");
        assert!(msg.id().is_none());
        assert!(msg.fingerprint().contains('|'));
    }

    #[test]
    fn group_detection_uses_flag_or_prefix() {
        assert!(IncomingMessage::new("any").group(true).is_group_chat());
        assert!(IncomingMessage::new("iMessage;+;chat12345").is_group_chat());
        assert!(!IncomingMessage::new("iMessage;-;+15550001").is_group_chat());
    }

    #[test]
    fn summary_for_history_variants() {
        assert_eq!(fixed("hello").summary_for_history(), "+15550001: hello");
        assert_eq!(
            IncomingMessage::new("c").summary_for_history(),
            "unknown: [no text]"
        );
        let with_image = fixed("look").with_attachment(IncomingAttachment {
            mime_type: Some("image/png".into()),
            ..Default::default()
        });
        assert_eq!(
            with_image.summary_for_history(),
            "+15550001: look [1 image(s)]"
        );
    }

    #[test]
    fn attachment_kind_detection() {
        let by_name = IncomingAttachment {
            file_name: Some("IMG_0001.HEIC".into()),
            ..Default::default()
        };
        let pdf = IncomingAttachment {
            file_name: Some("notes.pdf".into()),
            ..Default::default()
        };
        assert!(by_name.is_image());
        assert!(!pdf.is_image());
    }
}
