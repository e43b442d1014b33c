//! Inbound webhook normalization.
//!
//! BlueBubbles posts `{"type": "...", "data": {...}}` events. Only
//! `new-message` events become [`IncomingMessage`]s; every other event type
//! is acknowledged and ignored. Optionally validates an HMAC-SHA256 signature
//! of the raw body.

use chrono::{DateTime, TimeZone, Utc};
use convoy_core::{IncomingAttachment, IncomingMessage};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

/// Prefix of group chat guids on the platform.
pub const GROUP_CHAT_PREFIX: &str = "iMessage;+;chat";

/// Header carrying the hex HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Epoch values below this are seconds, the rest milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Malformed webhook payload: {0}")]
    Malformed(String),

    #[error("Webhook message has no chat")]
    MissingChat,

    #[error("Webhook signature rejected")]
    BadSignature,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<WebhookMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookMessage {
    guid: Option<String>,
    text: Option<String>,
    #[serde(default)]
    is_from_me: bool,
    handle: Option<WebhookHandle>,
    date_created: Option<i64>,
    thread_originator_guid: Option<String>,
    group_title: Option<String>,
    #[serde(default)]
    chats: Vec<WebhookChat>,
    #[serde(default)]
    attachments: Vec<WebhookAttachment>,
}

#[derive(Debug, Deserialize)]
struct WebhookHandle {
    address: Option<String>,
    service: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookChat {
    guid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookAttachment {
    guid: Option<String>,
    mime_type: Option<String>,
    transfer_name: Option<String>,
}

/// Parse a raw webhook body.
///
/// `Ok(None)` means the event is valid but not something the engine handles.
pub fn parse_webhook(body: &[u8]) -> Result<Option<IncomingMessage>, WebhookError> {
    let envelope: WebhookEnvelope =
        serde_json::from_slice(body).map_err(|e| WebhookError::Malformed(e.to_string()))?;
    if envelope.kind != "new-message" {
        return Ok(None);
    }
    let data = envelope
        .data
        .ok_or_else(|| WebhookError::Malformed("new-message without data".into()))?;
    normalize(data).map(Some)
}

fn normalize(data: WebhookMessage) -> Result<IncomingMessage, WebhookError> {
    let chat_id = data
        .chats
        .first()
        .map(|chat| chat.guid.clone())
        .filter(|guid| !guid.trim().is_empty())
        .ok_or(WebhookError::MissingChat)?;

    let is_group = data.chats.len() > 1
        || data.group_title.as_deref().is_some_and(|t| !t.is_empty())
        || chat_id.starts_with(GROUP_CHAT_PREFIX);

    let (sender, service) = match data.handle {
        Some(handle) => (handle.address, handle.service),
        None => (None, None),
    };

    Ok(IncomingMessage {
        chat_id,
        message_id: data.guid.filter(|g| !g.is_empty()),
        thread_root_id: data.thread_originator_guid.filter(|g| !g.is_empty()),
        text: data.text,
        from_me: data.is_from_me,
        service,
        sender,
        is_group,
        // Undated redeliveries must fingerprint identically
        timestamp: data
            .date_created
            .and_then(parse_timestamp)
            .unwrap_or(DateTime::UNIX_EPOCH),
        attachments: data
            .attachments
            .into_iter()
            .map(|a| IncomingAttachment {
                id: a.guid,
                file_name: a.transfer_name,
                mime_type: a.mime_type,
                ..Default::default()
            })
            .collect(),
    })
}

/// Epoch seconds or milliseconds, whichever the magnitude suggests.
pub fn parse_timestamp(value: i64) -> Option<DateTime<Utc>> {
    if value < MILLIS_THRESHOLD {
        Utc.timestamp_opt(value, 0).single()
    } else {
        Utc.timestamp_millis_opt(value).single()
    }
}

/// Checks `X-Signature` against the shared secret. No secret means no check.
#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    secret: Option<String>,
}

impl SignatureVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Accepts `<hex>` or `sha256=<hex>`. Comparison is constant-time.
    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };
        let signature = signature.ok_or(WebhookError::BadSignature)?.trim();
        let hex_digest = signature.strip_prefix("sha256=").unwrap_or(signature);
        let provided = hex::decode(hex_digest).map_err(|_| WebhookError::BadSignature)?;

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|_| WebhookError::BadSignature)?;
        mac.update(payload);
        mac.verify_slice(&provided).map_err(|_| WebhookError::BadSignature)
    }

    /// Hex signature for `payload`, as a sender would compute it.
    pub fn sign(&self, payload: &[u8]) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(payload);
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}
