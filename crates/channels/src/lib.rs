//! Messaging platform plumbing for convoy.
//!
//! - [`bluebubbles`]: the outbound [`convoy_core::Transport`] over the
//!   BlueBubbles REST API
//! - [`webhook`]: inbound webhook parsing and signature checks

pub mod bluebubbles;
pub mod webhook;

pub use bluebubbles::BlueBubblesTransport;
pub use webhook::{SIGNATURE_HEADER, SignatureVerifier, WebhookError, parse_timestamp, parse_webhook};
