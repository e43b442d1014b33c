//! Message admission gate.
//!
//! A pure predicate: given an inbound message and the chat's responsiveness
//! mode, decide whether the message may start a run. Rejection is a policy
//! outcome, not an error, and touches no state.

use convoy_core::{IncomingMessage, Responsiveness};
use std::fmt;

/// Left-trimmed, lowercased text starting with one of these is a tapback notice.
const REACTION_NOTICE_PREFIXES: &[&str] = &[
    "reacted ",
    "loved ",
    "liked ",
    "disliked ",
    "questioned ",
    "emphasized ",
    "laughed at ",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    FromMe,
    MissingChatId,
    UnsupportedService,
    ReactionNotice,
    Silenced,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FromMe => "from_me",
            Self::MissingChatId => "missing_chat_id",
            Self::UnsupportedService => "unsupported_service",
            Self::ReactionNotice => "reaction_notice",
            Self::Silenced => "silenced",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Accept,
    Reject(RejectReason),
}

impl AdmissionDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

#[derive(Debug, Clone)]
pub struct AdmissionGate {
    supported_service: String,
    activation_token: String,
}

impl AdmissionGate {
    pub fn new(supported_service: impl Into<String>, activation_token: impl Into<String>) -> Self {
        Self {
            supported_service: supported_service.into(),
            activation_token: activation_token.into().to_lowercase(),
        }
    }

    pub fn evaluate(&self, message: &IncomingMessage, mode: Responsiveness) -> AdmissionDecision {
        use AdmissionDecision::Reject;

        if message.from_me {
            return Reject(RejectReason::FromMe);
        }
        if message.chat_id.trim().is_empty() {
            return Reject(RejectReason::MissingChatId);
        }
        if let Some(service) = message.service.as_deref() {
            if !service.eq_ignore_ascii_case(&self.supported_service) {
                return Reject(RejectReason::UnsupportedService);
            }
        }
        if is_reaction_notice(message.text_or_empty()) {
            return Reject(RejectReason::ReactionNotice);
        }
        if mode == Responsiveness::Silent && !self.activates(message.text_or_empty()) {
            return Reject(RejectReason::Silenced);
        }
        AdmissionDecision::Accept
    }

    /// Text starts with the activation token as a whole word ("Chat, hi"
    /// activates, "Chatter box" does not).
    fn activates(&self, text: &str) -> bool {
        let lowered = text.trim_start().to_lowercase();
        match lowered.strip_prefix(self.activation_token.as_str()) {
            Some(rest) => rest.chars().next().is_none_or(|c| !c.is_alphanumeric()),
            None => false,
        }
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new("iMessage", "chat")
    }
}

/// Whether text is a platform reaction notification ("Reacted 😂 to …").
pub fn is_reaction_notice(text: &str) -> bool {
    let lowered = text.trim_start().to_lowercase();
    REACTION_NOTICE_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
}
