//! Settings store: per-chat responsiveness and display names.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// How eagerly the assistant should reply in a chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Responsiveness {
    #[default]
    Default,
    LessResponsive,
    MoreResponsive,
    /// Only messages that start with the activation token get through.
    Silent,
}

impl Responsiveness {
    /// Parse a user-facing mode name. Accepts a few aliases.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "default" | "normal" | "reset" => Some(Self::Default),
            "less" | "less_responsive" | "quieter" => Some(Self::LessResponsive),
            "more" | "more_responsive" | "chattier" => Some(Self::MoreResponsive),
            "silent" | "mute" | "quiet" => Some(Self::Silent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::LessResponsive => "less_responsive",
            Self::MoreResponsive => "more_responsive",
            Self::Silent => "silent",
        }
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn responsiveness(&self, chat_id: &str) -> Responsiveness;
    async fn set_responsiveness(&self, chat_id: &str, mode: Responsiveness);
    async fn clear_responsiveness(&self, chat_id: &str);

    /// Name the assistant should call a sender by.
    async fn sender_name(&self, sender: &str) -> Option<String>;
    async fn set_sender_name(&self, sender: &str, name: &str);
    async fn clear_sender_name(&self, sender: &str);
}

/// Process-local settings. Lost on restart.
#[derive(Default)]
pub struct InMemorySettingsStore {
    responsiveness: RwLock<HashMap<String, Responsiveness>>,
    names: RwLock<HashMap<String, String>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn responsiveness(&self, chat_id: &str) -> Responsiveness {
        self.responsiveness
            .read()
            .await
            .get(chat_id)
            .copied()
            .unwrap_or_default()
    }

    async fn set_responsiveness(&self, chat_id: &str, mode: Responsiveness) {
        self.responsiveness
            .write()
            .await
            .insert(chat_id.to_string(), mode);
    }

    async fn clear_responsiveness(&self, chat_id: &str) {
        self.responsiveness.write().await.remove(chat_id);
    }

    async fn sender_name(&self, sender: &str) -> Option<String> {
        self.names.read().await.get(sender).cloned()
    }

    async fn set_sender_name(&self, sender: &str, name: &str) {
        self.names
            .write()
            .await
            .insert(sender.to_string(), name.to_string());
    }

    async fn clear_sender_name(&self, sender: &str) {
        self.names.write().await.remove(sender);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!(Responsiveness::parse("less"), Some(Responsiveness::LessResponsive));
        assert_eq!(Responsiveness::parse("More-Responsive"), Some(Responsiveness::MoreResponsive));
        assert_eq!(Responsiveness::parse(" silent "), Some(Responsiveness::Silent));
        assert_eq!(Responsiveness::parse("reset"), Some(Responsiveness::Default));
        assert_eq!(Responsiveness::parse("loud"), None);
    }

    #[tokio::test]
    async fn in_memory_store_roundtrip() {
        let store = InMemorySettingsStore::new();
        assert_eq!(store.responsiveness("c1").await, Responsiveness::Default);

        store.set_responsiveness("c1", Responsiveness::Silent).await;
        assert_eq!(store.responsiveness("c1").await, Responsiveness::Silent);
        assert_eq!(store.responsiveness("c2").await, Responsiveness::Default);

        store.clear_responsiveness("c1").await;
        assert_eq!(store.responsiveness("c1").await, Responsiveness::Default);

        store.set_sender_name("+1555", "Sam").await;
        assert_eq!(store.sender_name("+1555").await.as_deref(), Some("Sam"));
        store.clear_sender_name("+1555").await;
        assert!(store.sender_name("+1555").await.is_none());
    }
}
