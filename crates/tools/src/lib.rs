//! Chat tools for Convoy.
//!
//! These are the capabilities the model can call while answering a message:
//! reply or react in the chat, look at thread and chat metadata, search the
//! chat's history, and adjust per-chat and per-sender settings.
//!
//! Tools that send something check that their run is still the latest one
//! for the chat and record what they sent as an assistant turn.

pub mod args;
pub mod conversation_info;
pub mod rename_conversation;
pub mod responsiveness;
pub mod search_history;
pub mod send_reaction;
pub mod send_text;
pub mod sender_name;
pub mod thread_context;

#[cfg(test)]
pub(crate) mod testing;

use convoy_core::ToolRegistry;

pub use send_text::effect_id;

/// A registry with every chat tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(send_text::SendTextTool));
    registry.register(Box::new(send_reaction::SendReactionTool));
    registry.register(Box::new(thread_context::ThreadContextTool));
    registry.register(Box::new(search_history::SearchHistoryTool));
    registry.register(Box::new(conversation_info::ConversationInfoTool));
    registry.register(Box::new(rename_conversation::RenameConversationTool));
    registry.register(Box::new(responsiveness::ResponsivenessTool));
    registry.register(Box::new(sender_name::SenderNameTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_tools() {
        let registry = default_registry();
        assert_eq!(
            registry.names(),
            vec![
                "assistant_name",
                "assistant_responsiveness",
                "current_conversation_info",
                "get_thread_context",
                "rename_conversation",
                "search_convo_history",
                "send_reaction",
                "send_text",
            ]
        );
        // rename is group-only
        assert_eq!(registry.definitions_for(false).len(), 7);
        assert_eq!(registry.definitions_for(true).len(), 8);
    }
}
