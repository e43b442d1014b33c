//! Test doubles shared by the tool tests.

use async_trait::async_trait;
use chrono::Utc;
use convoy_core::{
    AgentWorkflowContext, AttachmentData, ChatInfo, ConversationAccess, ConversationTurn,
    InMemorySettingsStore, IncomingMessage, OutboundAttachment, PlatformMessage, SendTextRequest,
    ThreadContext, ToolContext, Transport, TransportError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Conversation access with a switchable "latest" flag.
pub struct FakeConversation {
    pub latest: AtomicBool,
    pub recorded: Mutex<Vec<String>>,
    pub threads: Mutex<HashMap<String, ThreadContext>>,
}

impl FakeConversation {
    pub fn new() -> Self {
        Self {
            latest: AtomicBool::new(true),
            recorded: Mutex::new(Vec::new()),
            threads: Mutex::new(HashMap::new()),
        }
    }

    pub fn superseded(self) -> Self {
        self.latest.store(false, Ordering::SeqCst);
        self
    }

    pub fn recorded(&self) -> Vec<String> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationAccess for FakeConversation {
    async fn is_latest(&self, _run: &AgentWorkflowContext) -> bool {
        self.latest.load(Ordering::SeqCst)
    }

    async fn record_assistant_turn(&self, _run: &AgentWorkflowContext, content: String) {
        self.recorded.lock().unwrap().push(content);
    }

    async fn thread_context(&self, _chat_id: &str, thread_root_id: &str) -> Option<ThreadContext> {
        self.threads.lock().unwrap().get(thread_root_id).cloned()
    }

    async fn history(&self, _chat_id: &str) -> Vec<ConversationTurn> {
        Vec::new()
    }
}

/// Records sends; answers reads from a fixed message list.
#[derive(Default)]
pub struct FakeTransport {
    pub messages: Vec<PlatformMessage>,
    pub fail: bool,
    pub texts: Mutex<Vec<SendTextRequest>>,
    pub reactions: Mutex<Vec<(String, String, String, Option<u32>)>>,
    pub renames: Mutex<Vec<(String, String)>>,
}

impl FakeTransport {
    fn check(&self, operation: &str) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::RequestFailed {
                operation: operation.into(),
                reason: "HTTP 500".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn name(&self) -> &str {
        "fake"
    }

    async fn recent_messages(
        &self,
        _chat_id: &str,
        limit: usize,
    ) -> Result<Vec<PlatformMessage>, TransportError> {
        Ok(self.messages.iter().take(limit).cloned().collect())
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<PlatformMessage>, TransportError> {
        Ok(self.messages.iter().find(|m| m.id == message_id).cloned())
    }

    async fn send_text(&self, request: SendTextRequest) -> Result<(), TransportError> {
        self.check("send_text")?;
        self.texts.lock().unwrap().push(request);
        Ok(())
    }

    async fn send_reaction(
        &self,
        chat_id: &str,
        message_id: &str,
        reaction: &str,
        part_index: Option<u32>,
    ) -> Result<(), TransportError> {
        self.check("send_reaction")?;
        self.reactions.lock().unwrap().push((
            chat_id.into(),
            message_id.into(),
            reaction.into(),
            part_index,
        ));
        Ok(())
    }

    async fn send_multipart(
        &self,
        _chat_id: &str,
        _caption: Option<&str>,
        _attachments: Vec<OutboundAttachment>,
    ) -> Result<(), TransportError> {
        self.check("send_multipart")
    }

    async fn download_attachment(&self, _attachment_id: &str) -> Result<AttachmentData, TransportError> {
        Err(TransportError::NotConfigured("downloads".into()))
    }

    async fn chat_info(&self, chat_id: &str) -> Result<ChatInfo, TransportError> {
        self.check("chat_info")?;
        Ok(ChatInfo {
            chat_id: chat_id.into(),
            display_name: Some("Weekend plans".into()),
            participants: vec!["+15550001".into(), "+15550002".into()],
            is_group: true,
        })
    }

    async fn rename_chat(&self, chat_id: &str, name: &str) -> Result<(), TransportError> {
        self.check("rename_chat")?;
        self.renames.lock().unwrap().push((chat_id.into(), name.into()));
        Ok(())
    }

    async fn search_messages(
        &self,
        _chat_id: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PlatformMessage>, TransportError> {
        self.check("search_messages")?;
        let query = query.to_lowercase();
        Ok(self
            .messages
            .iter()
            .filter(|m| m.text.as_deref().is_some_and(|t| t.to_lowercase().contains(&query)))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

pub fn platform_message(id: &str, text: &str) -> PlatformMessage {
    PlatformMessage {
        id: id.into(),
        text: Some(text.into()),
        from_me: false,
        sender: Some("+15550001".into()),
        timestamp: Utc::now(),
        attachment_count: 0,
    }
}

pub fn context(
    message: IncomingMessage,
    conversation: Arc<FakeConversation>,
    transport: Arc<FakeTransport>,
) -> ToolContext {
    ToolContext {
        run: AgentWorkflowContext {
            run_id: format!("chat-{}", message.chat_id),
            chat_id: message.chat_id.clone(),
            message_id: message.id().map(str::to_string),
            sequence: 1,
            started_at: Utc::now(),
        },
        message,
        conversation,
        transport,
        settings: Arc::new(InMemorySettingsStore::new()),
    }
}
