//! Shared test doubles for the agent crate.

use async_trait::async_trait;
use convoy_core::{
    AttachmentData, ChatInfo, ModelRequest, ModelResponse, OutboundAttachment, PlatformMessage,
    Provider, ProviderError, SendTextRequest, Transport, TransportError,
};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A provider that returns scripted responses in order.
///
/// Once the script is exhausted it repeats `then_always` if set, otherwise
/// it fails with a network error.
pub struct SequentialMockProvider {
    script: Mutex<VecDeque<Result<ModelResponse, ProviderError>>>,
    then_always: Option<ModelResponse>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            then_always: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        let provider = Self::new(vec![]);
        provider.script.lock().unwrap().push_back(Err(error));
        provider
    }

    /// Keep returning `response` after the script runs out.
    pub fn then_always(mut self, response: ModelResponse) -> Self {
        self.then_always = Some(response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.then_always) {
            (Some(result), _) => result,
            (None, Some(response)) => Ok(response.clone()),
            (None, None) => Err(ProviderError::Network("script exhausted".into())),
        }
    }
}

/// A transport that records every outward call.
#[derive(Default)]
pub struct RecordingTransport {
    history: Vec<PlatformMessage>,
    fail_history: bool,
    fail_sends: bool,
    history_fetches: Mutex<usize>,
    texts: Mutex<Vec<SendTextRequest>>,
    reactions: Mutex<Vec<(String, String, String)>>,
    multiparts: Mutex<Vec<(String, Option<String>, usize)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform history, newest first.
    pub fn with_history(mut self, history: Vec<PlatformMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn failing_history(mut self) -> Self {
        self.fail_history = true;
        self
    }

    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn history_fetches(&self) -> usize {
        *self.history_fetches.lock().unwrap()
    }

    pub fn sent_texts(&self) -> Vec<SendTextRequest> {
        self.texts.lock().unwrap().clone()
    }

    pub fn reactions(&self) -> Vec<(String, String, String)> {
        self.reactions.lock().unwrap().clone()
    }

    pub fn multiparts(&self) -> Vec<(String, Option<String>, usize)> {
        self.multiparts.lock().unwrap().clone()
    }

    pub fn outward_calls(&self) -> usize {
        self.sent_texts().len() + self.reactions().len() + self.multiparts().len()
    }

    fn send_result(&self, operation: &str) -> Result<(), TransportError> {
        if self.fail_sends {
            Err(TransportError::RequestFailed {
                operation: operation.into(),
                reason: "simulated failure".into(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn recent_messages(
        &self,
        _chat_id: &str,
        limit: usize,
    ) -> Result<Vec<PlatformMessage>, TransportError> {
        *self.history_fetches.lock().unwrap() += 1;
        if self.fail_history {
            return Err(TransportError::RequestFailed {
                operation: "recent_messages".into(),
                reason: "simulated failure".into(),
            });
        }
        Ok(self.history.iter().take(limit).cloned().collect())
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<PlatformMessage>, TransportError> {
        Ok(self.history.iter().find(|m| m.id == message_id).cloned())
    }

    async fn send_text(&self, request: SendTextRequest) -> Result<(), TransportError> {
        self.send_result("send_text")?;
        self.texts.lock().unwrap().push(request);
        Ok(())
    }

    async fn send_reaction(
        &self,
        chat_id: &str,
        message_id: &str,
        reaction: &str,
        _part_index: Option<u32>,
    ) -> Result<(), TransportError> {
        self.send_result("send_reaction")?;
        self.reactions.lock().unwrap().push((
            chat_id.to_string(),
            message_id.to_string(),
            reaction.to_string(),
        ));
        Ok(())
    }

    async fn send_multipart(
        &self,
        chat_id: &str,
        caption: Option<&str>,
        attachments: Vec<OutboundAttachment>,
    ) -> Result<(), TransportError> {
        self.send_result("send_multipart")?;
        self.multiparts.lock().unwrap().push((
            chat_id.to_string(),
            caption.map(str::to_string),
            attachments.len(),
        ));
        Ok(())
    }

    async fn download_attachment(&self, attachment_id: &str) -> Result<AttachmentData, TransportError> {
        Ok(AttachmentData {
            mime_type: Some("image/png".into()),
            bytes: attachment_id.as_bytes().to_vec(),
        })
    }

    async fn chat_info(&self, chat_id: &str) -> Result<ChatInfo, TransportError> {
        Ok(ChatInfo {
            chat_id: chat_id.to_string(),
            display_name: Some("Test Chat".into()),
            participants: vec!["+15550001".into()],
            is_group: false,
        })
    }

    async fn rename_chat(&self, _chat_id: &str, _name: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn search_messages(
        &self,
        _chat_id: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PlatformMessage>, TransportError> {
        let query = query.to_lowercase();
        Ok(self
            .history
            .iter()
            .filter(|m| {
                m.text
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(&query))
            })
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}
