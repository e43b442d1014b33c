//! Conversation store: per-chat state owned by one actor task per chat.
//!
//! Every chat gets its own task holding its [`ConversationState`]; callers
//! talk to it through a bounded mailbox and get answers on oneshot channels.
//! Commands for one chat are applied strictly in order, so each command is a
//! critical section for that chat while unrelated chats proceed in parallel.
//! No network call ever happens while a command is being applied; hydration
//! runs once, before the actor starts draining its mailbox.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convoy_config::AppConfig;
use convoy_core::{
    AgentWorkflowContext, ConversationAccess, ConversationTurn, DedupCursor, IncomingMessage,
    PlatformMessage, ThreadContext, Transport,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const MAILBOX_CAPACITY: usize = 64;

/// Limits applied by the store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub max_history: usize,
    pub hydration_window: usize,
    pub transport_timeout: Duration,
}

impl StoreConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_history: config.agent.max_history,
            hydration_window: config.agent.hydration_window,
            transport_timeout: config.timeouts.transport(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_history: 50,
            hydration_window: 50,
            transport_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DedupVerdict {
    Fresh,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// Registered as the chat's latest run.
    Admitted(AgentWorkflowContext),
    Duplicate,
    /// The chat's actor could not be reached.
    Unavailable,
}

/// Answer to "may this run send now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendGate {
    Allowed,
    /// A newer run owns the chat.
    Superseded,
    /// This run already claimed this delivery (activity retry).
    AlreadySent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FinalizeReport {
    pub responded: bool,
    pub cursor_advanced: bool,
}

/// A cloned view of one chat's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSnapshot {
    pub chat_id: String,
    pub history: Vec<ConversationTurn>,
    pub cursor: Option<DedupCursor>,
    pub latest_sequence: Option<u64>,
    pub in_flight: Vec<u64>,
    pub thread_contexts: HashMap<String, ThreadContext>,
}

#[derive(Debug, Clone)]
struct InFlightRun {
    fingerprint: String,
    summary: ConversationTurn,
    pending: Vec<ConversationTurn>,
    claimed: HashSet<String>,
}

/// The state of one chat. Only its actor task touches it.
#[derive(Debug, Clone)]
pub struct ConversationState {
    chat_id: String,
    max_history: usize,
    history: VecDeque<ConversationTurn>,
    cursor: Option<DedupCursor>,
    thread_contexts: HashMap<String, ThreadContext>,
    latest: Option<u64>,
    next_sequence: u64,
    in_flight: BTreeMap<u64, InFlightRun>,
}

impl ConversationState {
    pub fn new(chat_id: impl Into<String>, max_history: usize) -> Self {
        Self {
            chat_id: chat_id.into(),
            max_history: max_history.max(1),
            history: VecDeque::new(),
            cursor: None,
            thread_contexts: HashMap::new(),
            latest: None,
            next_sequence: 0,
            in_flight: BTreeMap::new(),
        }
    }

    /// Rebuild state from platform history (newest first, as the platform returns it).
    pub fn hydrated(
        chat_id: impl Into<String>,
        max_history: usize,
        recent: Vec<PlatformMessage>,
        seed_id: Option<&str>,
    ) -> Self {
        let mut state = Self::new(chat_id, max_history);
        for message in recent.into_iter().rev() {
            if seed_id == Some(message.id.as_str()) {
                continue;
            }
            let text = message.text.as_deref().map(str::trim).unwrap_or("");
            if text.is_empty() && message.attachment_count == 0 {
                continue;
            }
            if message.from_me {
                let content = if text.is_empty() { "[attachment]" } else { text };
                state.append(ConversationTurn::assistant(content, message.timestamp));
            } else {
                state.append(ConversationTurn::user(
                    platform_summary(&message),
                    message.timestamp,
                ));
                state.cursor = Some(DedupCursor {
                    message_id: Some(message.id.clone()),
                    fingerprint: message.id.clone(),
                    sequence: 0,
                });
            }
        }
        state
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.history.push_back(turn);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.history.iter()
    }

    pub fn cursor(&self) -> Option<&DedupCursor> {
        self.cursor.as_ref()
    }

    pub fn dedup_check(&self, message: &IncomingMessage) -> DedupVerdict {
        let duplicate = match (&self.cursor, message.id()) {
            (None, _) => false,
            (Some(cursor), Some(id)) => cursor.message_id.as_deref() == Some(id),
            (Some(cursor), None) => cursor.fingerprint == message.fingerprint(),
        };
        if duplicate {
            DedupVerdict::Duplicate
        } else {
            DedupVerdict::Fresh
        }
    }

    /// Dedup check and run registration as one step.
    pub fn admit(
        &mut self,
        message: &IncomingMessage,
        run_id: String,
        started_at: DateTime<Utc>,
    ) -> AdmitOutcome {
        if self.dedup_check(message) == DedupVerdict::Duplicate {
            return AdmitOutcome::Duplicate;
        }
        let fingerprint = message.fingerprint();
        if self
            .in_flight
            .values()
            .any(|run| run.fingerprint == fingerprint)
        {
            return AdmitOutcome::Duplicate;
        }

        self.next_sequence += 1;
        let sequence = self.next_sequence;
        self.in_flight.insert(
            sequence,
            InFlightRun {
                fingerprint,
                summary: ConversationTurn::user(message.summary_for_history(), message.timestamp),
                pending: Vec::new(),
                claimed: HashSet::new(),
            },
        );
        self.latest = Some(sequence);

        AdmitOutcome::Admitted(AgentWorkflowContext {
            run_id,
            chat_id: self.chat_id.clone(),
            message_id: message.id().map(str::to_string),
            sequence,
            started_at,
        })
    }

    pub fn is_latest(&self, sequence: u64) -> bool {
        self.latest == Some(sequence)
    }

    /// History as seen by run `sequence`: committed turns plus the messages of
    /// older runs that have not finalized yet.
    pub fn history_for(&self, sequence: Option<u64>) -> Vec<ConversationTurn> {
        let mut turns: Vec<ConversationTurn> = self.history.iter().cloned().collect();
        if let Some(sequence) = sequence {
            turns.extend(
                self.in_flight
                    .range(..sequence)
                    .flat_map(|(_, run)| {
                        std::iter::once(&run.summary).chain(run.pending.iter())
                    })
                    .cloned(),
            );
        }
        let excess = turns.len().saturating_sub(self.max_history);
        turns.drain(..excess);
        turns
    }

    pub fn authorize_send(&mut self, sequence: u64, key: &str) -> SendGate {
        if !self.is_latest(sequence) {
            return SendGate::Superseded;
        }
        match self.in_flight.get_mut(&sequence) {
            Some(run) => {
                if run.claimed.insert(key.to_string()) {
                    SendGate::Allowed
                } else {
                    SendGate::AlreadySent
                }
            }
            None => SendGate::Allowed,
        }
    }

    pub fn record_assistant_turn(&mut self, sequence: u64, turn: ConversationTurn) {
        match self.in_flight.get_mut(&sequence) {
            Some(run) => run.pending.push(turn),
            None => self.append(turn),
        }
    }

    /// Commit the run's message and replies, advance the cursor, refresh the
    /// thread context. Safe to call for superseded and for abandoned runs.
    pub fn finalize(&mut self, run: &AgentWorkflowContext, message: &IncomingMessage) -> FinalizeReport {
        let responded = match self.in_flight.remove(&run.sequence) {
            Some(finished) => {
                let responded = !finished.pending.is_empty();
                self.append(finished.summary);
                for turn in finished.pending {
                    self.append(turn);
                }
                responded
            }
            None => false,
        };

        let cursor_advanced = self
            .cursor
            .as_ref()
            .is_none_or(|cursor| run.sequence >= cursor.sequence);
        if cursor_advanced {
            self.cursor = Some(DedupCursor {
                message_id: message.id().map(str::to_string),
                fingerprint: message.fingerprint(),
                sequence: run.sequence,
            });
        }

        if let Some(root) = message.thread_root() {
            let context = ThreadContext {
                thread_root_id: root.to_string(),
                last_message_id: message.id().map(str::to_string),
                last_text: message.text.clone(),
                last_sender: message.sender.clone(),
                last_timestamp: message.timestamp,
                last_image_urls: message
                    .image_attachments()
                    .filter_map(|a| a.url.clone().or_else(|| a.data_url.clone()))
                    .collect(),
            };
            self.set_thread_context(context);
        }

        FinalizeReport {
            responded,
            cursor_advanced,
        }
    }

    /// Commit runs older than `sequence` that will never finalize themselves
    /// (terminated by the durable engine). Their cursor is not touched.
    pub fn abandon_before(&mut self, sequence: u64) -> usize {
        let stale: Vec<u64> = self.in_flight.range(..sequence).map(|(seq, _)| *seq).collect();
        for seq in &stale {
            if let Some(run) = self.in_flight.remove(seq) {
                self.append(run.summary);
                for turn in run.pending {
                    self.append(turn);
                }
            }
        }
        stale.len()
    }

    pub fn thread_context(&self, root: &str) -> Option<ThreadContext> {
        self.thread_contexts.get(root).cloned()
    }

    pub fn set_thread_context(&mut self, context: ThreadContext) {
        let previous = self.thread_contexts.get(&context.thread_root_id).cloned();
        let merged = context.merged_over(previous.as_ref());
        self.thread_contexts
            .insert(merged.thread_root_id.clone(), merged);
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            chat_id: self.chat_id.clone(),
            history: self.history.iter().cloned().collect(),
            cursor: self.cursor.clone(),
            latest_sequence: self.latest,
            in_flight: self.in_flight.keys().copied().collect(),
            thread_contexts: self.thread_contexts.clone(),
        }
    }
}

fn platform_summary(message: &PlatformMessage) -> String {
    let sender = message
        .sender
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("unknown");
    let text = message.text.as_deref().map(str::trim).unwrap_or("");
    let text = if text.is_empty() { "[no text]" } else { text };
    if message.attachment_count > 0 {
        format!("{sender}: {text} [{} attachment(s)]", message.attachment_count)
    } else {
        format!("{sender}: {text}")
    }
}

enum ChatCommand {
    Admit {
        message: IncomingMessage,
        run_id: String,
        started_at: DateTime<Utc>,
        reply: oneshot::Sender<AdmitOutcome>,
    },
    DedupCheck {
        message: IncomingMessage,
        reply: oneshot::Sender<DedupVerdict>,
    },
    Append {
        turn: ConversationTurn,
        reply: oneshot::Sender<()>,
    },
    History {
        sequence: Option<u64>,
        reply: oneshot::Sender<Vec<ConversationTurn>>,
    },
    IsLatest {
        sequence: u64,
        reply: oneshot::Sender<bool>,
    },
    AuthorizeSend {
        sequence: u64,
        key: String,
        reply: oneshot::Sender<SendGate>,
    },
    RecordAssistantTurn {
        sequence: u64,
        content: String,
        reply: oneshot::Sender<()>,
    },
    Finalize {
        run: AgentWorkflowContext,
        message: IncomingMessage,
        reply: oneshot::Sender<FinalizeReport>,
    },
    AbandonBefore {
        sequence: u64,
        reply: oneshot::Sender<usize>,
    },
    GetThreadContext {
        root: String,
        reply: oneshot::Sender<Option<ThreadContext>>,
    },
    SetThreadContext {
        context: ThreadContext,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<ConversationSnapshot>,
    },
}

impl ChatCommand {
    fn apply(self, state: &mut ConversationState) {
        // A dropped receiver means the caller gave up; nothing to do.
        match self {
            Self::Admit {
                message,
                run_id,
                started_at,
                reply,
            } => {
                let _ = reply.send(state.admit(&message, run_id, started_at));
            }
            Self::DedupCheck { message, reply } => {
                let _ = reply.send(state.dedup_check(&message));
            }
            Self::Append { turn, reply } => {
                state.append(turn);
                let _ = reply.send(());
            }
            Self::History { sequence, reply } => {
                let _ = reply.send(state.history_for(sequence));
            }
            Self::IsLatest { sequence, reply } => {
                let _ = reply.send(state.is_latest(sequence));
            }
            Self::AuthorizeSend {
                sequence,
                key,
                reply,
            } => {
                let _ = reply.send(state.authorize_send(sequence, &key));
            }
            Self::RecordAssistantTurn {
                sequence,
                content,
                reply,
            } => {
                state.record_assistant_turn(sequence, ConversationTurn::assistant(content, Utc::now()));
                let _ = reply.send(());
            }
            Self::Finalize {
                run,
                message,
                reply,
            } => {
                let _ = reply.send(state.finalize(&run, &message));
            }
            Self::AbandonBefore { sequence, reply } => {
                let _ = reply.send(state.abandon_before(sequence));
            }
            Self::GetThreadContext { root, reply } => {
                let _ = reply.send(state.thread_context(&root));
            }
            Self::SetThreadContext { context, reply } => {
                state.set_thread_context(context);
                let _ = reply.send(());
            }
            Self::Snapshot { reply } => {
                let _ = reply.send(state.snapshot());
            }
        }
    }
}

/// Process-wide registry of chat actors.
pub struct ConversationStore {
    chats: Mutex<HashMap<String, mpsc::Sender<ChatCommand>>>,
    transport: Option<Arc<dyn Transport>>,
    config: StoreConfig,
}

impl ConversationStore {
    /// A store that hydrates new chats from the transport.
    pub fn new(transport: Arc<dyn Transport>, config: StoreConfig) -> Self {
        Self {
            chats: Mutex::new(HashMap::new()),
            transport: Some(transport),
            config,
        }
    }

    /// A store whose chats always start empty.
    pub fn without_hydration(config: StoreConfig) -> Self {
        Self {
            chats: Mutex::new(HashMap::new()),
            transport: None,
            config,
        }
    }

    fn handle(&self, chat_id: &str, seed: Option<&IncomingMessage>) -> mpsc::Sender<ChatCommand> {
        let mut chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = chats.get(chat_id) {
            if !sender.is_closed() {
                return sender.clone();
            }
            warn!(chat_id = %chat_id, "Chat actor stopped, starting a new one");
        }

        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        chats.insert(chat_id.to_string(), tx.clone());
        tokio::spawn(run_actor(
            chat_id.to_string(),
            seed.and_then(|m| m.id().map(str::to_string)),
            self.transport.clone(),
            self.config.clone(),
            rx,
        ));
        tx
    }

    async fn request<T>(
        &self,
        chat_id: &str,
        seed: Option<&IncomingMessage>,
        command: impl FnOnce(oneshot::Sender<T>) -> ChatCommand,
    ) -> Option<T> {
        let sender = self.handle(chat_id, seed);
        let (tx, rx) = oneshot::channel();
        if sender.send(command(tx)).await.is_err() {
            warn!(chat_id = %chat_id, "Chat actor mailbox closed");
            return None;
        }
        match rx.await {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(chat_id = %chat_id, "Chat actor dropped a request");
                None
            }
        }
    }

    /// Make sure the chat exists (hydrating it on first sight) and return its state.
    pub async fn get_or_hydrate(
        &self,
        chat_id: &str,
        seed: Option<&IncomingMessage>,
    ) -> Option<ConversationSnapshot> {
        self.request(chat_id, seed, |reply| ChatCommand::Snapshot { reply })
            .await
    }

    pub async fn snapshot(&self, chat_id: &str) -> Option<ConversationSnapshot> {
        let known = self
            .chats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(chat_id);
        if !known {
            return None;
        }
        self.get_or_hydrate(chat_id, None).await
    }

    pub async fn append(&self, chat_id: &str, turn: ConversationTurn) {
        self.request(chat_id, None, |reply| ChatCommand::Append { turn, reply })
            .await;
    }

    /// Read-only duplicate check against the cursor.
    pub async fn dedup_check(&self, message: &IncomingMessage) -> DedupVerdict {
        let owned = message.clone();
        self.request(&message.chat_id, Some(message), |reply| ChatCommand::DedupCheck {
            message: owned,
            reply,
        })
        .await
        .unwrap_or(DedupVerdict::Fresh)
    }

    /// Dedup check plus registration as the chat's latest run, atomically.
    pub async fn admit(
        &self,
        message: &IncomingMessage,
        run_id: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> AdmitOutcome {
        let owned = message.clone();
        let run_id = run_id.into();
        let outcome = self
            .request(&message.chat_id, Some(message), |reply| ChatCommand::Admit {
                message: owned,
                run_id,
                started_at,
                reply,
            })
            .await
            .unwrap_or(AdmitOutcome::Unavailable);
        if let AdmitOutcome::Admitted(run) = &outcome {
            info!(chat_id = %run.chat_id, sequence = run.sequence, "Run registered as latest");
        }
        outcome
    }

    pub async fn history_for(&self, chat_id: &str, sequence: Option<u64>) -> Vec<ConversationTurn> {
        self.request(chat_id, None, |reply| ChatCommand::History { sequence, reply })
            .await
            .unwrap_or_default()
    }

    pub async fn is_latest_sequence(&self, chat_id: &str, sequence: u64) -> bool {
        self.request(chat_id, None, |reply| ChatCommand::IsLatest { sequence, reply })
            .await
            .unwrap_or(false)
    }

    pub async fn authorize_send(&self, run: &AgentWorkflowContext, key: &str) -> SendGate {
        let key = key.to_string();
        let sequence = run.sequence;
        self.request(&run.chat_id, None, |reply| ChatCommand::AuthorizeSend {
            sequence,
            key,
            reply,
        })
        .await
        .unwrap_or(SendGate::Superseded)
    }

    pub async fn finalize(
        &self,
        run: &AgentWorkflowContext,
        message: &IncomingMessage,
    ) -> FinalizeReport {
        let (owned_run, owned_message) = (run.clone(), message.clone());
        let report = self
            .request(&run.chat_id, None, |reply| ChatCommand::Finalize {
                run: owned_run,
                message: owned_message,
                reply,
            })
            .await
            .unwrap_or(FinalizeReport {
                responded: false,
                cursor_advanced: false,
            });
        debug!(
            chat_id = %run.chat_id,
            sequence = run.sequence,
            responded = report.responded,
            "Run finalized"
        );
        report
    }

    pub async fn abandon_before(&self, chat_id: &str, sequence: u64) -> usize {
        self.request(chat_id, None, |reply| ChatCommand::AbandonBefore { sequence, reply })
            .await
            .unwrap_or(0)
    }

    pub async fn set_thread_context(&self, chat_id: &str, context: ThreadContext) {
        self.request(chat_id, None, |reply| ChatCommand::SetThreadContext { context, reply })
            .await;
    }
}

#[async_trait]
impl ConversationAccess for ConversationStore {
    async fn is_latest(&self, run: &AgentWorkflowContext) -> bool {
        self.is_latest_sequence(&run.chat_id, run.sequence).await
    }

    async fn record_assistant_turn(&self, run: &AgentWorkflowContext, content: String) {
        let sequence = run.sequence;
        self.request(&run.chat_id, None, |reply| ChatCommand::RecordAssistantTurn {
            sequence,
            content,
            reply,
        })
        .await;
    }

    async fn thread_context(&self, chat_id: &str, thread_root_id: &str) -> Option<ThreadContext> {
        let root = thread_root_id.to_string();
        self.request(chat_id, None, |reply| ChatCommand::GetThreadContext { root, reply })
            .await
            .flatten()
    }

    async fn history(&self, chat_id: &str) -> Vec<ConversationTurn> {
        self.history_for(chat_id, None).await
    }
}

async fn run_actor(
    chat_id: String,
    seed_id: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    config: StoreConfig,
    mut mailbox: mpsc::Receiver<ChatCommand>,
) {
    let mut state = match transport {
        Some(transport) => hydrate(&chat_id, seed_id.as_deref(), transport.as_ref(), &config).await,
        None => ConversationState::new(&chat_id, config.max_history),
    };

    while let Some(command) = mailbox.recv().await {
        command.apply(&mut state);
    }
    debug!(chat_id = %chat_id, "Chat actor stopped");
}

/// Best effort: any failure yields an empty state.
async fn hydrate(
    chat_id: &str,
    seed_id: Option<&str>,
    transport: &dyn Transport,
    config: &StoreConfig,
) -> ConversationState {
    let fetch = transport.recent_messages(chat_id, config.hydration_window);
    match tokio::time::timeout(config.transport_timeout, fetch).await {
        Ok(Ok(recent)) => {
            let count = recent.len();
            let state = ConversationState::hydrated(chat_id, config.max_history, recent, seed_id);
            info!(chat_id = %chat_id, fetched = count, kept = state.history.len(), "Hydrated chat history");
            state
        }
        Ok(Err(e)) => {
            warn!(chat_id = %chat_id, error = %e, "History hydration failed, starting empty");
            ConversationState::new(chat_id, config.max_history)
        }
        Err(_) => {
            warn!(chat_id = %chat_id, "History hydration timed out, starting empty");
            ConversationState::new(chat_id, config.max_history)
        }
    }
}
