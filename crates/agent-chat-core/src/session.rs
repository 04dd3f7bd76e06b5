//! Chat session controller.
//!
//! Owns the ordered message log and the request lifecycle flags. All state
//! changes go through [`ChatAction`] and the pure [`reduce`] function; the
//! controller only decides which actions to dispatch around backend calls.
//!
//! State lives in a `tokio::sync::watch` channel so front-ends can both read a
//! snapshot and await changes. The watch borrow is never held across an
//! `.await`.

use crate::client::AgentBackend;
use crate::error::ApiError;
use crate::types::{parse_timestamp, Message, MessageMetadata, MessagePatch, Role};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

const EVENT_CAPACITY: usize = 16;

/// Conversation state. Created empty, discarded with the controller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub is_connected: bool,
}

/// Every transition the session state supports.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatAction {
    AddMessage(Message),
    SetLoading(bool),
    SetError(Option<String>),
    SetConnected(bool),
    ClearMessages,
    /// Patches the final entry in place; no-op on an empty log.
    UpdateLastMessage(MessagePatch),
    /// Patches the entry with this id; no-op when it is gone.
    UpdateMessage { id: String, patch: MessagePatch },
    /// Wholesale replacement (history load).
    ReplaceMessages(Vec<Message>),
}

impl ChatAction {
    fn name(&self) -> &'static str {
        match self {
            ChatAction::AddMessage(_) => "add_message",
            ChatAction::SetLoading(_) => "set_loading",
            ChatAction::SetError(_) => "set_error",
            ChatAction::SetConnected(_) => "set_connected",
            ChatAction::ClearMessages => "clear_messages",
            ChatAction::UpdateLastMessage(_) => "update_last_message",
            ChatAction::UpdateMessage { .. } => "update_message",
            ChatAction::ReplaceMessages(_) => "replace_messages",
        }
    }
}

/// Applies one action. The log only grows, has one entry patched in place, or
/// is replaced/cleared as a whole.
pub fn reduce(state: &mut SessionState, action: ChatAction) {
    match action {
        ChatAction::AddMessage(message) => state.messages.push(message),
        ChatAction::SetLoading(loading) => state.is_loading = loading,
        ChatAction::SetError(error) => state.error = error,
        ChatAction::SetConnected(connected) => state.is_connected = connected,
        ChatAction::ClearMessages => state.messages.clear(),
        ChatAction::UpdateLastMessage(patch) => {
            if let Some(last) = state.messages.last_mut() {
                patch.apply(last);
            }
        }
        ChatAction::UpdateMessage { id, patch } => {
            if let Some(message) = state.messages.iter_mut().rev().find(|m| m.id == id) {
                patch.apply(message);
            }
        }
        ChatAction::ReplaceMessages(messages) => state.messages = messages,
    }
}

/// Notifications for collaborators (status poller, knowledge panel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A send completed successfully or a new conversation was started.
    MessageSent,
}

/// `msg-{millis}-{counter}`; unique within one controller.
#[derive(Debug, Default)]
struct MessageIdGenerator {
    counter: AtomicU64,
}

impl MessageIdGenerator {
    fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("msg-{}-{}", Utc::now().timestamp_millis(), n)
    }
}

pub struct SessionController {
    backend: Arc<dyn AgentBackend>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    ids: MessageIdGenerator,
    disposed: AtomicBool,
}

impl SessionController {
    /// Creates an idle controller with empty state. Call [`initialize`](Self::initialize)
    /// (or use [`connect`](Self::connect)) to sync with the backend.
    pub fn new(backend: Arc<dyn AgentBackend>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            state,
            events,
            ids: MessageIdGenerator::default(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Creates a controller and runs the start-up sequence.
    pub async fn connect(backend: Arc<dyn AgentBackend>) -> Arc<Self> {
        let controller = Arc::new(Self::new(backend));
        controller.initialize().await;
        controller
    }

    /// Start-up: check the connection, then load history if `/health` answered.
    /// Returns whether the backend was reachable.
    pub async fn initialize(&self) -> bool {
        let reachable = self.check_connection().await;
        if reachable {
            self.load_conversation().await;
        }
        let (connected, messages) = {
            let state = self.state.borrow();
            (state.is_connected, state.messages.len())
        };
        tracing::info!(reachable, connected, messages, "chat session initialized");
        reachable
    }

    // -----------------------------------------------------------------------
    // State access
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.borrow().messages.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Receiver for [`SessionEvent`]s.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Marks the controller disposed. Responses that arrive afterwards are dropped.
    pub fn shutdown(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn dispatch(&self, action: ChatAction) {
        if self.is_disposed() {
            tracing::debug!(action = action.name(), "session disposed; dropping action");
            return;
        }
        self.state.send_modify(|state| reduce(state, action));
    }

    fn notify_message_sent(&self) {
        if self.is_disposed() {
            return;
        }
        // no subscribers is fine
        let _ = self.events.send(SessionEvent::MessageSent);
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Appends a message with a fresh id and the current time.
    pub fn add_message(
        &self,
        role: Role,
        content: impl Into<String>,
        metadata: Option<MessageMetadata>,
    ) -> Message {
        let message = Message {
            id: self.ids.next(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
        };
        self.dispatch(ChatAction::AddMessage(message.clone()));
        message
    }

    /// Sends `content` to the agent. Never fails: a backend failure becomes
    /// the `error` field plus an assistant entry flagged with `metadata.error`.
    /// Blank input is ignored without touching the backend.
    pub async fn send(&self, content: &str) {
        if content.trim().is_empty() {
            return;
        }

        self.add_message(Role::User, content, None);
        self.dispatch(ChatAction::SetLoading(true));
        self.dispatch(ChatAction::SetError(None));

        match self.backend.send_message(content).await {
            Ok(reply) => {
                self.add_message(Role::Assistant, reply.response, reply.metadata);
                self.notify_message_sent();
            }
            Err(e) => self.record_send_failure(&e),
        }

        self.dispatch(ChatAction::SetLoading(false));
    }

    fn record_send_failure(&self, err: &ApiError) {
        tracing::warn!(error = %err, status = ?err.status, "chat send failed");
        self.dispatch(ChatAction::SetError(Some(err.message.clone())));
        self.add_message(
            Role::Assistant,
            format!("Error: {}", err.message),
            Some(MessageMetadata::failure(err.message.clone())),
        );
    }

    /// Like [`send`](Self::send) but through `/chat/stream`: the assistant entry is
    /// appended empty and grows chunk by chunk. Chunks target that entry by id,
    /// whatever else is appended meanwhile.
    pub async fn send_streaming(&self, content: &str) {
        if content.trim().is_empty() {
            return;
        }

        self.add_message(Role::User, content, None);
        self.dispatch(ChatAction::SetLoading(true));
        self.dispatch(ChatAction::SetError(None));
        let reply_id = self.add_message(Role::Assistant, "", None).id;

        let mut received = 0usize;
        let result = {
            let mut on_chunk = |chunk: &str| {
                received += chunk.len();
                self.dispatch(ChatAction::UpdateMessage {
                    id: reply_id.clone(),
                    patch: MessagePatch::append(chunk),
                });
            };
            self.backend.send_message_stream(content, &mut on_chunk).await
        };

        match result {
            Ok(_) => self.notify_message_sent(),
            Err(e) => {
                tracing::warn!(error = %e, received, "streamed chat send failed");
                self.dispatch(ChatAction::SetError(Some(e.message.clone())));
                let notice = if received == 0 {
                    format!("Error: {}", e.message)
                } else {
                    format!("\n\nError: {}", e.message)
                };
                self.dispatch(ChatAction::UpdateMessage {
                    id: reply_id,
                    patch: MessagePatch::append(notice)
                        .with_metadata(MessageMetadata::failure(e.message)),
                });
            }
        }

        self.dispatch(ChatAction::SetLoading(false));
    }

    /// Clears the backend history (best effort) and always empties the local log.
    pub async fn clear(&self) {
        if let Err(e) = self.backend.clear_conversation().await {
            tracing::warn!(error = %e, "backend clear failed; clearing local history anyway");
        }
        self.dispatch(ChatAction::ClearMessages);
    }

    /// Replaces the log with the backend history. Returns whether the fetch succeeded.
    pub async fn load_conversation(&self) -> bool {
        match self.backend.get_conversation().await {
            Ok(history) => {
                let fetched_at = Utc::now();
                let millis = fetched_at.timestamp_millis();
                let messages: Vec<Message> = history
                    .messages
                    .into_iter()
                    .enumerate()
                    .map(|(index, entry)| Message {
                        id: format!("backend-{}-{}", index, millis),
                        role: Role::from_wire(&entry.role),
                        content: entry.content,
                        timestamp: entry
                            .timestamp
                            .as_deref()
                            .and_then(parse_timestamp)
                            .unwrap_or(fetched_at),
                        metadata: None,
                    })
                    .collect();
                tracing::debug!(count = messages.len(), "conversation history loaded");
                self.dispatch(ChatAction::ReplaceMessages(messages));
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load conversation");
                false
            }
        }
    }

    /// Refreshes `is_connected` from `/health`. Returns whether the fetch
    /// succeeded, which is `true` for a degraded backend that still answered.
    /// A failed fetch counts as disconnected.
    pub async fn check_connection(&self) -> bool {
        match self.backend.check_health().await {
            Ok(health) => {
                self.dispatch(ChatAction::SetConnected(health.is_healthy()));
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "health check failed");
                self.dispatch(ChatAction::SetConnected(false));
                false
            }
        }
    }

    fn last_user_content(&self) -> Option<String> {
        self.state
            .borrow()
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
    }

    /// Re-sends the most recent user message. Returns `false` when there is none.
    pub async fn retry_last(&self) -> bool {
        match self.last_user_content() {
            Some(content) => {
                self.send(&content).await;
                true
            }
            None => false,
        }
    }

    /// Resets the backend conversation and clears the log. Unlike the other
    /// operations the failure is returned to the caller after being recorded.
    pub async fn start_new_conversation(&self) -> Result<(), ApiError> {
        self.dispatch(ChatAction::SetLoading(true));
        self.dispatch(ChatAction::SetError(None));

        let result = self.backend.clear_conversation().await;
        match &result {
            Ok(_) => {
                self.dispatch(ChatAction::ClearMessages);
                self.notify_message_sent();
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to start new conversation");
                self.dispatch(ChatAction::SetError(Some(e.message.clone())));
            }
        }

        self.dispatch(ChatAction::SetLoading(false));
        result.map(|_| ())
    }
}
