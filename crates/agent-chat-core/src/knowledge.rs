//! Knowledge base and memory panel.
//!
//! Read-only view over the backend's RAG index and conversation memory, plus
//! on-demand similarity search. Each fetch replaces its own field wholesale;
//! a failure records `error` and leaves the other fields untouched.

use crate::client::AgentBackend;
use crate::error::ApiError;
use crate::session::SessionEvent;
use crate::types::{KnowledgeSearchResponse, KnowledgeStats, MemoryStats};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeState {
    pub knowledge_stats: Option<KnowledgeStats>,
    pub memory_stats: Option<MemoryStats>,
    pub search_results: Option<KnowledgeSearchResponse>,
    /// True while any fetch is in flight.
    pub is_loading: bool,
    pub error: Option<String>,
}

pub struct KnowledgePanel {
    backend: Arc<dyn AgentBackend>,
    search_limit: usize,
    state: watch::Sender<KnowledgeState>,
    in_flight: AtomicUsize,
    disposed: AtomicBool,
}

impl KnowledgePanel {
    pub fn new(backend: Arc<dyn AgentBackend>) -> Self {
        Self::with_search_limit(backend, DEFAULT_SEARCH_LIMIT)
    }

    pub fn with_search_limit(backend: Arc<dyn AgentBackend>, search_limit: usize) -> Self {
        let (state, _) = watch::channel(KnowledgeState::default());
        Self {
            backend,
            search_limit: search_limit.max(1),
            state,
            in_flight: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> KnowledgeState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<KnowledgeState> {
        self.state.subscribe()
    }

    pub fn shutdown(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn update(&self, f: impl FnOnce(&mut KnowledgeState)) {
        if self.is_disposed() {
            return;
        }
        self.state.send_modify(f);
    }

    /// Wraps one backend call: clears `error` and raises `is_loading` before,
    /// stores the value or the error after. `is_loading` drops only when the
    /// last concurrent fetch finishes.
    async fn tracked<T, F>(
        &self,
        what: &'static str,
        call: F,
        store: impl FnOnce(&mut KnowledgeState, T),
    ) -> Option<T>
    where
        T: Clone,
        F: Future<Output = Result<T, ApiError>>,
    {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.update(|s| {
            s.is_loading = true;
            s.error = None;
        });

        let result = call.await;
        let disposed = self.is_disposed();
        let mut value = None;
        self.state.send_if_modified(|s| {
            let remaining = self.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
            if disposed {
                return false;
            }
            match &result {
                Ok(v) => {
                    store(s, v.clone());
                    value = Some(v.clone());
                }
                Err(e) => {
                    tracing::warn!(error = %e, what, "knowledge panel fetch failed");
                    s.error = Some(e.message.clone());
                }
            }
            if remaining == 0 {
                s.is_loading = false;
            }
            true
        });
        value
    }

    pub async fn fetch_knowledge_stats(&self) -> Option<KnowledgeStats> {
        self.tracked(
            "knowledge_stats",
            self.backend.get_knowledge_stats(),
            |s, v| s.knowledge_stats = Some(v),
        )
        .await
    }

    pub async fn fetch_memory_stats(&self) -> Option<MemoryStats> {
        self.tracked(
            "memory_stats",
            self.backend.get_memory_stats(),
            |s, v| s.memory_stats = Some(v),
        )
        .await
    }

    /// Similarity search. A blank query returns `None` without a backend call.
    /// `limit` falls back to the configured search limit.
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Option<KnowledgeSearchResponse> {
        if query.trim().is_empty() {
            return None;
        }
        let limit = limit.unwrap_or(self.search_limit);
        tracing::debug!(query, limit, "knowledge search");
        self.tracked(
            "search",
            self.backend.search_knowledge(query, limit),
            |s, v| s.search_results = Some(v),
        )
        .await
    }

    /// Fetches knowledge and memory stats concurrently.
    pub async fn refresh_all(&self) {
        tokio::join!(self.fetch_knowledge_stats(), self.fetch_memory_stats());
    }

    pub fn clear_search_results(&self) {
        self.update(|s| s.search_results = None);
    }

    /// Calls [`refresh_all`](Self::refresh_all) after every sent message until
    /// the session's event channel closes or the panel is shut down.
    pub fn watch_refresh(self: &Arc<Self>, mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
        let panel = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::MessageSent) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "knowledge panel lagged behind session events");
                    }
                    Err(RecvError::Closed) => break,
                }
                if panel.is_disposed() {
                    break;
                }
                panel.refresh_all().await;
            }
        })
    }
}
