//! Scripted in-process backend for controller unit tests.

use crate::client::AgentBackend;
use crate::error::ApiError;
use crate::types::{
    AgentStatus, ChatResponse, ClearConversationResponse, ConversationHistory, HealthStatus,
    KnowledgeSearchResponse, KnowledgeSearchResult, KnowledgeStats, MemoryStats,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::oneshot;

struct Step<T> {
    gate: Option<oneshot::Receiver<()>>,
    result: Result<T, ApiError>,
}

/// Queue of canned results, consumed in order; `fallback` answers once empty.
/// A gated step waits until its sender fires (or is dropped).
pub(crate) struct Script<T> {
    queue: Mutex<VecDeque<Step<T>>>,
    fallback: Mutex<Result<T, ApiError>>,
}

impl<T: Clone> Script<T> {
    pub(crate) fn new(fallback: Result<T, ApiError>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
        }
    }

    pub(crate) fn set(&self, fallback: Result<T, ApiError>) {
        *self.fallback.lock().unwrap() = fallback;
    }

    pub(crate) fn push(&self, result: Result<T, ApiError>) {
        self.queue.lock().unwrap().push_back(Step { gate: None, result });
    }

    pub(crate) fn push_gated(&self, result: Result<T, ApiError>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.queue.lock().unwrap().push_back(Step {
            gate: Some(rx),
            result,
        });
        tx
    }

    async fn next(&self) -> Result<T, ApiError> {
        let step = self.queue.lock().unwrap().pop_front();
        match step {
            Some(Step { gate, result }) => {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                result
            }
            None => self.fallback.lock().unwrap().clone(),
        }
    }
}

/// One scripted `/chat/stream` reply: chunks, an optional pause before chunk
/// `at` (`at == chunks.len()` pauses before finishing), then an optional error.
#[derive(Default)]
pub(crate) struct StreamStep {
    chunks: Vec<String>,
    pause: Option<(usize, oneshot::Receiver<()>)>,
    error: Option<ApiError>,
}

pub(crate) fn healthy() -> HealthStatus {
    HealthStatus {
        status: "healthy".into(),
        agent_initialized: true,
        agent_name: Some("test-agent".into()),
        mcp_enabled: Some(false),
        mcp_tools: None,
        timestamp: Some(0.0),
    }
}

pub(crate) fn health_with(status: &str, agent_initialized: bool) -> HealthStatus {
    HealthStatus {
        status: status.into(),
        agent_initialized,
        ..healthy()
    }
}

pub(crate) fn agent_status() -> AgentStatus {
    AgentStatus {
        status: "running".into(),
        agent_name: "test-agent".into(),
        llm_model: "llama3".into(),
        ollama_url: "http://localhost:11434".into(),
        rag_enabled: true,
        mcp_enabled: false,
        mcp_tools: None,
        conversation_length: 0,
    }
}

pub(crate) fn knowledge_stats(chunk_count: usize) -> KnowledgeStats {
    KnowledgeStats {
        enabled: true,
        chunk_count,
        embedding_model: Some("nomic-embed-text".into()),
        vector_db_path: None,
        chunk_size: Some(500),
        similarity_threshold: Some(0.5),
        error: None,
    }
}

pub(crate) fn memory_stats(conversation_length: usize) -> MemoryStats {
    MemoryStats {
        conversation_length,
        max_conversation_length: 50,
        estimated_tokens: 120,
        persistence_enabled: true,
        system_prompt_set: true,
    }
}

pub(crate) fn failure(message: &str) -> ApiError {
    ApiError::transport(message)
}

/// Backend double: scripted responses plus a log of the calls made.
pub(crate) struct ScriptedBackend {
    pub health: Script<HealthStatus>,
    pub status: Script<AgentStatus>,
    pub chat: Script<ChatResponse>,
    stream: Mutex<VecDeque<StreamStep>>,
    pub conversation: Script<ConversationHistory>,
    pub clear: Script<ClearConversationResponse>,
    pub knowledge: Script<KnowledgeStats>,
    pub memory: Script<MemoryStats>,
    pub search: Script<Vec<KnowledgeSearchResult>>,
    calls: Mutex<Vec<String>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            health: Script::new(Ok(healthy())),
            status: Script::new(Ok(agent_status())),
            chat: Script::new(Ok(ChatResponse {
                response: "ok".into(),
                metadata: None,
            })),
            stream: Mutex::new(VecDeque::new()),
            conversation: Script::new(Ok(ConversationHistory {
                messages: Vec::new(),
                conversation_length: 0,
            })),
            clear: Script::new(Ok(ClearConversationResponse {
                message: "Conversation cleared".into(),
                conversation_length: 0,
            })),
            knowledge: Script::new(Ok(knowledge_stats(0))),
            memory: Script::new(Ok(memory_stats(0))),
            search: Script::new(Ok(Vec::new())),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedBackend {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn push_stream(&self, chunks: &[&str], error: Option<ApiError>) {
        self.stream.lock().unwrap().push_back(StreamStep {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            pause: None,
            error,
        });
    }

    /// Like [`push_stream`](Self::push_stream) but holds before chunk `at`
    /// until the returned sender fires.
    pub(crate) fn push_stream_gated(
        &self,
        chunks: &[&str],
        at: usize,
        error: Option<ApiError>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.stream.lock().unwrap().push_back(StreamStep {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            pause: Some((at, rx)),
            error,
        });
        tx
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl AgentBackend for ScriptedBackend {
    async fn check_health(&self) -> Result<HealthStatus, ApiError> {
        self.record("health");
        self.health.next().await
    }

    async fn get_status(&self) -> Result<AgentStatus, ApiError> {
        self.record("status");
        self.status.next().await
    }

    async fn send_message(&self, message: &str) -> Result<ChatResponse, ApiError> {
        self.record(format!("chat:{}", message));
        self.chat.next().await
    }

    async fn send_message_stream(
        &self,
        message: &str,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String, ApiError> {
        self.record(format!("stream:{}", message));
        let step = self.stream.lock().unwrap().pop_front();
        let StreamStep {
            chunks,
            mut pause,
            error,
        } = step.unwrap_or_default();
        let mut full = String::new();
        for index in 0..=chunks.len() {
            if pause.as_ref().is_some_and(|(at, _)| *at == index) {
                if let Some((_, gate)) = pause.take() {
                    let _ = gate.await;
                }
            }
            if let Some(chunk) = chunks.get(index) {
                on_chunk(chunk);
                full.push_str(chunk);
            }
        }
        match error {
            Some(e) => Err(e),
            None => Ok(full),
        }
    }

    async fn get_conversation(&self) -> Result<ConversationHistory, ApiError> {
        self.record("conversation");
        self.conversation.next().await
    }

    async fn clear_conversation(&self) -> Result<ClearConversationResponse, ApiError> {
        self.record("clear");
        self.clear.next().await
    }

    async fn get_knowledge_stats(&self) -> Result<KnowledgeStats, ApiError> {
        self.record("knowledge");
        self.knowledge.next().await
    }

    async fn search_knowledge(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<KnowledgeSearchResponse, ApiError> {
        self.record(format!("search:{}:{}", query, limit));
        let results: Vec<_> = self.search.next().await?.into_iter().take(limit).collect();
        Ok(KnowledgeSearchResponse {
            query: query.to_string(),
            result_count: results.len(),
            results,
        })
    }

    async fn get_memory_stats(&self) -> Result<MemoryStats, ApiError> {
        self.record("memory");
        self.memory.next().await
    }
}
