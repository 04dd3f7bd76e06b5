//! In-process agent backend for integration tests.
//!
//! Serves the same routes as the real agent service on an ephemeral port.
//! Special chat messages trigger failure modes:
//! `fail` → 503 with `detail`, `html` → 502 with a non-JSON body,
//! `garbage` → 200 with an unparsable body. On `/chat/stream`, `fail` → 503
//! with `detail` before any chunk is sent.

#![allow(dead_code)]

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Streamed reply; the chunk boundaries split both multi-byte characters.
pub const STREAM_CHUNKS: [&[u8]; 4] = [b"H\xC3", b"\xA9llo ", b"\xF0\x9F", b"\x8C\x8A!"];
pub const STREAM_TEXT: &str = "Héllo 🌊!";

#[derive(Debug, Default)]
pub struct MockState {
    pub history: Vec<Value>,
    pub degraded: bool,
    pub chat_requests: Vec<String>,
    pub search_requests: Vec<(String, usize)>,
    pub clears: usize,
    pub fail_clear: bool,
}

pub type Shared = Arc<Mutex<MockState>>;

pub struct MockBackend {
    pub base_url: String,
    pub state: Shared,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState::default()));
        let app = router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn with_history(self, entries: &[(&str, &str, &str)]) -> Self {
        {
            let mut s = self.state.lock().unwrap();
            s.history = entries
                .iter()
                .map(|(role, content, ts)| json!({"role": role, "content": content, "timestamp": ts}))
                .collect();
        }
        self
    }

    pub fn set_degraded(&self, degraded: bool) {
        self.state.lock().unwrap().degraded = degraded;
    }
}

/// Address nothing listens on.
pub fn dead_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
        .route("/conversation", get(conversation).delete(clear_conversation))
        .route("/knowledge/stats", get(knowledge_stats))
        .route("/knowledge/search", get(knowledge_search))
        .route("/memory/stats", get(memory_stats))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({"message": "Agent API", "version": "1.0.0", "docs": "/docs"}))
}

async fn health(State(state): State<Shared>) -> Json<Value> {
    let degraded = state.lock().unwrap().degraded;
    Json(json!({
        "status": if degraded { "degraded" } else { "healthy" },
        "agent_initialized": true,
        "agent_name": "mock-agent",
        "mcp_enabled": false,
        "timestamp": 1718000000.5
    }))
}

async fn status(State(state): State<Shared>) -> Json<Value> {
    let len = state.lock().unwrap().history.len();
    Json(json!({
        "status": "running",
        "agent_name": "mock-agent",
        "llm_model": "llama3",
        "ollama_url": "http://localhost:11434",
        "rag_enabled": true,
        "mcp_enabled": false,
        "mcp_tools": [],
        "conversation_length": len
    }))
}

#[derive(Deserialize)]
struct ChatBody {
    message: String,
}

async fn chat(State(state): State<Shared>, Json(body): Json<ChatBody>) -> Response {
    let mut s = state.lock().unwrap();
    s.chat_requests.push(body.message.clone());
    match body.message.as_str() {
        "fail" => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"detail": "Agent not initialized"})),
        )
            .into_response(),
        "html" => (StatusCode::BAD_GATEWAY, "<html>upstream down</html>").into_response(),
        "garbage" => (StatusCode::OK, "definitely not json").into_response(),
        msg => {
            let reply = format!("echo: {}", msg);
            s.history.push(json!({"role": "user", "content": msg, "timestamp": "2024-05-01T10:00:00"}));
            s.history.push(json!({"role": "assistant", "content": reply, "timestamp": "2024-05-01T10:00:01"}));
            Json(json!({
                "response": reply,
                "metadata": {"model": "llama3", "rag_context_used": true, "tools_used": []}
            }))
            .into_response()
        }
    }
}

async fn chat_stream(State(state): State<Shared>, Json(body): Json<ChatBody>) -> Response {
    state.lock().unwrap().chat_requests.push(body.message.clone());
    if body.message == "fail" {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"detail": "Agent not initialized"})),
        )
            .into_response();
    }
    let chunks = STREAM_CHUNKS
        .into_iter()
        .map(|c| Ok::<_, std::io::Error>(c.to_vec()));
    Response::builder()
        .header("content-type", "text/plain; charset=utf-8")
        .body(Body::from_stream(futures_util::stream::iter(chunks)))
        .unwrap()
}

async fn conversation(State(state): State<Shared>) -> Json<Value> {
    let s = state.lock().unwrap();
    Json(json!({"messages": s.history, "conversation_length": s.history.len()}))
}

async fn clear_conversation(State(state): State<Shared>) -> Response {
    let mut s = state.lock().unwrap();
    s.clears += 1;
    if s.fail_clear {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "Error clearing conversation: disk full"})),
        )
            .into_response();
    }
    s.history.clear();
    Json(json!({"message": "Conversation cleared", "conversation_length": 0})).into_response()
}

async fn knowledge_stats() -> Json<Value> {
    Json(json!({
        "enabled": true,
        "chunk_count": 128,
        "embedding_model": "nomic-embed-text",
        "vector_db_path": "./data/vectors",
        "chunk_size": 500,
        "similarity_threshold": 0.5
    }))
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    5
}

const DOCUMENTS: [(&str, f64); 4] = [
    ("foo fighters discography", 0.92),
    ("foo bar baz placeholder names", 0.81),
    ("the foo protocol handshake", 0.66),
    ("unrelated text about gardening", 0.12),
];

async fn knowledge_search(
    State(state): State<Shared>,
    Query(params): Query<SearchParams>,
) -> Json<Value> {
    state
        .lock()
        .unwrap()
        .search_requests
        .push((params.query.clone(), params.limit));
    let results: Vec<Value> = DOCUMENTS
        .iter()
        .filter(|(content, _)| content.contains(params.query.as_str()))
        .take(params.limit)
        .map(|(content, score)| json!({"content": content, "score": score, "metadata": {"source": "kb.md"}}))
        .collect();
    Json(json!({"query": params.query, "result_count": results.len(), "results": results}))
}

async fn memory_stats(State(state): State<Shared>) -> Json<Value> {
    let len = state.lock().unwrap().history.len();
    Json(json!({
        "conversation_length": len,
        "max_conversation_length": 50,
        "estimated_tokens": len * 12,
        "persistence_enabled": true,
        "system_prompt_set": true
    }))
}
