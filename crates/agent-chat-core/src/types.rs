//! Wire and domain types shared by the client and the controllers.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Maps a backend role string. Unknown roles are shown as system entries
    /// instead of failing the whole history load.
    pub fn from_wire(role: &str) -> Self {
        match role.trim().to_ascii_lowercase().as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::System,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Per-message details reported by the backend. `error` marks a failure notice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_context_used: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageMetadata {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    pub fn is_error(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.error.is_some())
    }
}

/// Partial update applied to the last message of the log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    /// Replaces the content.
    pub content: Option<String>,
    /// Appended after `content` is applied (streamed chunks).
    pub append: Option<String>,
    pub metadata: Option<MessageMetadata>,
}

impl MessagePatch {
    pub fn append(chunk: impl Into<String>) -> Self {
        Self {
            append: Some(chunk.into()),
            ..Default::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn apply(self, message: &mut Message) {
        if let Some(content) = self.content {
            message.content = content;
        }
        if let Some(chunk) = self.append {
            message.content.push_str(&chunk);
        }
        if let Some(metadata) = self.metadata {
            message.metadata = Some(metadata);
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default)]
    pub metadata: Option<MessageMetadata>,
}

/// `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub agent_initialized: bool,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub mcp_enabled: Option<bool>,
    #[serde(default)]
    pub mcp_tools: Option<Vec<String>>,
    /// Backend clock, seconds since the epoch.
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl HealthStatus {
    /// Connected means the backend reports `healthy` and has an initialized agent.
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy" && self.agent_initialized
    }
}

/// `GET /status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub status: String,
    pub agent_name: String,
    pub llm_model: String,
    pub ollama_url: String,
    pub rag_enabled: bool,
    pub mcp_enabled: bool,
    #[serde(default)]
    pub mcp_tools: Option<Vec<String>>,
    pub conversation_length: usize,
}

/// One history entry as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// `GET /conversation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub messages: Vec<ConversationEntry>,
    pub conversation_length: usize,
}

/// `DELETE /conversation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearConversationResponse {
    pub message: String,
    pub conversation_length: usize,
}

/// `GET /knowledge/stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub enabled: bool,
    #[serde(default)]
    pub chunk_count: usize,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub vector_db_path: Option<String>,
    #[serde(default)]
    pub chunk_size: Option<u32>,
    #[serde(default)]
    pub similarity_threshold: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `GET /memory/stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub conversation_length: usize,
    pub max_conversation_length: usize,
    pub estimated_tokens: u64,
    pub persistence_enabled: bool,
    pub system_prompt_set: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSearchResult {
    pub content: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// `GET /knowledge/search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSearchResponse {
    pub query: String,
    pub results: Vec<KnowledgeSearchResult>,
    pub result_count: usize,
}

/// Parses a backend history timestamp. Accepts RFC 3339 and naive ISO-8601
/// (read as UTC); returns `None` for anything else.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
