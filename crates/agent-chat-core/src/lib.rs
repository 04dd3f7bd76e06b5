//! agent-chat-core: client-side core for a conversational agent backend.
//!
//! The backend client talks HTTP; the session controller owns the chat log;
//! the status poller and knowledge panel keep read-only snapshots of agent
//! health and the RAG/memory stores.

mod client;
mod config;
mod error;
mod knowledge;
mod session;
mod status;
mod stream;
mod types;

#[cfg(test)]
mod testing;

// Backend client + error
pub use client::{AgentBackend, BackendClient};
pub use error::{ApiError, ApiErrorKind};

// Configuration
pub use config::{ClientConfig, ConfigError, CONFIG_PATH_ENV, DEFAULT_BASE_URL};

// Controllers
pub use knowledge::{KnowledgePanel, KnowledgeState, DEFAULT_SEARCH_LIMIT};
pub use session::{reduce, ChatAction, SessionController, SessionEvent, SessionState};
pub use status::{StatusPoller, StatusSnapshot};

pub use stream::Utf8ChunkDecoder;

// Wire + domain types
pub use types::{
    parse_timestamp, AgentStatus, ChatRequest, ChatResponse, ClearConversationResponse,
    ConversationEntry, ConversationHistory, HealthStatus, KnowledgeSearchResponse,
    KnowledgeSearchResult, KnowledgeStats, MemoryStats, Message, MessageMetadata, MessagePatch,
    Role,
};
