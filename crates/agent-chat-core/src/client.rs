//! HTTP client for the agent backend.
//!
//! One method per backend capability. Every non-success response, transport
//! failure and decode failure is normalized into [`ApiError`]; nothing is
//! retried or recovered here.

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::stream::Utf8ChunkDecoder;
use crate::types::{
    AgentStatus, ChatRequest, ChatResponse, ClearConversationResponse, ConversationHistory,
    HealthStatus, KnowledgeSearchResponse, KnowledgeStats, MemoryStats,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend capabilities used by the controllers.
///
/// [`BackendClient`] is the HTTP implementation; tests drive the controllers
/// with in-process doubles.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn check_health(&self) -> Result<HealthStatus, ApiError>;

    async fn get_status(&self) -> Result<AgentStatus, ApiError>;

    async fn send_message(&self, message: &str) -> Result<ChatResponse, ApiError>;

    /// Streams the reply, handing each decoded text chunk to `on_chunk` in
    /// arrival order. Returns the full reply.
    async fn send_message_stream(
        &self,
        message: &str,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String, ApiError>;

    async fn get_conversation(&self) -> Result<ConversationHistory, ApiError>;

    async fn clear_conversation(&self) -> Result<ClearConversationResponse, ApiError>;

    async fn get_knowledge_stats(&self) -> Result<KnowledgeStats, ApiError>;

    async fn search_knowledge(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<KnowledgeSearchResponse, ApiError>;

    async fn get_memory_stats(&self) -> Result<MemoryStats, ApiError>;
}

/// Stateless HTTP client. Cloning shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
}

impl BackendClient {
    /// Client with the default 30 s request timeout.
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, Some(DEFAULT_TIMEOUT))
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_timeout(&config.base_url, config.request_timeout())
    }

    pub fn with_timeout(base_url: &str, timeout: Option<Duration>) -> Self {
        let builder = reqwest::Client::builder();
        let builder = match timeout {
            Some(t) => builder.timeout(t),
            None => builder,
        };
        let http = builder.build().unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = self.url(endpoint);
        tracing::debug!(%method, %url, "backend request");
        self.http
            .request(method, url)
            .header(CONTENT_TYPE, "application/json")
    }

    async fn execute<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let res = req.send().await.map_err(ApiError::from_reqwest)?;
        let status = res.status();
        let text = res.text().await.map_err(ApiError::from_reqwest)?;

        if !status.is_success() {
            let err = ApiError::from_status(status, &text);
            tracing::debug!(status = status.as_u16(), error = %err, "backend returned failure");
            return Err(err);
        }

        serde_json::from_str(&text).map_err(|e| {
            ApiError::parse(
                format!("Invalid response body: {}", e),
                Some(Value::String(text)),
            )
        })
    }

    /// `GET /`: backend banner; shape is backend-defined.
    pub async fn root_info(&self) -> Result<Value, ApiError> {
        self.execute(self.request(Method::GET, "/")).await
    }
}

#[async_trait]
impl AgentBackend for BackendClient {
    async fn check_health(&self) -> Result<HealthStatus, ApiError> {
        self.execute(self.request(Method::GET, "/health")).await
    }

    async fn get_status(&self) -> Result<AgentStatus, ApiError> {
        self.execute(self.request(Method::GET, "/status")).await
    }

    async fn send_message(&self, message: &str) -> Result<ChatResponse, ApiError> {
        let body = ChatRequest {
            message: message.to_string(),
        };
        self.execute(self.request(Method::POST, "/chat").json(&body))
            .await
    }

    async fn send_message_stream(
        &self,
        message: &str,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String, ApiError> {
        let body = ChatRequest {
            message: message.to_string(),
        };
        let res = self
            .request(Method::POST, "/chat/stream")
            .json(&body)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        let status = res.status();
        if !status.is_success() {
            let text = match res.text().await {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!(error = %e, status = status.as_u16(), "failed to read stream error body");
                    String::new()
                }
            };
            return Err(ApiError::from_status(status, &text));
        }

        let mut decoder = Utf8ChunkDecoder::new();
        let mut full = String::new();
        let mut stream = res.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(ApiError::from_reqwest)?;
            let text = decoder.push(&bytes);
            if !text.is_empty() {
                on_chunk(&text);
                full.push_str(&text);
            }
        }
        let rest = decoder.finish();
        if !rest.is_empty() {
            on_chunk(&rest);
            full.push_str(&rest);
        }
        Ok(full)
    }

    async fn get_conversation(&self) -> Result<ConversationHistory, ApiError> {
        self.execute(self.request(Method::GET, "/conversation")).await
    }

    async fn clear_conversation(&self) -> Result<ClearConversationResponse, ApiError> {
        self.execute(self.request(Method::DELETE, "/conversation"))
            .await
    }

    async fn get_knowledge_stats(&self) -> Result<KnowledgeStats, ApiError> {
        self.execute(self.request(Method::GET, "/knowledge/stats"))
            .await
    }

    async fn search_knowledge(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<KnowledgeSearchResponse, ApiError> {
        let limit = limit.to_string();
        let req = self
            .request(Method::GET, "/knowledge/search")
            .query(&[("query", query), ("limit", limit.as_str())]);
        self.execute(req).await
    }

    async fn get_memory_stats(&self) -> Result<MemoryStats, ApiError> {
        self.execute(self.request(Method::GET, "/memory/stats")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let c = BackendClient::new(" http://localhost:8001/ ");
        assert_eq!(c.base_url(), "http://localhost:8001");
        assert_eq!(c.url("/health"), "http://localhost:8001/health");
    }

    #[test]
    fn from_config_uses_configured_address() {
        let cfg = ClientConfig {
            base_url: "http://agent.local:9000/".into(),
            ..Default::default()
        };
        assert_eq!(BackendClient::from_config(&cfg).base_url(), "http://agent.local:9000");
    }
}
