//! Unified error for every backend call.
//!
//! Transport failures (no response), protocol failures (non-2xx) and parse
//! failures (body does not match the expected shape) all surface as one
//! [`ApiError`] so the controllers only ever handle a single type.

use reqwest::StatusCode;
use serde_json::Value;

/// Which stage of a backend call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// No response was received (connect refused, DNS, timeout, reset).
    Transport,
    /// The backend answered with a non-success status.
    Status,
    /// The body could not be read or decoded into the expected shape.
    Parse,
}

/// Structured backend error: message, optional HTTP status and optional raw payload.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    /// HTTP status code; `None` for transport and parse failures.
    pub status: Option<u16>,
    /// Raw error payload: the decoded JSON error body, or the undecodable text.
    pub data: Option<Value>,
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Transport,
            message: message.into(),
            status: None,
            data: None,
        }
    }

    pub fn parse(message: impl Into<String>, raw: Option<Value>) -> Self {
        Self {
            kind: ApiErrorKind::Parse,
            message: message.into(),
            status: None,
            data: raw,
        }
    }

    /// Builds the error for a non-success response.
    ///
    /// A JSON body with a `detail` field supplies the message; anything else
    /// falls back to the status line (`HTTP 503: Service Unavailable`).
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let data = serde_json::from_str::<Value>(body).ok();
        let message = data
            .as_ref()
            .and_then(|v| v.get("detail"))
            .and_then(detail_text)
            .unwrap_or_else(|| status_line(status));
        Self {
            kind: ApiErrorKind::Status,
            message,
            status: Some(status.as_u16()),
            data,
        }
    }

    /// Classifies a reqwest failure. Decode failures are parse errors; everything
    /// else means no usable response arrived.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::parse(format!("Invalid response body: {}", err), None);
        }
        if err.is_timeout() {
            return Self::transport(format!("Request timed out: {}", err));
        }
        Self::transport(err.to_string())
    }

    pub fn is_transport(&self) -> bool {
        self.kind == ApiErrorKind::Transport
    }
}

fn detail_text(detail: &Value) -> Option<String> {
    match detail {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        // FastAPI validation errors arrive as a list of objects.
        other => Some(other.to_string()),
    }
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {}: {}", status.as_u16(), reason),
        None => format!("HTTP {}", status.as_u16()),
    }
}
