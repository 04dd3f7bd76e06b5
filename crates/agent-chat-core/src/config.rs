//! Client configuration: defaults, optional TOML file, then `AGENT_CHAT__*` environment.
//!
//! | Key | Default | Env |
//! |-----|---------|-----|
//! | base_url | `http://localhost:8001` | AGENT_CHAT__BASE_URL |
//! | request_timeout_secs | 30 | AGENT_CHAT__REQUEST_TIMEOUT_SECS |
//! | poll_interval_secs | 180 | AGENT_CHAT__POLL_INTERVAL_SECS |
//! | polling_enabled | true | AGENT_CHAT__POLLING_ENABLED |
//! | search_limit | 10 | AGENT_CHAT__SEARCH_LIMIT |
//! | streaming | false | AGENT_CHAT__STREAMING |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8001";
/// Env var naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "AGENT_CHAT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/agent_chat.toml";
const ENV_PREFIX: &str = "AGENT_CHAT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid base_url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("render config: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend base address; every endpoint path is relative to it.
    pub base_url: String,
    /// Applied to every request. 0 disables the timeout.
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub polling_enabled: bool,
    /// Default result limit for knowledge search.
    pub search_limit: usize,
    /// Use `/chat/stream` for chat sends.
    pub streaming: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
            poll_interval_secs: 180,
            polling_enabled: true,
            search_limit: 10,
            streaming: false,
        }
    }
}

impl ClientConfig {
    /// Loads config. File precedence: `AGENT_CHAT_CONFIG` > `config/agent_chat.toml` (if present).
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(Some(&path))
    }

    /// Loads defaults, then `path` if it exists, then the environment.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("base_url", defaults.base_url)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs as i64)?
            .set_default("poll_interval_secs", defaults.poll_interval_secs as i64)?
            .set_default("polling_enabled", defaults.polling_enabled)?
            .set_default("search_limit", defaults.search_limit as i64)?
            .set_default("streaming", defaults.streaming)?;

        let builder = match path {
            Some(p) if p.exists() => {
                tracing::debug!(path = %p.display(), "loading client config file");
                builder.add_source(config::File::from(p))
            }
            _ => builder,
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(self.base_url.trim()).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme '{}'", other),
            }),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Effective config rendered as TOML (for `agent-chat config`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
