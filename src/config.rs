//! Adapter configuration
//!
//! All configuration comes from environment variables (optionally seeded
//! from a `.env` file by the binary). Parsed once at startup into an owned
//! `Config` handed to the dispatcher; read-only afterwards.

use std::time::Duration;

use crate::error::{AdapterError, AdapterResult};

/// Runtime configuration for the adapter process
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface the HTTP server binds to
    pub host: String,

    /// Port the HTTP server listens on
    pub port: u16,

    /// Base URL of the AI jury service (required)
    pub ai_node_url: String,

    /// IPFS gateways tried in order for CID fetches
    pub ipfs_gateways: Vec<String>,

    /// Pinning service endpoint for justification uploads
    pub pinning_service_url: Option<String>,

    /// Bearer token for the pinning service
    pub pinning_key: Option<String>,

    /// How long commit records stay replayable
    pub reveal_ttl: Duration,

    /// Total per-request deadline
    pub request_deadline: Duration,

    /// Log level; RUST_LOG overrides it when set
    pub log_level: LogLevel,

    /// Optional directory for file logs; stdout when unset
    pub log_dir: Option<String>,
}

/// Accepted values for `LOG_LEVEL`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

const DEFAULT_GATEWAY: &str = "https://ipfs.io";

impl Config {
    /// Build configuration from the process environment.
    ///
    /// Missing `AI_NODE_URL` and unparseable numeric values are startup
    /// errors; everything else falls back to a documented default.
    pub fn from_env() -> AdapterResult<Self> {
        let ai_node_url = std::env::var("AI_NODE_URL")
            .map_err(|_| AdapterError::BadRequest("AI_NODE_URL must be set".into()))?;
        url::Url::parse(&ai_node_url)
            .map_err(|e| AdapterError::BadRequest(format!("AI_NODE_URL is not a URL: {e}")))?;

        let ipfs_gateways = std::env::var("IPFS_GATEWAY_URLS")
            .unwrap_or_else(|_| DEFAULT_GATEWAY.to_string())
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        Ok(Self {
            host: env_or("HOST", "0.0.0.0"),
            port: parse_env("PORT", 8080)?,
            ai_node_url: ai_node_url.trim_end_matches('/').to_string(),
            ipfs_gateways,
            pinning_service_url: std::env::var("IPFS_PINNING_SERVICE").ok(),
            pinning_key: std::env::var("IPFS_PINNING_KEY").ok(),
            reveal_ttl: Duration::from_secs(parse_env("REVEAL_TTL_SECONDS", 600)?),
            request_deadline: Duration::from_secs(parse_env("REQUEST_DEADLINE_SECONDS", 120)?),
            log_level: parse_env("LOG_LEVEL", LogLevel::default())?,
            log_dir: std::env::var("LOG_DIR").ok(),
        })
    }

    /// Rendering of the resolved configuration safe for startup logs
    pub fn redacted_summary(&self) -> String {
        format!(
            "host={} port={} ai_node_url={} gateways={:?} pinning={} reveal_ttl={}s deadline={}s",
            self.host,
            self.port,
            self.ai_node_url,
            self.ipfs_gateways,
            self.pinning_service_url.as_deref().unwrap_or("<unset>"),
            self.reveal_ttl.as_secs(),
            self.request_deadline.as_secs(),
        )
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> AdapterResult<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AdapterError::BadRequest(format!("{key} is not a valid value: {raw}"))),
        Err(_) => Ok(default),
    }
}
