//! Error types for the gamegate pipeline

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for gamegate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The upstream failure, if this error came from a classified response.
    pub fn as_upstream(&self) -> Option<&UpstreamError> {
        match self {
            Error::Upstream(err) => Some(err),
            _ => None,
        }
    }
}

/// Classification of a failed upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Throttled,
    UpstreamFault,
    Unknown,
}

impl UpstreamErrorKind {
    /// Map an HTTP status code to its kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => UpstreamErrorKind::BadRequest,
            401 => UpstreamErrorKind::Unauthorized,
            403 => UpstreamErrorKind::Forbidden,
            404 => UpstreamErrorKind::NotFound,
            429 => UpstreamErrorKind::Throttled,
            500..=599 => UpstreamErrorKind::UpstreamFault,
            _ => UpstreamErrorKind::Unknown,
        }
    }

    /// Whether the coordinator may retry a call that failed with this kind.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamErrorKind::Throttled | UpstreamErrorKind::UpstreamFault
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamErrorKind::BadRequest => "bad_request",
            UpstreamErrorKind::Unauthorized => "unauthorized",
            UpstreamErrorKind::Forbidden => "forbidden",
            UpstreamErrorKind::NotFound => "not_found",
            UpstreamErrorKind::Throttled => "throttled",
            UpstreamErrorKind::UpstreamFault => "upstream_fault",
            UpstreamErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed upstream call.
///
/// `Display` yields the upstream message exactly as received, so callers can
/// surface it without any wrapping text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub status: u16,
    pub message: String,
    pub retry_after: Option<Duration>,
    /// Set when the coordinator gave up after its bounded retries.
    pub retries_exhausted: bool,
}

impl UpstreamError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::from_status(status),
            status,
            message: message.into(),
            retry_after: None,
            retries_exhausted: false,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Mark this error as the final outcome of an exhausted retry loop.
    pub fn exhausted(mut self) -> Self {
        self.retries_exhausted = true;
        self
    }
}

/// Failures below the HTTP layer: the request never produced a status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Upstream request timed out")]
    Timeout,

    #[error("Failed to connect to upstream: {0}")]
    Connect(String),

    #[error("Upstream request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Cache and ledger storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "redis-backend")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Could not determine cache directory")]
    NoHome,

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No upstream credentials configured. Add `credentials.keys` or set GAMEGATE_API_KEYS.")]
    MissingCredentials,

    #[error("No base URL configured for region `{0}`")]
    UnknownRegion(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
