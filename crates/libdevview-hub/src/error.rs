//! Hub error types

use thiserror::Error;

/// Errors that can occur during hub communication
#[derive(Error, Debug)]
pub enum HubError {
    /// A synchronous call exceeded its deadline
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// The readiness probe exhausted its retry budget
    #[error("companion process did not connect to the hub within {elapsed}")]
    Unreachable { elapsed: String },

    /// Connection to the hub endpoint failed
    #[error("hub connection failed: {0}")]
    ConnectionFailed(String),

    /// The companion endpoint refused the connection
    #[error("companion process not reachable")]
    CompanionUnavailable,

    /// Schema version mismatch between request and reply
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    /// The companion process reported a command failure
    #[error("companion error [{code}]: {message}")]
    Companion { code: String, message: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Transport-level error
    #[error("transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HubError {
    /// Whether this error is a deadline expiry (recoverable at best-effort
    /// call sites)
    pub fn is_timeout(&self) -> bool {
        matches!(self, HubError::Timeout(_) | HubError::Unreachable { .. })
    }
}

impl From<nng::Error> for HubError {
    fn from(e: nng::Error) -> Self {
        HubError::Transport(e.to_string())
    }
}
