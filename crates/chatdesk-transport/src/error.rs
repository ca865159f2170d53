//! Error types for transport operations

use thiserror::Error;

/// Transport errors. None of these are fatal to the engine: every variant
/// degrades to "stale UI until the next successful sync".
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection-level failure (network down, socket dropped)
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Request exceeded its deadline
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// Backend refused the request
    #[error("backend rejected the request: {reason}")]
    Rejected {
        /// Reason reported by the backend
        reason: String,
    },

    /// Transport already shut down
    #[error("transport closed")]
    Closed,

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, TransportError>;
