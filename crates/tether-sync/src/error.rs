//! Error types for the sync engine.

use thiserror::Error;

use tether_core::CoreError;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A record could not be translated for the remote.
    #[error("translation error: {0}")]
    Translation(#[from] CoreError),

    /// Network-level failure: no HTTP status available.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The remote rejected the credentials (HTTP 401).
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The remote failed (HTTP 5xx).
    #[error("server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Any other non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Response did not have the expected shape.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Request body could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The change feed watchdog gave up waiting.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The request was aborted (disconnect or a replacing pull).
    #[error("sync cancelled")]
    Cancelled,

    /// The push hook failed to reconcile local revisions.
    #[error("reconcile failed: {0}")]
    Reconcile(String),
}

impl SyncError {
    /// Build the error for a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => SyncError::Unauthenticated(message),
            500..=599 => SyncError::ServerError { status, message },
            _ => SyncError::Status { status, message },
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Unauthenticated(_) => Some(401),
            SyncError::ServerError { status, .. } | SyncError::Status { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::TransportError(_)
            | SyncError::ServerError { .. }
            | SyncError::Timeout(_)
            | SyncError::InvalidMessage(_) => true,
            SyncError::Status { status, .. } => *status == 404,
            _ => false,
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
