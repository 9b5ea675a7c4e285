//! Error types for the synced store.

use tether_core::CoreError;
use tether_store::StoreError;
use tether_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during synced store operations.
#[derive(Debug, Error)]
pub enum TetherError {
    /// A record could not be translated.
    #[error("record error: {0}")]
    Core(#[from] CoreError),

    /// The local store failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Talking to the remote failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Result type for synced store operations.
pub type Result<T> = std::result::Result<T, TetherError>;
