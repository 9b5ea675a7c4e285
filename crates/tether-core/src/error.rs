//! Error types for the Tether core.

use thiserror::Error;

/// Errors raised while translating records into remote documents.
///
/// These are fatal to the single operation that hit them, never to the
/// engine as a whole.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("record has no type")]
    MissingType,

    #[error("record has no id")]
    MissingId,

    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
