//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure, which can be
//! matched to determine the underlying cause.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error (e.g., directory creation failure).
    #[error("internal error: {0}")]
    Internal(String),

    /// Invalid data in database (e.g., out-of-range timestamp).
    #[error("invalid data: {0}")]
    InvalidData(String),
}
