//! Local store error types.

use thiserror::Error;

/// Local KV store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store is closed")]
    Closed,
}

/// Result type for local store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
