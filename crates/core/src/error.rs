//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("invalid root id: {0}")]
    InvalidRootId(String),

    #[error("invalid proxy hash record: {0}")]
    InvalidProxyRecord(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
