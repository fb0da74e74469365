//! Fetch error types.

use thiserror::Error;

/// Errors surfaced by the object-fetch core.
///
/// `Clone` so that one failure can resolve every sink de-duplicated onto a
/// single import request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("transient fetch failure: {0}")]
    Transient(String),

    #[error("backing store failure: {0}")]
    Fatal(String),

    #[error("missing proxy hash for {0}")]
    ProxyHashMissing(String),

    #[error("Request forcibly dropped")]
    DroppedOnShutdown,
}

/// Result type for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

impl From<burrow_core::Error> for FetchError {
    fn from(err: burrow_core::Error) -> Self {
        FetchError::InvalidArgument(err.to_string())
    }
}

impl From<burrow_localstore::StoreError> for FetchError {
    fn from(err: burrow_localstore::StoreError) -> Self {
        FetchError::Fatal(err.to_string())
    }
}
