//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid filename: {0}")]
    InvalidFileName(String),

    #[error("invalid chunk index: {0}")]
    InvalidChunkIndex(String),

    #[error("invalid range header: {0}")]
    InvalidRange(String),

    #[error("invalid upload identity: {0}")]
    InvalidIdentity(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
