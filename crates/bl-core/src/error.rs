//! Error types for Basslink

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum BlError {
    #[error("Unsupported format: {0}")]
    FormatUnsupported(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Allocation failure: {0}")]
    AllocationFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias
pub type BlResult<T> = Result<T, BlError>;
