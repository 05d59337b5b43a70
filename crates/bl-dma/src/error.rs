//! Transfer program error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DmaError {
    #[error("Physical address resolution failed for block {block} (buffer offset {offset:#x})")]
    Mapping { block: usize, offset: usize },

    #[error("Invalid ring geometry: {0}")]
    InvalidGeometry(String),

    #[error("Malformed descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("No transfer program installed")]
    NotInstalled,
}

pub type DmaResult<T> = Result<T, DmaError>;
