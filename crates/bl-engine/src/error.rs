//! Engine error type

use bl_core::BlError;
use bl_dma::DmaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] BlError),

    #[error("Transfer program error: {0}")]
    Dma(#[from] DmaError),

    #[error("Command queue full")]
    QueueFull,

    #[error("Timed out waiting for the real-time thread")]
    Timeout,

    #[error("Buffer too small: need {needed}, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

pub type EngineResult<T> = Result<T, EngineError>;
