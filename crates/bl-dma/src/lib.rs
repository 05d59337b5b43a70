//! bl-dma: Cyclic hardware transfer programs
//!
//! Builds the descriptor ring the DMA engine walks, supervises the channels
//! from interrupt context and restarts them when they stall.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ TransferEngine │────▶│ RingProgram  │────▶│ DmaChannel   │
//! │                │     │              │     │              │
//! │ - start/stop   │     │ - N blocks   │     │ - active?    │
//! │ - restart      │     │ - stop cmd   │     │ - position   │
//! └───────┬────────┘     └──────────────┘     └──────▲───────┘
//!         │                                          │
//!         ▼                                          │
//! ┌────────────────────┐                             │
//! │ TransferSupervisor │──── interrupt tick ─────────┘
//! └────────────────────┘
//! ```

mod channel;
mod command;
mod error;
mod mapper;
mod ring;
mod supervisor;
mod transfer;

pub use channel::*;
pub use command::*;
pub use error::*;
pub use mapper::*;
pub use ring::*;
pub use supervisor::*;
pub use transfer::*;

/// Transfer direction of a ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Output,
    Input,
}
