//! bl-engine: Real-time stream engine with an auxiliary bass path
//!
//! Per output block:
//!
//! ```text
//!  mix block ──▶ FormatPipeline ──┬─────────────────────────────▶ clip ──▶ sample buffer
//!                (routine select) │                                ▲
//!                                 │ aux attached                   │ high band
//!                                 ▼                                │
//!                        CrossoverSplitter ────────────────────────┘
//!                                 │ low band
//!                                 ▼
//!                   SyncEngine ─▶ DownsampleConverter ──▶ AuxRing ──▶ AuxSink
//! ```
//!
//! ## Modules
//! - `pipeline` - Routine selection and the cached [`FormatPipeline`]
//! - `convert` - Clip/convert kernels
//! - `sync` - Aux cursor tracking, rate adaptation, desync detection
//! - `sink` - [`AuxSink`] trait and a simulated sink
//! - `aux_path` - State that exists only while a sink is attached
//! - `engine` - [`StreamEngine`] (real-time) and [`EngineHandle`] (control)

mod aux_path;
pub mod convert;
mod engine;
mod error;
mod pipeline;
mod sink;
mod sync;

pub use aux_path::AuxPath;
pub use convert::ChannelStage;
pub use engine::*;
pub use error::*;
pub use pipeline::*;
pub use sink::*;
pub use sync::*;
