//! bl-dsp: DSP stages for the auxiliary bass path
//!
//! ## Modules
//! - `biquad` - Biquad coefficients and Direct Form I multi-channel state
//! - `crossover` - 4th-order crossover with phase compensation
//! - `resample` - Linear-interpolation downsampler into the aux ring

pub mod biquad;
pub mod crossover;
pub mod resample;

pub use crossover::CrossoverSplitter;
pub use resample::DownsampleConverter;

/// Trait for stateful DSP stages
pub trait Processor: Send {
    /// Zero all carried history
    fn reset(&mut self);
}
