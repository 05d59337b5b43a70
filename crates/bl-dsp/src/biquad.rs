//! Biquad filters for the crossover
//!
//! Coefficients follow the RBJ cookbook. State is kept in Direct Form I
//! (two past inputs, two past outputs per channel) so a reset is a plain
//! zero fill and the history is easy to inspect.

use std::f64::consts::PI;

use crate::Processor;

/// Butterworth Q for a single 2-pole stage
pub const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Biquad coefficients (normalized, a0 = 1)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

/// `cos(w0)` and RBJ `alpha` for a corner frequency
#[inline]
fn prewarp(freq: f64, q: f64, sample_rate: f64) -> (f64, f64) {
    let w0 = 2.0 * PI * freq / sample_rate;
    (w0.cos(), w0.sin() / (2.0 * q))
}

impl BiquadCoeffs {
    /// Divide through by `a0 = 1 + alpha`. All three shapes share the
    /// denominator `[1 + alpha, -2 cos, 1 - alpha]`.
    fn with_shared_poles(num: [f64; 3], cos: f64, alpha: f64) -> Self {
        let a0 = 1.0 + alpha;
        Self {
            b0: num[0] / a0,
            b1: num[1] / a0,
            b2: num[2] / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// 2-pole low-pass
    pub fn lowpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let (cos, alpha) = prewarp(freq, q, sample_rate);
        let edge = (1.0 - cos) * 0.5;
        Self::with_shared_poles([edge, 2.0 * edge, edge], cos, alpha)
    }

    /// 2-pole high-pass
    pub fn highpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let (cos, alpha) = prewarp(freq, q, sample_rate);
        let edge = (1.0 + cos) * 0.5;
        Self::with_shared_poles([edge, -2.0 * edge, edge], cos, alpha)
    }

    /// 2nd-order all-pass: unity magnitude, 360° of phase turn around `freq`
    pub fn allpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let (cos, alpha) = prewarp(freq, q, sample_rate);
        Self::with_shared_poles([1.0 - alpha, -2.0 * cos, 1.0 + alpha], cos, alpha)
    }

    /// Passes input through unchanged
    pub fn bypass() -> Self {
        Self {
            b0: 1.0,
            ..Self::default()
        }
    }
}

/// History of one channel: two past inputs and two past outputs
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterState {
    pub x1: f64,
    pub x2: f64,
    pub y1: f64,
    pub y2: f64,
}

impl FilterState {
    #[inline]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// One 2-pole stage applied independently to each interleaved channel
#[derive(Debug, Clone)]
pub struct BiquadStage {
    coeffs: BiquadCoeffs,
    state: Vec<FilterState>,
}

impl BiquadStage {
    pub fn new(coeffs: BiquadCoeffs, channels: usize) -> Self {
        Self {
            coeffs,
            state: vec![FilterState::default(); channels],
        }
    }

    #[inline]
    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.state.len()
    }

    pub fn state(&self) -> &[FilterState] {
        &self.state
    }

    #[inline(always)]
    pub fn process_sample(&mut self, channel: usize, input: f64) -> f64 {
        let c = &self.coeffs;
        let s = &mut self.state[channel];
        let output = c.b0 * input + c.b1 * s.x1 + c.b2 * s.x2 - c.a1 * s.y1 - c.a2 * s.y2;
        s.x2 = s.x1;
        s.x1 = input;
        s.y2 = s.y1;
        s.y1 = output;
        output
    }

    pub fn is_reset(&self) -> bool {
        self.state.iter().all(FilterState::is_zero)
    }
}

impl Processor for BiquadStage {
    fn reset(&mut self) {
        self.state.fill(FilterState::default());
    }
}
