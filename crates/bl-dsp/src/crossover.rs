//! 4th-order crossover with phase compensation
//!
//! The low band is two cascaded Butterworth low-pass stages (a 24 dB/oct
//! Linkwitz-Riley low-pass). The high band is not filtered separately: it is
//! the input run through a 2nd-order all-pass at the same corner minus the
//! low band. An LR4 pair sums to exactly that all-pass, so `high` equals the
//! LR4 high-pass and `low + high` is the all-passed input, which keeps the
//! two outputs phase-coherent when they recombine in the room.

use bl_core::Sample;

use crate::biquad::{BiquadCoeffs, BiquadStage, BUTTERWORTH_Q};
use crate::Processor;

/// Splits an interleaved block into low (aux) and high (primary) bands
#[derive(Debug, Clone)]
pub struct CrossoverSplitter {
    low_first: BiquadStage,
    low_second: BiquadStage,
    phase_comp: BiquadStage,
    channels: usize,
    frequency: f64,
}

impl CrossoverSplitter {
    pub fn new(frequency: f64, sample_rate: f64, channels: usize) -> Self {
        let lp = BiquadCoeffs::lowpass(frequency, BUTTERWORTH_Q, sample_rate);
        let ap = BiquadCoeffs::allpass(frequency, BUTTERWORTH_Q, sample_rate);
        Self {
            low_first: BiquadStage::new(lp, channels),
            low_second: BiquadStage::new(lp, channels),
            phase_comp: BiquadStage::new(ap, channels),
            channels,
            frequency,
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Split `input` (interleaved, `channels` wide) into `low` and `high`.
    ///
    /// All three slices must have the same length, a multiple of the channel
    /// count. Filter history carries over to the next call.
    pub fn split(&mut self, input: &[Sample], low: &mut [Sample], high: &mut [Sample]) {
        debug_assert_eq!(input.len(), low.len());
        debug_assert_eq!(input.len(), high.len());
        debug_assert_eq!(input.len() % self.channels, 0);

        let frames = input
            .chunks_exact(self.channels)
            .zip(low.chunks_exact_mut(self.channels))
            .zip(high.chunks_exact_mut(self.channels));

        for ((frame, lo), hi) in frames {
            for ch in 0..self.channels {
                let x = frame[ch] as f64;
                let l = self.low_first.process_sample(ch, x);
                let l = self.low_second.process_sample(ch, l);
                let ap = self.phase_comp.process_sample(ch, x);
                lo[ch] = l as Sample;
                hi[ch] = (ap - l) as Sample;
            }
        }
    }

    /// True when every stage's history is zero
    pub fn is_reset(&self) -> bool {
        self.low_first.is_reset() && self.low_second.is_reset() && self.phase_comp.is_reset()
    }
}

impl Processor for CrossoverSplitter {
    fn reset(&mut self) {
        self.low_first.reset();
        self.low_second.reset();
        self.phase_comp.reset();
    }
}
