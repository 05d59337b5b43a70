//! Linear-interpolation downsampler into the aux ring
//!
//! Output positions are tracked as a fractional read position over the
//! sequence `[history, in[0], in[1], ...]`, so interpolation across the block
//! boundary uses the last frame of the previous block. The output rate is
//! supplied per call, which lets the sync loop nudge it without resetting
//! the phase.

use bl_core::{AuxRing, RingCursor, Sample};

use crate::Processor;

#[inline]
fn to_i16(value: f64) -> i16 {
    (value.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Resamples interleaved host-rate audio into the aux sink's native rate
#[derive(Debug, Clone)]
pub struct DownsampleConverter {
    host_rate: f64,
    input_channels: usize,
    output_channels: usize,
    /// Read position relative to the history frame, in input frames
    phase: f64,
    history: Vec<f64>,
}

impl DownsampleConverter {
    pub fn new(host_rate: f64, input_channels: usize, output_channels: usize) -> Self {
        Self {
            host_rate,
            input_channels: input_channels.max(1),
            output_channels: output_channels.max(1),
            phase: 0.0,
            history: vec![0.0; output_channels.max(1)],
        }
    }

    #[inline]
    pub fn phase(&self) -> f64 {
        self.phase
    }

    #[inline]
    fn source_channel(&self, out_ch: usize) -> usize {
        out_ch.min(self.input_channels - 1)
    }

    /// Resample `input` at `output_rate` Hz and write it through `ring`
    /// starting at `cursor`. The cursor advances by every sample written and
    /// stays normalized. Returns the number of samples written.
    pub fn convert(
        &mut self,
        input: &[Sample],
        output_rate: u32,
        ring: &AuxRing,
        cursor: &mut RingCursor,
    ) -> usize {
        let frames = input.len() / self.input_channels;
        if frames == 0 || output_rate == 0 {
            return 0;
        }

        let step = self.host_rate / output_rate as f64;
        let len = ring.len();
        let mut t = self.phase;
        let mut written = 0;

        while t < frames as f64 {
            let i = t as usize;
            let frac = t - i as f64;
            for out_ch in 0..self.output_channels {
                let src = self.source_channel(out_ch);
                let a = if i == 0 {
                    self.history[out_ch]
                } else {
                    input[(i - 1) * self.input_channels + src] as f64
                };
                let b = input[i * self.input_channels + src] as f64;
                ring.write(cursor.index as usize, to_i16(a + (b - a) * frac));
                cursor.advance(1, len);
                written += 1;
            }
            t += step;
        }

        self.phase = t - frames as f64;
        let last = (frames - 1) * self.input_channels;
        for out_ch in 0..self.output_channels {
            let src = self.source_channel(out_ch);
            self.history[out_ch] = input[last + src] as f64;
        }

        written
    }
}

impl Processor for DownsampleConverter {
    fn reset(&mut self) {
        self.phase = 0.0;
        self.history.fill(0.0);
    }
}
