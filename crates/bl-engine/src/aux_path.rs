//! Low-frequency path to the aux sink
//!
//! Everything that exists only while a sink is attached: the sink itself,
//! crossover and downsampler state, the sync engine and scratch buffers.
//! Built on the control thread, then moved to the real-time thread whole.

use std::sync::Arc;

use bl_core::{AuxRing, BlError, BlResult, EngineConfig, Sample};
use bl_dsp::{CrossoverSplitter, DownsampleConverter, Processor};

use crate::{AuxSink, BlockTiming, SyncEngine, SyncStep};

fn scratch(len: usize) -> BlResult<Vec<Sample>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| BlError::AllocationFailure(format!("aux scratch ({len} samples): {e}")))?;
    buf.resize(len, 0.0);
    Ok(buf)
}

pub struct AuxPath {
    sink: Box<dyn AuxSink>,
    ring: Arc<AuxRing>,
    splitter: CrossoverSplitter,
    converter: DownsampleConverter,
    sync: SyncEngine,
    low: Vec<Sample>,
    high: Vec<Sample>,
}

impl AuxPath {
    /// Allocate all state for `sink`. Scratch space covers a whole host
    /// ring, so no block can outgrow it.
    pub fn new(
        sink: Box<dyn AuxSink>,
        config: &EngineConfig,
        channels: usize,
        host_ring_frames: usize,
    ) -> BlResult<Self> {
        let format = sink.format();
        let ring = sink.ring();
        config.aux.validate_for(&format, ring.len())?;
        if channels == 0 {
            return Err(BlError::InvalidConfig("host stream has no channels".into()));
        }

        let host_rate = config.sample_rate.as_f64();
        let samples = host_ring_frames
            .checked_mul(channels)
            .ok_or_else(|| BlError::AllocationFailure("aux scratch size overflows".into()))?;

        Ok(Self {
            splitter: CrossoverSplitter::new(config.aux.crossover_hz, host_rate, channels),
            converter: DownsampleConverter::new(host_rate, channels, format.channels as usize),
            sync: SyncEngine::new(&format, ring.len(), host_rate, host_ring_frames, &config.aux),
            low: scratch(samples)?,
            high: scratch(samples)?,
            ring,
            sink,
        })
    }

    #[inline]
    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    #[inline]
    pub fn splitter(&self) -> &CrossoverSplitter {
        &self.splitter
    }

    #[inline]
    pub fn ring(&self) -> &Arc<AuxRing> {
        &self.ring
    }

    /// Engine (re)started: drop filter history and resync on the next block
    pub fn restart(&mut self) {
        self.splitter.reset();
        self.converter.reset();
        self.sync.mark_restarted();
    }

    /// Primary ring length in frames changed; resync on the next block.
    /// Scratch stays sized for the ring at attach time, so blocks larger than
    /// that bypass the aux path.
    pub fn set_host_ring_frames(&mut self, frames: usize) {
        self.sync.set_host_ring_frames(frames);
    }

    /// Split `mix`, feed the low band to the sink and return the high band.
    ///
    /// `gains` scale the low band per channel (balance and master volume);
    /// `mute` silences it. Returns `None` when `mix` is larger than a ring.
    pub fn process(
        &mut self,
        mix: &[Sample],
        timing: &BlockTiming,
        gains: (f32, f32),
        mute: bool,
    ) -> Option<(&[Sample], SyncStep)> {
        let n = mix.len();
        if n > self.low.len() {
            return None;
        }

        let reader = self.sink.read_position();
        let sink_resync = self.sink.take_resync_request();
        let step = self.sync.begin_block(timing, reader, sink_resync);

        if step.resynced {
            self.splitter.reset();
            self.converter.reset();
            self.ring.clear();
        }

        let low = &mut self.low[..n];
        let high = &mut self.high[..n];
        self.splitter.split(mix, low, high);

        let channels = self.splitter.channels();
        if mute {
            low.fill(0.0);
        } else {
            for frame in low.chunks_exact_mut(channels) {
                frame[0] *= gains.0;
                if channels > 1 {
                    frame[1] *= gains.1;
                }
            }
        }

        let rate = self.sync.adaptive_rate();
        self.converter
            .convert(low, rate, &self.ring, self.sync.cursor_mut());

        if step.start_sink {
            self.sink.start();
            log::info!("Aux sink started");
        }

        Some((&self.high[..n], step))
    }
}
