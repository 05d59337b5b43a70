//! Auxiliary bass sink interface
//!
//! The sink owns its own clock. The engine only sees its native format, the
//! shared ring it plays from, and where its reader currently is.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bl_core::{AuxFormat, AuxPosition, AuxRing, BlResult};

/// Independently clocked low-frequency output device
pub trait AuxSink: Send {
    fn format(&self) -> AuxFormat;

    /// Ring the engine writes into and the sink plays from
    fn ring(&self) -> Arc<AuxRing>;

    /// Current reader position
    fn read_position(&self) -> AuxPosition;

    /// True once per sink-side request for a full resync
    fn take_resync_request(&mut self) -> bool;

    /// Begin playback. Resets the reader's loop counter to zero.
    fn start(&mut self);
}

#[derive(Debug, Default)]
struct SinkClock {
    /// Samples consumed since start, counting whole loops
    consumed: AtomicU64,
    started: AtomicBool,
    starts: AtomicU64,
    resync_requested: AtomicBool,
}

/// In-memory sink whose reader only moves when told to.
///
/// Clones share the same ring and clock, so a test or the simulator can keep
/// one clone to drive the reader while the engine owns another.
#[derive(Debug, Clone)]
pub struct SimulatedSink {
    format: AuxFormat,
    ring: Arc<AuxRing>,
    clock: Arc<SinkClock>,
}

impl SimulatedSink {
    pub fn new(format: AuxFormat, ring_len: usize) -> BlResult<Self> {
        Ok(Self {
            format,
            ring: Arc::new(AuxRing::new(ring_len)?),
            clock: Arc::new(SinkClock::default()),
        })
    }

    /// Consume `samples` from the ring. No-op until started.
    pub fn advance(&self, samples: u64) {
        if self.clock.started.load(Ordering::Acquire) {
            self.clock.consumed.fetch_add(samples, Ordering::AcqRel);
        }
    }

    /// Place the reader at an absolute sample count
    pub fn set_consumed(&self, samples: u64) {
        self.clock.consumed.store(samples, Ordering::Release);
    }

    pub fn request_resync(&self) {
        self.clock.resync_requested.store(true, Ordering::Release);
    }

    pub fn is_started(&self) -> bool {
        self.clock.started.load(Ordering::Acquire)
    }

    pub fn start_count(&self) -> u64 {
        self.clock.starts.load(Ordering::Relaxed)
    }

    pub fn shared_ring(&self) -> &Arc<AuxRing> {
        &self.ring
    }
}

impl AuxSink for SimulatedSink {
    fn format(&self) -> AuxFormat {
        self.format
    }

    fn ring(&self) -> Arc<AuxRing> {
        self.ring.clone()
    }

    fn read_position(&self) -> AuxPosition {
        let consumed = self.clock.consumed.load(Ordering::Acquire);
        let len = self.ring.len() as u64;
        AuxPosition {
            offset: (consumed % len) as usize,
            loop_count: consumed / len,
        }
    }

    fn take_resync_request(&mut self) -> bool {
        self.clock.resync_requested.swap(false, Ordering::AcqRel)
    }

    fn start(&mut self) {
        let len = self.ring.len() as u64;
        let offset = self.clock.consumed.load(Ordering::Acquire) % len;
        self.clock.consumed.store(offset, Ordering::Release);
        self.clock.starts.fetch_add(1, Ordering::Relaxed);
        self.clock.started.store(true, Ordering::Release);
        log::debug!("Simulated aux sink started at offset {offset}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_wraps_with_loop_count() {
        let mut sink = SimulatedSink::new(AuxFormat::default(), 100).unwrap();
        sink.advance(50);
        assert_eq!(sink.read_position(), AuxPosition::default());

        sink.start();
        sink.advance(250);
        assert_eq!(
            sink.read_position(),
            AuxPosition {
                offset: 50,
                loop_count: 2
            }
        );
    }

    #[test]
    fn test_start_resets_loop_count() {
        let mut sink = SimulatedSink::new(AuxFormat::default(), 100).unwrap();
        sink.set_consumed(730);
        sink.start();
        assert_eq!(
            sink.read_position(),
            AuxPosition {
                offset: 30,
                loop_count: 0
            }
        );
        assert_eq!(sink.start_count(), 1);
    }

    #[test]
    fn test_resync_request_is_consumed_once() {
        let mut sink = SimulatedSink::new(AuxFormat::default(), 100).unwrap();
        let remote = sink.clone();
        remote.request_resync();
        assert!(sink.take_resync_request());
        assert!(!sink.take_resync_request());
    }
}
