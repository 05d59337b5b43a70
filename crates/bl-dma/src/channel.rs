//! DMA channel abstraction
//!
//! The engine only needs a handful of operations from a channel: start it on
//! a program, stop it, ask whether it is still running and where it is in
//! the ring. [`SimulatedChannel`] backs tests and the simulator.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::RingProgram;

/// Hardware DMA channel
pub trait DmaChannel: Send + Sync {
    /// Channel "active" status bit
    fn is_active(&self) -> bool;

    /// Load the program's command list and run it from the first block
    fn start(&self, program: &RingProgram);

    /// Halt the channel
    fn stop(&self);

    /// Current byte offset into the ring (hardware read/write pointer)
    fn position(&self) -> usize;
}

/// In-memory channel that advances only when told to
#[derive(Debug, Default)]
pub struct SimulatedChannel {
    active: AtomicBool,
    position: AtomicUsize,
    ring_bytes: AtomicUsize,
    command_base: AtomicU32,
    starts: AtomicU64,
    stops: AtomicU64,
    /// Event log: true = start, false = stop
    events: Mutex<Vec<bool>>,
}

impl SimulatedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the hardware pointer forward by `bytes`, wrapping at the ring end
    pub fn advance(&self, bytes: usize) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        let ring = self.ring_bytes.load(Ordering::Relaxed).max(1);
        let pos = self.position.load(Ordering::Relaxed);
        self.position.store((pos + bytes) % ring, Ordering::Release);
    }

    /// Drop the active bit as if the channel died on its own
    pub fn stall(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn start_count(&self) -> u64 {
        self.starts.load(Ordering::Relaxed)
    }

    pub fn stop_count(&self) -> u64 {
        self.stops.load(Ordering::Relaxed)
    }

    pub fn command_base(&self) -> u32 {
        self.command_base.load(Ordering::Relaxed)
    }

    /// Start/stop history in call order
    pub fn events(&self) -> Vec<bool> {
        self.events.lock().clone()
    }
}

impl DmaChannel for SimulatedChannel {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn start(&self, program: &RingProgram) {
        self.ring_bytes.store(program.ring_bytes(), Ordering::Relaxed);
        self.command_base.store(program.command_base(), Ordering::Relaxed);
        self.position.store(0, Ordering::Relaxed);
        self.starts.fetch_add(1, Ordering::Relaxed);
        self.events.lock().push(true);
        self.active.store(true, Ordering::Release);
    }

    fn stop(&self) {
        self.active.store(false, Ordering::Release);
        self.stops.fetch_add(1, Ordering::Relaxed);
        self.events.lock().push(false);
    }

    fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }
}
