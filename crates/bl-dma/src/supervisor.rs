//! Interrupt-time channel supervision
//!
//! `supervise` runs on every completion interrupt. It only reads channel
//! status and flips atomics; the restart itself happens on the real-time
//! thread the next time it asks for a block.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crate::DmaChannel;

/// Watches the output (and optional input) channel for stalls
pub struct TransferSupervisor {
    output: Arc<dyn DmaChannel>,
    input: Option<Arc<dyn DmaChannel>>,
    /// Channels are expected to be running
    armed: AtomicBool,
    /// Sticky: set here, cleared by the real-time thread
    restart_needed: AtomicBool,
    /// Nanoseconds since `epoch` of the last detected stall
    stall_timestamp_ns: AtomicU64,
    stall_count: AtomicU64,
    loop_count: AtomicU64,
    epoch: Instant,
}

impl TransferSupervisor {
    pub fn new(output: Arc<dyn DmaChannel>, input: Option<Arc<dyn DmaChannel>>) -> Self {
        Self {
            output,
            input,
            armed: AtomicBool::new(false),
            restart_needed: AtomicBool::new(false),
            stall_timestamp_ns: AtomicU64::new(0),
            stall_count: AtomicU64::new(0),
            loop_count: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    /// Interrupt tick. O(1), never blocks.
    pub fn supervise(&self) {
        self.loop_count.fetch_add(1, Ordering::Relaxed);

        if !self.armed.load(Ordering::Acquire) {
            return;
        }

        let output_dead = !self.output.is_active();
        let input_dead = self.input.as_ref().is_some_and(|ch| !ch.is_active());

        if output_dead || input_dead {
            let now = self.epoch.elapsed().as_nanos() as u64;
            self.stall_timestamp_ns.store(now, Ordering::Relaxed);
            self.stall_count.fetch_add(1, Ordering::Relaxed);
            self.restart_needed.store(true, Ordering::Release);
        }
    }

    /// Consume the restart request, if any
    #[inline]
    pub fn take_restart(&self) -> bool {
        self.restart_needed.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn restart_pending(&self) -> bool {
        self.restart_needed.load(Ordering::Acquire)
    }

    /// Expect channels to be running from now on
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    /// Channels are stopped on purpose; ignore their status
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
        self.restart_needed.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Interrupts seen since creation
    #[inline]
    pub fn loop_count(&self) -> u64 {
        self.loop_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn stall_count(&self) -> u64 {
        self.stall_count.load(Ordering::Relaxed)
    }

    /// Time of the last stall, nanoseconds since the supervisor was created
    #[inline]
    pub fn stall_timestamp_ns(&self) -> u64 {
        self.stall_timestamp_ns.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContiguousMapper, Direction, RingProgram, SimulatedChannel};

    fn program() -> RingProgram {
        let mapper = ContiguousMapper::new(0, 1024, 4096);
        RingProgram::build(Direction::Output, &mapper, 0, 256, 4).unwrap()
    }

    #[test]
    fn test_healthy_channel_no_restart() {
        let out = Arc::new(SimulatedChannel::new());
        out.start(&program());
        let sup = TransferSupervisor::new(out, None);
        sup.arm();

        sup.supervise();
        sup.supervise();
        assert!(!sup.take_restart());
        assert_eq!(sup.loop_count(), 2);
    }

    #[test]
    fn test_stalled_output_sets_sticky_flag() {
        let out = Arc::new(SimulatedChannel::new());
        out.start(&program());
        let sup = TransferSupervisor::new(out.clone(), None);
        sup.arm();

        out.stall();
        sup.supervise();
        assert!(sup.restart_pending());
        assert_eq!(sup.stall_count(), 1);

        // Stays set until consumed
        sup.supervise();
        assert!(sup.take_restart());
        assert!(!sup.take_restart());
    }

    #[test]
    fn test_stalled_input_sets_flag() {
        let out = Arc::new(SimulatedChannel::new());
        let input = Arc::new(SimulatedChannel::new());
        out.start(&program());
        input.start(&program());
        let sup = TransferSupervisor::new(out, Some(input.clone() as Arc<dyn DmaChannel>));
        sup.arm();

        input.stall();
        sup.supervise();
        assert!(sup.take_restart());
    }

    #[test]
    fn test_disarmed_ignores_stopped_channels() {
        let out = Arc::new(SimulatedChannel::new());
        let sup = TransferSupervisor::new(out, None);

        sup.supervise();
        assert!(!sup.restart_pending());
        assert_eq!(sup.loop_count(), 1);
    }
}
