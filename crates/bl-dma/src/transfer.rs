//! Transfer program lifecycle
//!
//! Owns the installed programs for the output and optional input channel
//! and performs the synchronous stop/restart the supervisor asks for.

use std::sync::Arc;

use crate::{DmaChannel, DmaError, DmaResult, Direction, PhysicalMapper, RingProgram, TransferSupervisor};

/// Where and how to build one direction's ring
pub struct RingLayout<'a> {
    pub mapper: &'a dyn PhysicalMapper,
    pub command_base: u32,
    pub block_size: usize,
    pub block_count: usize,
}

impl RingLayout<'_> {
    fn build(&self, direction: Direction) -> DmaResult<RingProgram> {
        RingProgram::build(
            direction,
            self.mapper,
            self.command_base,
            self.block_size,
            self.block_count,
        )
    }
}

/// Output channel plus optional input channel running cyclic programs
pub struct TransferEngine {
    output: Arc<dyn DmaChannel>,
    input: Option<Arc<dyn DmaChannel>>,
    output_program: Option<RingProgram>,
    input_program: Option<RingProgram>,
    supervisor: Arc<TransferSupervisor>,
    running: bool,
    restarts: u64,
}

impl TransferEngine {
    pub fn new(output: Arc<dyn DmaChannel>, input: Option<Arc<dyn DmaChannel>>) -> Self {
        let supervisor = Arc::new(TransferSupervisor::new(output.clone(), input.clone()));
        Self {
            output,
            input,
            output_program: None,
            input_program: None,
            supervisor,
            running: false,
            restarts: 0,
        }
    }

    /// Shared handle for the interrupt handler
    pub fn supervisor(&self) -> Arc<TransferSupervisor> {
        self.supervisor.clone()
    }

    #[inline]
    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    /// Build every ring first, then install them together. On any error the
    /// previously installed programs stay untouched.
    pub fn configure(
        &mut self,
        output: &RingLayout<'_>,
        input: Option<&RingLayout<'_>>,
    ) -> DmaResult<()> {
        let output_program = output.build(Direction::Output)?;
        let input_program = match (input, self.input.is_some()) {
            (Some(layout), true) => Some(layout.build(Direction::Input)?),
            (None, false) => None,
            (Some(_), false) => {
                return Err(DmaError::InvalidGeometry("input ring without an input channel".into()));
            }
            (None, true) => {
                return Err(DmaError::InvalidGeometry("input channel without an input ring".into()));
            }
        };

        let was_running = self.running;
        if was_running {
            self.stop();
        }
        self.output_program = Some(output_program);
        self.input_program = input_program;
        if was_running {
            self.start()?;
        }
        Ok(())
    }

    pub fn output_program(&self) -> Option<&RingProgram> {
        self.output_program.as_ref()
    }

    pub fn input_program(&self) -> Option<&RingProgram> {
        self.input_program.as_ref()
    }

    fn start_channels(&self) -> DmaResult<()> {
        let output = self.output_program.as_ref().ok_or(DmaError::NotInstalled)?;
        if let Some(channel) = &self.input {
            let input = self.input_program.as_ref().ok_or(DmaError::NotInstalled)?;
            channel.start(input);
        }
        self.output.start(output);
        Ok(())
    }

    fn stop_channels(&self) {
        self.output.stop();
        if let Some(channel) = &self.input {
            channel.stop();
        }
    }

    /// Start every channel on its program and arm the supervisor
    pub fn start(&mut self) -> DmaResult<()> {
        self.start_channels()?;
        self.supervisor.arm();
        self.running = true;
        log::info!("Transfer programs started");
        Ok(())
    }

    pub fn stop(&mut self) {
        self.supervisor.disarm();
        self.stop_channels();
        self.running = false;
        log::info!("Transfer programs stopped");
    }

    /// Synchronous stop + start of the installed programs
    pub fn restart(&mut self) -> DmaResult<()> {
        self.stop_channels();
        self.start_channels()?;
        self.restarts += 1;
        log::warn!("Transfer programs restarted (restart #{})", self.restarts);
        Ok(())
    }

    /// Apply a pending supervisor restart. Returns true when one happened.
    pub fn recover_if_stalled(&mut self) -> DmaResult<bool> {
        if !self.supervisor.take_restart() || !self.running {
            return Ok(false);
        }
        self.restart()?;
        Ok(true)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[inline]
    pub fn restart_count(&self) -> u64 {
        self.restarts
    }

    /// Hardware byte offset into the output ring
    #[inline]
    pub fn output_position(&self) -> usize {
        self.output.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContiguousMapper, SimulatedChannel};

    fn layout(mapper: &ContiguousMapper) -> RingLayout<'_> {
        RingLayout {
            mapper,
            command_base: 0x1000,
            block_size: 256,
            block_count: 4,
        }
    }

    #[test]
    fn test_start_requires_program() {
        let out = Arc::new(SimulatedChannel::new());
        let mut engine = TransferEngine::new(out, None);
        assert_eq!(engine.start(), Err(DmaError::NotInstalled));
    }

    #[test]
    fn test_recover_restarts_stalled_channel() {
        let out = Arc::new(SimulatedChannel::new());
        let mapper = ContiguousMapper::new(0, 1024, 4096);
        let mut engine = TransferEngine::new(out.clone(), None);
        engine.configure(&layout(&mapper), None).unwrap();
        engine.start().unwrap();

        out.stall();
        engine.supervisor().supervise();

        assert!(engine.recover_if_stalled().unwrap());
        assert!(out.is_active());
        assert_eq!(engine.restart_count(), 1);
        assert_eq!(out.events(), vec![true, false, true]);
        assert!(!engine.recover_if_stalled().unwrap());
    }

    #[test]
    fn test_failed_configure_keeps_old_program() {
        let out = Arc::new(SimulatedChannel::new());
        let mapper = ContiguousMapper::new(0, 1024, 4096);
        let mut engine = TransferEngine::new(out, None);
        engine.configure(&layout(&mapper), None).unwrap();

        let small = ContiguousMapper::new(0, 512, 4096);
        assert!(engine.configure(&layout(&small), None).is_err());
        assert_eq!(engine.output_program().unwrap().ring_bytes(), 1024);
    }

    #[test]
    fn test_input_layout_must_match_channel() {
        let out = Arc::new(SimulatedChannel::new());
        let mapper = ContiguousMapper::new(0, 1024, 4096);
        let mut engine = TransferEngine::new(out, None);
        assert!(engine.configure(&layout(&mapper), Some(&layout(&mapper))).is_err());
    }
}
