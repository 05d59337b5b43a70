//! Stream engine: real-time side and control handle
//!
//! [`StreamEngine`] runs on the audio thread. [`EngineHandle`] lives anywhere
//! else and talks to it through a lock-free command queue that is drained at
//! the top of every [`StreamEngine::clip_output`] / [`StreamEngine::convert_input`]
//! call, before any routine runs. Aux state is built by the handle and
//! handed over whole; detached state comes back through a second queue so
//! the audio thread never frees it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bl_core::{
    BlError, DriverContext, DualMonoMode, EngineConfig, FeatureFlags, FormatDescriptor, InputGain,
    Sample,
};
use bl_dma::{DmaChannel, PhysicalMapper, RingLayout, TransferEngine, TransferSupervisor};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::{
    AuxPath, AuxSink, BlockTiming, EngineError, EngineResult, FormatPipeline, InputRoutine,
    OutputRoutine, select_input, select_output,
};

/// Capacity of the detached-state return queue.
///
/// `attach_aux` collects retired paths before queueing a new one, so the
/// paths retired between two collections are at most the attach commands
/// still in flight (one queue's worth) plus the one just sent.
fn retire_capacity(config: &EngineConfig) -> usize {
    config.command_queue_capacity + 1
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMANDS & STATS
// ═══════════════════════════════════════════════════════════════════════════════

/// Control → real-time messages
pub enum EngineCommand {
    SetPhaseInversion(bool),
    SetRightDelay(bool),
    SetRightMixMute(bool),
    SetBalance(f32),
    SetDualMono(DualMonoMode),
    SetSoftwareGain(bool),
    SetInputGain(InputGain),
    SetDriverContext(DriverContext),
    SetFormat(FormatDescriptor),
    AttachAux(Box<AuxPath>),
    DetachAux,
}

/// Counters readable from any thread
#[derive(Debug, Default)]
pub struct EngineStats {
    pub blocks: AtomicU64,
    pub restarts: AtomicU64,
    pub resyncs: AtomicU64,
    pub desyncs: AtomicU64,
    pub commands_applied: AtomicU64,
}

/// Hardware the engine drives
pub struct Hardware {
    pub output: Arc<dyn DmaChannel>,
    pub output_mapper: Arc<dyn PhysicalMapper>,
    pub output_command_base: u32,
    pub input: Option<InputHardware>,
}

pub struct InputHardware {
    pub channel: Arc<dyn DmaChannel>,
    pub mapper: Arc<dyn PhysicalMapper>,
    pub command_base: u32,
}

// ═══════════════════════════════════════════════════════════════════════════════
// REAL-TIME SIDE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct StreamEngine {
    config: EngineConfig,
    transfer: TransferEngine,
    output_mapper: Arc<dyn PhysicalMapper>,
    output_command_base: u32,
    input_hw: Option<(Arc<dyn PhysicalMapper>, u32)>,
    pipeline: FormatPipeline,
    aux: Option<Box<AuxPath>>,
    command_rx: Consumer<EngineCommand>,
    retire_tx: Producer<Box<AuxPath>>,
    stats: Arc<EngineStats>,
}

impl StreamEngine {
    /// Create an engine and its control handle
    pub fn new(
        config: EngineConfig,
        format: FormatDescriptor,
        hardware: Hardware,
    ) -> EngineResult<(Self, EngineHandle)> {
        config.validate()?;
        format.validate()?;

        let (command_tx, command_rx) = RingBuffer::new(config.command_queue_capacity);
        let (retire_tx, retire_rx) = RingBuffer::new(retire_capacity(&config));
        let stats = Arc::new(EngineStats::default());

        let (input_channel, input_hw) = match hardware.input {
            Some(input) => (Some(input.channel), Some((input.mapper, input.command_base))),
            None => (None, None),
        };
        let transfer = TransferEngine::new(hardware.output, input_channel);
        let flags = FeatureFlags::default();

        let engine = Self {
            config,
            transfer,
            output_mapper: hardware.output_mapper,
            output_command_base: hardware.output_command_base,
            input_hw,
            pipeline: FormatPipeline::new(format, flags),
            aux: None,
            command_rx,
            retire_tx,
            stats: stats.clone(),
        };
        let handle = EngineHandle {
            config,
            format,
            flags,
            command_tx,
            retire_rx,
            stats,
            sent: 0,
        };
        Ok((engine, handle))
    }

    /// Build and install the transfer programs, then start the channels.
    /// Sync and filter state start from zero.
    pub fn start(&mut self) -> EngineResult<()> {
        let ring = self.config.ring;
        let output = RingLayout {
            mapper: &*self.output_mapper,
            command_base: self.output_command_base,
            block_size: ring.block_size,
            block_count: ring.block_count,
        };
        let input = self.input_hw.as_ref().map(|(mapper, command_base)| RingLayout {
            mapper: &**mapper,
            command_base: *command_base,
            block_size: ring.block_size,
            block_count: ring.block_count,
        });

        self.transfer.configure(&output, input.as_ref())?;
        self.transfer.start()?;
        self.reset_stream_state();
        log::info!(
            "Stream engine started: {} blocks x {} bytes at {} Hz",
            ring.block_count,
            ring.block_size,
            self.config.sample_rate.as_u32()
        );
        Ok(())
    }

    pub fn stop(&mut self) {
        self.transfer.stop();
        log::info!("Stream engine stopped");
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.transfer.is_running()
    }

    /// Interrupt-side handle
    pub fn supervisor(&self) -> Arc<TransferSupervisor> {
        self.transfer.supervisor()
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    pub fn pipeline(&self) -> &FormatPipeline {
        &self.pipeline
    }

    pub fn aux_path(&self) -> Option<&AuxPath> {
        self.aux.as_deref()
    }

    pub fn transfer(&self) -> &TransferEngine {
        &self.transfer
    }

    /// Primary ring length in frames for the current format
    pub fn ring_frames(&self) -> usize {
        self.config.ring_bytes() / self.pipeline.format().bytes_per_frame().max(1)
    }

    /// PrimaryCursor: frame the output hardware is at
    pub fn hardware_frame(&self) -> usize {
        self.transfer.output_position() / self.pipeline.format().bytes_per_frame().max(1)
    }

    fn reset_stream_state(&mut self) {
        self.pipeline.reset();
        if let Some(aux) = self.aux.as_mut() {
            aux.restart();
        }
    }

    /// Apply every queued command, then re-select once
    pub fn poll_commands(&mut self) {
        let mut applied = 0u64;
        while let Ok(cmd) = self.command_rx.pop() {
            self.apply(cmd);
            applied += 1;
        }
        if applied > 0 {
            if let Err(e) = self.pipeline.reselect() {
                log::debug!("Routines cleared after {applied} commands: {e}");
            }
            self.stats.commands_applied.fetch_add(applied, Ordering::Release);
        }
    }

    fn apply(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::SetPhaseInversion(on) => self.update_flags(|f| f.phase_inversion = on),
            EngineCommand::SetRightDelay(on) => self.update_flags(|f| f.right_delay = on),
            EngineCommand::SetRightMixMute(on) => self.update_flags(|f| f.right_mix_mute = on),
            EngineCommand::SetBalance(balance) => self.update_flags(|f| f.balance = balance),
            EngineCommand::SetDualMono(mode) => self.update_flags(|f| f.dual_mono = mode),
            EngineCommand::SetSoftwareGain(on) => self.update_flags(|f| f.software_gain = on),
            EngineCommand::SetInputGain(gain) => self.pipeline.set_input_gain(gain),
            EngineCommand::SetDriverContext(ctx) => self.pipeline.set_context(ctx),
            EngineCommand::SetFormat(format) => {
                if let Err(e) = self.pipeline.set_format(format) {
                    log::warn!("No conversion routine for {format:?}: {e}");
                }
                let ring_frames = self.ring_frames();
                if let Some(aux) = self.aux.as_mut() {
                    aux.set_host_ring_frames(ring_frames);
                }
            }
            EngineCommand::AttachAux(path) => {
                if let Some(old) = self.aux.replace(path) {
                    self.retire(old);
                }
                self.update_flags(|f| f.aux_attached = true);
            }
            EngineCommand::DetachAux => {
                if let Some(old) = self.aux.take() {
                    self.retire(old);
                }
                self.update_flags(|f| f.aux_attached = false);
            }
        }
    }

    fn update_flags(&mut self, f: impl FnOnce(&mut FeatureFlags)) {
        if let Err(e) = self.pipeline.update_flags(f) {
            log::debug!("Flag change left no conversion routine: {e}");
        }
    }

    /// Hand a detached path back to the control side. The return queue holds
    /// every path that can be outstanding (see [`retire_capacity`]), so the
    /// push only fails if that bound is broken.
    fn retire(&mut self, path: Box<AuxPath>) {
        if let Err(rtrb::PushError::Full(path)) = self.retire_tx.push(path) {
            log::error!("Aux retire queue full; freeing detached path on the audio thread");
            drop(path);
        }
    }

    /// Supervisor asked for a restart: bounce the transfer program before
    /// touching any samples
    fn service(&mut self) -> EngineResult<()> {
        self.poll_commands();
        if self.transfer.recover_if_stalled()? {
            self.stats.restarts.fetch_add(1, Ordering::Relaxed);
            self.reset_stream_state();
        }
        Ok(())
    }

    /// Convert `num_frames` frames of `mix_buf` starting at `first_frame`
    /// into `sample_buf` at the matching byte offset.
    ///
    /// Both buffers cover the whole primary ring. With an unsupported format
    /// nothing is written.
    pub fn clip_output(
        &mut self,
        mix_buf: &[Sample],
        sample_buf: &mut [u8],
        first_frame: usize,
        num_frames: usize,
    ) -> EngineResult<()> {
        self.service()?;

        let Some(routine) = self.pipeline.output_routine() else {
            return Ok(());
        };
        let format = *self.pipeline.format();
        let channels = format.channels as usize;
        let bpf = format.bytes_per_frame();
        let byte_range = first_frame * bpf..(first_frame + num_frames) * bpf;
        check_len(sample_buf.len(), byte_range.end)?;
        let dst = &mut sample_buf[byte_range.clone()];

        match routine {
            OutputRoutine::RawCopy => {
                let raw: &[u8] = bytemuck::cast_slice(mix_buf);
                check_len(raw.len(), byte_range.end)?;
                dst.copy_from_slice(&raw[byte_range]);
            }
            OutputRoutine::Clip { width, stage, aux } => {
                let sample_range = first_frame * channels..(first_frame + num_frames) * channels;
                check_len(mix_buf.len(), sample_range.end)?;
                let mix = &mix_buf[sample_range];

                let timing = BlockTiming {
                    first_frame,
                    num_frames,
                    hardware_frame: self.hardware_frame(),
                };
                let context = *self.pipeline.context();
                let (bal_l, bal_r) = self.pipeline.flags().balance_gains();
                let gains = (bal_l * context.left_volume, bal_r * context.right_volume);

                let split = match (aux, self.aux.as_mut()) {
                    (true, Some(path)) => path.process(mix, &timing, gains, context.mute),
                    _ => None,
                };
                match split {
                    Some((high, step)) => {
                        if step.resynced {
                            self.stats.resyncs.fetch_add(1, Ordering::Relaxed);
                        }
                        if step.desync.is_some() {
                            self.stats.desyncs.fetch_add(1, Ordering::Relaxed);
                        }
                        self.pipeline.clip(high, dst, width, stage);
                    }
                    None => self.pipeline.clip(mix, dst, width, stage),
                }
            }
        }

        self.stats.blocks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Decode `num_frames` frames of `sample_buf` starting at `first_frame`
    /// into `dest_buf`, which holds just this block
    pub fn convert_input(
        &mut self,
        sample_buf: &[u8],
        dest_buf: &mut [Sample],
        first_frame: usize,
        num_frames: usize,
    ) -> EngineResult<()> {
        self.service()?;

        let Some(routine) = self.pipeline.input_routine() else {
            return Ok(());
        };
        let format = *self.pipeline.format();
        let bpf = format.bytes_per_frame();
        let byte_range = first_frame * bpf..(first_frame + num_frames) * bpf;
        check_len(sample_buf.len(), byte_range.end)?;
        let src = &sample_buf[byte_range];

        match routine {
            InputRoutine::RawCopy => {
                let dest: &mut [u8] = bytemuck::cast_slice_mut(dest_buf);
                check_len(dest.len(), src.len())?;
                dest[..src.len()].copy_from_slice(src);
            }
            InputRoutine::Convert {
                width,
                software_gain,
                dual_mono,
            } => {
                let samples = num_frames * format.channels as usize;
                check_len(dest_buf.len(), samples)?;
                self.pipeline
                    .convert(src, &mut dest_buf[..samples], width, software_gain, dual_mono);
            }
        }
        Ok(())
    }
}

#[inline]
fn check_len(available: usize, needed: usize) -> EngineResult<()> {
    if available < needed {
        return Err(EngineError::BufferTooSmall { needed, available });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTROL SIDE
// ═══════════════════════════════════════════════════════════════════════════════

/// Control-thread handle. Setters are fire-and-forget; use
/// [`EngineHandle::wait_applied`] when the caller must know they landed.
pub struct EngineHandle {
    config: EngineConfig,
    /// Mirror of what the real-time side will have once the queue drains
    format: FormatDescriptor,
    flags: FeatureFlags,
    command_tx: Producer<EngineCommand>,
    retire_rx: Consumer<Box<AuxPath>>,
    stats: Arc<EngineStats>,
    sent: u64,
}

impl EngineHandle {
    fn send(&mut self, cmd: EngineCommand) -> EngineResult<()> {
        self.command_tx.push(cmd).map_err(|_| EngineError::QueueFull)?;
        self.sent += 1;
        Ok(())
    }

    pub fn set_phase_inversion(&mut self, on: bool) -> EngineResult<()> {
        self.send(EngineCommand::SetPhaseInversion(on))?;
        self.flags.phase_inversion = on;
        Ok(())
    }

    pub fn set_right_delay(&mut self, on: bool) -> EngineResult<()> {
        self.send(EngineCommand::SetRightDelay(on))?;
        self.flags.right_delay = on;
        Ok(())
    }

    pub fn set_right_mix_mute(&mut self, on: bool) -> EngineResult<()> {
        self.send(EngineCommand::SetRightMixMute(on))?;
        self.flags.right_mix_mute = on;
        Ok(())
    }

    pub fn set_balance(&mut self, balance: f32) -> EngineResult<()> {
        let balance = balance.clamp(-1.0, 1.0);
        self.send(EngineCommand::SetBalance(balance))?;
        self.flags.balance = balance;
        Ok(())
    }

    pub fn set_dual_mono(&mut self, mode: DualMonoMode) -> EngineResult<()> {
        self.send(EngineCommand::SetDualMono(mode))?;
        self.flags.dual_mono = mode;
        Ok(())
    }

    pub fn set_software_gain(&mut self, on: bool) -> EngineResult<()> {
        self.send(EngineCommand::SetSoftwareGain(on))?;
        self.flags.software_gain = on;
        Ok(())
    }

    pub fn set_input_gain(&mut self, gain: InputGain) -> EngineResult<()> {
        self.send(EngineCommand::SetInputGain(gain))
    }

    pub fn set_driver_context(&mut self, ctx: DriverContext) -> EngineResult<()> {
        self.send(EngineCommand::SetDriverContext(ctx))
    }

    /// Negotiate a new stream format. Unsupported formats are rejected here,
    /// before anything reaches the real-time side.
    pub fn set_format(&mut self, format: FormatDescriptor) -> EngineResult<()> {
        format.validate()?;
        select_output(&format, &self.flags)?;
        select_input(&format, &self.flags)?;
        if self.flags.aux_attached && format.channels != self.format.channels {
            return Err(BlError::InvalidConfig(
                "detach the aux sink before changing the channel count".into(),
            )
            .into());
        }
        self.send(EngineCommand::SetFormat(format))?;
        self.format = format;
        log::info!("Stream format set: {format:?}");
        Ok(())
    }

    /// Allocate aux state for `sink` and hand it to the real-time side.
    /// On failure nothing is attached.
    pub fn attach_aux(&mut self, sink: Box<dyn AuxSink>) -> EngineResult<()> {
        self.collect_retired();
        let ring_frames = self.config.ring_bytes() / self.format.bytes_per_frame().max(1);
        let path = AuxPath::new(sink, &self.config, self.format.channels as usize, ring_frames)
            .inspect_err(|e| log::warn!("Aux attach aborted: {e}"))?;
        self.send(EngineCommand::AttachAux(Box::new(path)))?;
        self.flags.aux_attached = true;
        log::info!("Aux sink attach queued");
        Ok(())
    }

    pub fn detach_aux(&mut self) -> EngineResult<()> {
        self.send(EngineCommand::DetachAux)?;
        self.flags.aux_attached = false;
        log::info!("Aux sink detach queued");
        Ok(())
    }

    /// Drop aux state handed back by the real-time side. Returns how many
    /// paths were freed.
    pub fn collect_retired(&mut self) -> usize {
        let mut freed = 0;
        while let Ok(path) = self.retire_rx.pop() {
            drop(path);
            freed += 1;
        }
        freed
    }

    /// Block until the real-time side consumed everything sent so far
    pub fn wait_applied(&mut self, timeout: Duration) -> EngineResult<()> {
        let deadline = Instant::now() + timeout;
        while self.stats.commands_applied.load(Ordering::Acquire) < self.sent {
            if Instant::now() >= deadline {
                return Err(EngineError::Timeout);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.collect_retired();
        Ok(())
    }

    #[inline]
    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    #[inline]
    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }
}
