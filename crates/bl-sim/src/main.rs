//! Basslink simulator
//!
//! Usage:
//!   bl-sim run [--config FILE] [--blocks N] [--skew-ppm PPM] [--stall-at N] [--detach-at N]
//!   bl-sim default-config        - Print the default engine config as JSON
//!
//! Runs the stream engine against a scattered-page buffer, simulated DMA
//! channels and a simulated aux sink whose clock drifts from the host's.
//! `RUST_LOG=debug` shows every resync.

use std::f64::consts::TAU;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use bl_core::{AuxFormat, EngineConfig, FormatDescriptor, Sample};
use bl_dma::{DmaChannel, PagedMapper, SimulatedChannel};
use bl_engine::{Hardware, SimulatedSink, StreamEngine};

const PAGE_SIZE: usize = 4096;

#[derive(Parser)]
#[command(name = "bl-sim", about = "Basslink stream engine simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against simulated hardware
    Run {
        /// Engine config (JSON); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Blocks to process
        #[arg(short, long, default_value_t = 4000)]
        blocks: usize,
        /// Frames per host block
        #[arg(long, default_value_t = 128)]
        block_frames: usize,
        /// How many blocks the host clips ahead of the hardware
        #[arg(long, default_value_t = 4)]
        lead_blocks: usize,
        /// Aux sink clock error in parts per million
        #[arg(long, default_value_t = 150.0, allow_hyphen_values = true)]
        skew_ppm: f64,
        /// Aux sink ring length in samples
        #[arg(long, default_value_t = 6000)]
        aux_ring: usize,
        /// Kill the output channel at this block
        #[arg(long)]
        stall_at: Option<usize>,
        /// Detach the aux sink at this block, re-attach 100 blocks later
        #[arg(long)]
        detach_at: Option<usize>,
        /// Run without an aux sink
        #[arg(long)]
        no_aux: bool,
    },
    /// Print the default engine config as JSON
    DefaultConfig,
}

struct RunArgs {
    config: Option<PathBuf>,
    blocks: usize,
    block_frames: usize,
    lead_blocks: usize,
    skew_ppm: f64,
    aux_ring: usize,
    stall_at: Option<usize>,
    detach_at: Option<usize>,
    no_aux: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            blocks,
            block_frames,
            lead_blocks,
            skew_ppm,
            aux_ring,
            stall_at,
            detach_at,
            no_aux,
        } => run(RunArgs {
            config,
            blocks,
            block_frames,
            lead_blocks,
            skew_ppm,
            aux_ring,
            stall_at,
            detach_at,
            no_aux,
        }),
        Commands::DefaultConfig => {
            println!("{}", EngineConfig::default().to_json_pretty()?);
            Ok(())
        }
    }
}

/// Bass tone plus a treble tone, so both bands carry signal
fn fill_mix(mix: &mut [Sample], channels: usize, sample_rate: f64) {
    for (i, frame) in mix.chunks_exact_mut(channels).enumerate() {
        let t = i as f64 / sample_rate;
        let v = 0.4 * (TAU * 50.0 * t).sin() + 0.2 * (TAU * 1000.0 * t).sin();
        frame.fill(v as Sample);
    }
}

fn run(args: RunArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if args.block_frames == 0 {
        bail!("block frames must be positive");
    }

    let format = FormatDescriptor::stereo_i16();
    let ring_bytes = config.ring_bytes();
    let channels = format.channels as usize;
    let bpf = format.bytes_per_frame();

    let output = Arc::new(SimulatedChannel::new());
    let hardware = Hardware {
        output: output.clone(),
        output_mapper: Arc::new(PagedMapper::scattered(
            0x4000_0000,
            ring_bytes.div_ceil(PAGE_SIZE),
            PAGE_SIZE,
        )),
        output_command_base: 0x1000,
        input: None,
    };
    let (mut engine, mut handle) =
        StreamEngine::new(config, format, hardware).context("Failed to create engine")?;
    engine.start().context("Failed to start transfer program")?;

    let ring_frames = engine.ring_frames();
    if args.block_frames > ring_frames {
        bail!("block of {} frames exceeds ring of {ring_frames}", args.block_frames);
    }
    let sample_rate = config.sample_rate.as_f64();
    let mut mix = vec![0.0; ring_frames * channels];
    fill_mix(&mut mix, channels, sample_rate);
    let mut samples = vec![0u8; ring_bytes];

    let aux_format = AuxFormat::default();
    let new_sink = || SimulatedSink::new(aux_format, args.aux_ring);
    let mut sink = None;
    if !args.no_aux {
        let s = new_sink().context("Failed to create aux sink")?;
        handle.attach_aux(Box::new(s.clone()))?;
        sink = Some(s);
    }

    let supervisor = engine.supervisor();
    let reader_step = args.block_frames as f64 * aux_format.sample_rate as f64 / sample_rate
        * (1.0 + args.skew_ppm / 1e6)
        * aux_format.channels as f64;
    let mut reader_acc = 0.0;
    let mut last_position = 0;

    log::info!(
        "Simulating {} blocks of {} frames, aux skew {} ppm",
        args.blocks,
        args.block_frames,
        args.skew_ppm
    );

    for block in 0..args.blocks {
        if args.stall_at == Some(block) {
            log::warn!("Injecting output stall at block {block}");
            output.stall();
        }
        if args.detach_at == Some(block) && sink.is_some() {
            handle.detach_aux()?;
            sink = None;
        }
        if args.detach_at.map(|at| at + 100) == Some(block) && !args.no_aux {
            let s = new_sink().context("Failed to create aux sink")?;
            handle.attach_aux(Box::new(s.clone()))?;
            sink = Some(s);
        }

        let first = ((block + args.lead_blocks) * args.block_frames) % ring_frames;
        let frames = args.block_frames.min(ring_frames - first);
        engine.clip_output(&mix, &mut samples, first, frames)?;

        output.advance(frames * bpf);
        let position = output.position();
        // Interrupt once per trip around the ring, or when the channel died
        if position < last_position || !output.is_active() {
            supervisor.supervise();
        }
        last_position = position;

        if let Some(s) = &sink {
            reader_acc += reader_step;
            let whole = reader_acc.floor();
            reader_acc -= whole;
            s.advance(whole as u64);
        }
        handle.collect_retired();
    }

    handle
        .wait_applied(Duration::from_millis(10))
        .context("Engine did not drain its command queue")?;
    engine.stop();

    let stats = engine.stats();
    log::info!(
        "Done: {} blocks, {} restarts, {} resyncs, {} desyncs, {} interrupts",
        stats.blocks.load(Ordering::Relaxed),
        stats.restarts.load(Ordering::Relaxed),
        stats.resyncs.load(Ordering::Relaxed),
        stats.desyncs.load(Ordering::Relaxed),
        supervisor.loop_count()
    );
    if let Some(path) = engine.aux_path() {
        let sync = path.sync();
        log::info!(
            "Aux cursor {:?}, rate {} Hz (nominal {})",
            sync.cursor(),
            sync.adaptive_rate(),
            sync.nominal_rate()
        );
    }
    Ok(())
}
