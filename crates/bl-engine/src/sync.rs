//! Aux clock tracking
//!
//! The aux sink runs on its own crystal. `SyncEngine` keeps a virtual write
//! cursor into the sink's ring, compares it with the reader once per block,
//! nudges the resampling rate to hold a target lead, and throws everything
//! away for a full resync when the two sides have clearly drifted apart.
//!
//! ```text
//!             needs resync / sink request
//!   ┌──────────┐ ─────────────────────────▶ ┌───────────┐
//!   │ Tracking │                            │ Resyncing │ (within one block)
//!   └──────────┘ ◀───────────────────────── └───────────┘
//!         ▲              cursor = reader + lead    ▲
//!         │                                        │
//!   ┌──────────┐  attach / engine restart          │
//!   │ Unsynced │ ──────────────────────────────────┘
//!   └──────────┘
//! ```

use bl_core::{AuxConfig, AuxFormat, AuxPosition, RingCursor};

// ═══════════════════════════════════════════════════════════════════════════════
// PURE HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Hard limits around the reader, in aux samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncLimits {
    pub safety_margin: i64,
    pub max_queued: i64,
}

/// Why a full resync was forced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesyncReason {
    /// Reader inside the safety margin in front of the writer
    ReaderCaughtUp,
    /// Writer more than one loop ahead
    WriterLapped,
    /// Writer on an earlier loop than the reader
    WriterBehind,
    /// More data ahead of the reader than could legitimately be queued
    OverQueued,
}

/// Samples between reader and writer, if the two are in a sane relation
pub fn cursor_distance(writer: RingCursor, reader: AuxPosition, len: usize) -> Option<i64> {
    let r = reader.offset as i64;
    if writer.generation == reader.loop_count && writer.index >= r {
        Some(writer.index - r)
    } else if writer.generation == reader.loop_count.saturating_add(1) && writer.index < r {
        Some(len as i64 - r + writer.index)
    } else {
        None
    }
}

/// Adaptive output rate for a measured distance
pub fn adapt_rate(distance: i64, lead: i64, nominal: u32) -> u32 {
    let step = nominal / 16;
    let twice = distance.saturating_mul(2);
    if twice < lead {
        nominal + step
    } else if twice > lead.saturating_mul(3) {
        nominal - step
    } else {
        nominal
    }
}

/// Check the writer/reader relation against the resync conditions
pub fn detect_desync(
    writer: RingCursor,
    reader: AuxPosition,
    len: usize,
    limits: &SyncLimits,
) -> Option<DesyncReason> {
    if writer.generation > reader.loop_count.saturating_add(1) {
        return Some(DesyncReason::WriterLapped);
    }
    if writer.generation < reader.loop_count {
        return Some(DesyncReason::WriterBehind);
    }
    let read_abs = reader.loop_count as i128 * len as i128 + reader.offset as i128;
    let queued = writer.absolute(len) - read_abs;
    if writer.generation == reader.loop_count && queued < limits.safety_margin as i128 {
        return Some(DesyncReason::ReaderCaughtUp);
    }
    if queued > limits.max_queued as i128 {
        return Some(DesyncReason::OverQueued);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYNC ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Smallest resync lead, in safety margins. Keeps the catch-up threshold
/// (half the lead) clear of the desync threshold.
const MIN_LEAD_MARGINS: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Unsynced,
    Tracking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncState {
    pub needs_full_resync: bool,
    /// Sink has been told to start playing
    pub aux_started: bool,
    /// Transfer program restarted since the last block
    pub just_reset: bool,
    /// Target writer lead, in aux samples
    pub initial_lead: i64,
    pub adaptive_rate: u32,
}

impl SyncState {
    pub fn phase(&self) -> SyncPhase {
        if self.needs_full_resync {
            SyncPhase::Unsynced
        } else {
            SyncPhase::Tracking
        }
    }
}

/// Host-side view of the block being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTiming {
    pub first_frame: usize,
    pub num_frames: usize,
    /// Frame the primary hardware is at right now
    pub hardware_frame: usize,
}

/// What happened during one block, for the caller to act on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStep {
    pub desync: Option<DesyncReason>,
    /// Filters and the aux ring must be zeroed before processing
    pub resynced: bool,
    /// First block since attach: start the sink after writing
    pub start_sink: bool,
}

/// Write cursor and rate control for one attached sink
#[derive(Debug, Clone)]
pub struct SyncEngine {
    state: SyncState,
    cursor: RingCursor,
    ring_len: usize,
    aux_rate: u32,
    aux_channels: usize,
    host_rate: f64,
    host_ring_frames: usize,
    limits: SyncLimits,
    previous_clipped_to: Option<usize>,
}

impl SyncEngine {
    pub fn new(
        aux: &AuxFormat,
        ring_len: usize,
        host_rate: f64,
        host_ring_frames: usize,
        config: &AuxConfig,
    ) -> Self {
        Self {
            state: SyncState {
                needs_full_resync: true,
                aux_started: false,
                just_reset: false,
                initial_lead: config.initial_lead_samples(aux),
                adaptive_rate: aux.sample_rate,
            },
            cursor: RingCursor::default(),
            ring_len: ring_len.max(1),
            aux_rate: aux.sample_rate,
            aux_channels: (aux.channels as usize).max(1),
            host_rate,
            host_ring_frames: host_ring_frames.max(1),
            limits: SyncLimits {
                safety_margin: config.safety_margin_samples(aux),
                max_queued: config.max_queued_samples(aux),
            },
            previous_clipped_to: None,
        }
    }

    #[inline]
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    #[inline]
    pub fn cursor(&self) -> RingCursor {
        self.cursor
    }

    #[inline]
    pub fn cursor_mut(&mut self) -> &mut RingCursor {
        &mut self.cursor
    }

    #[inline]
    pub fn adaptive_rate(&self) -> u32 {
        self.state.adaptive_rate
    }

    #[inline]
    pub fn nominal_rate(&self) -> u32 {
        self.aux_rate
    }

    #[inline]
    pub fn limits(&self) -> &SyncLimits {
        &self.limits
    }

    #[inline]
    pub fn ring_len(&self) -> usize {
        self.ring_len
    }

    /// The transfer program was (re)started: resync from the stored lead
    pub fn mark_restarted(&mut self) {
        self.state.just_reset = true;
        self.state.needs_full_resync = true;
        self.state.adaptive_rate = self.aux_rate;
        self.previous_clipped_to = None;
    }

    /// The primary ring changed length (new sample width). Frame positions
    /// from the old geometry are meaningless, so the next block resyncs.
    pub fn set_host_ring_frames(&mut self, frames: usize) {
        self.host_ring_frames = frames.max(1);
        self.previous_clipped_to = None;
        self.state.needs_full_resync = true;
    }

    #[inline]
    pub fn host_ring_frames(&self) -> usize {
        self.host_ring_frames
    }

    /// Host frames to aux samples, rounded to whole aux frames
    pub fn frames_to_samples(&self, frames: i64) -> i64 {
        let aux_frames = (frames as f64 * self.aux_rate as f64 / self.host_rate).round() as i64;
        aux_frames.saturating_mul(self.aux_channels as i64)
    }

    /// Shift the cursor by a host frame gap
    pub fn compensate(&mut self, frame_gap: i64) {
        let delta = self.frames_to_samples(frame_gap);
        self.cursor.advance(delta, self.ring_len);
    }

    /// Place the cursor a fresh lead in front of the reader
    pub fn resync(&mut self, timing: &BlockTiming, reader: AuxPosition) {
        let lead = if self.state.just_reset {
            self.state.initial_lead
        } else {
            let ring = self.host_ring_frames as i64;
            let gap = (timing.first_frame as i64 - timing.hardware_frame as i64).rem_euclid(ring);
            self.frames_to_samples(gap)
        };
        let lead = lead
            .max(self.limits.safety_margin.saturating_mul(MIN_LEAD_MARGINS))
            .min(self.limits.max_queued);

        self.cursor = RingCursor::new(reader.offset as i64 + lead, reader.loop_count);
        self.cursor.normalize(self.ring_len);
        self.state.initial_lead = lead;
        self.state.adaptive_rate = self.aux_rate;
        self.state.needs_full_resync = false;

        log::debug!(
            "Aux resync: lead {} samples, cursor {:?}, reader {:?}",
            lead,
            self.cursor,
            reader
        );
    }

    /// Run the per-block sync steps ahead of downsampling
    pub fn begin_block(
        &mut self,
        timing: &BlockTiming,
        reader: AuxPosition,
        sink_requests_resync: bool,
    ) -> SyncStep {
        let mut step = SyncStep::default();

        if self.state.phase() == SyncPhase::Tracking {
            let distance = cursor_distance(self.cursor, reader, self.ring_len)
                .unwrap_or(self.state.initial_lead);
            self.state.adaptive_rate = adapt_rate(distance, self.state.initial_lead, self.aux_rate);

            if !self.state.just_reset {
                let desync = detect_desync(self.cursor, reader, self.ring_len, &self.limits);
                if let Some(reason) = desync {
                    log::warn!(
                        "Aux desync ({reason:?}): cursor {:?}, reader {:?}",
                        self.cursor,
                        reader
                    );
                    step.desync = Some(reason);
                    self.state.needs_full_resync = true;
                }
            }
        }

        if self.state.needs_full_resync || sink_requests_resync {
            self.resync(timing, reader);
            step.resynced = true;
        } else if let Some(prev) = self.previous_clipped_to {
            if timing.first_frame != prev {
                let ring = self.host_ring_frames as i64;
                let mut gap = (timing.first_frame as i64 - prev as i64).rem_euclid(ring);
                if gap > ring / 2 {
                    gap -= ring;
                }
                self.compensate(gap);
            }
        }

        if !self.state.aux_started {
            self.state.aux_started = true;
            // The reader counts loops from zero once started
            self.cursor.generation = self.cursor.generation.saturating_sub(reader.loop_count);
            step.start_sink = true;
        }

        self.state.just_reset = false;
        let end = (timing.first_frame + timing.num_frames) % self.host_ring_frames;
        self.previous_clipped_to = Some(end);
        step
    }
}
