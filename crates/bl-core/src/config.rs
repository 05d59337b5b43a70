//! Engine configuration and driver context
//!
//! Timing constants that came out of hardware measurements (lead distance,
//! safety margin, queue limit) are plain configuration here, expressed in
//! milliseconds and converted to aux samples once the sink's format is known.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{AuxFormat, BlError, BlResult, SampleRate};

/// Primary transfer ring geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    pub block_count: usize,
    /// Bytes per block
    pub block_size: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            block_count: 512,
            block_size: 128,
        }
    }
}

/// Auxiliary sink tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuxConfig {
    /// Crossover point between primary and aux output
    pub crossover_hz: f64,
    /// Target writer lead over the sink's reader
    pub initial_lead_ms: f64,
    /// Reader closer than this to the writer forces a resync
    pub safety_margin_ms: f64,
    /// Writer further ahead than this forces a resync
    pub max_queued_ms: f64,
}

impl Default for AuxConfig {
    fn default() -> Self {
        Self {
            crossover_hz: 120.0,
            initial_lead_ms: 40.0,
            safety_margin_ms: 5.0,
            max_queued_ms: 250.0,
        }
    }
}

impl AuxConfig {
    fn ms_to_samples(ms: f64, format: &AuxFormat) -> i64 {
        let frames = (ms * format.sample_rate as f64 / 1000.0).round() as i64;
        frames * format.channels as i64
    }

    pub fn initial_lead_samples(&self, format: &AuxFormat) -> i64 {
        Self::ms_to_samples(self.initial_lead_ms, format)
    }

    pub fn safety_margin_samples(&self, format: &AuxFormat) -> i64 {
        Self::ms_to_samples(self.safety_margin_ms, format)
    }

    pub fn max_queued_samples(&self, format: &AuxFormat) -> i64 {
        Self::ms_to_samples(self.max_queued_ms, format)
    }

    /// Check the limits are coherent for a sink with a ring of `ring_len` samples
    pub fn validate_for(&self, format: &AuxFormat, ring_len: usize) -> BlResult<()> {
        if format.sample_rate == 0 || format.channels == 0 {
            return Err(BlError::InvalidConfig(format!("aux format {format:?}")));
        }
        let margin = self.safety_margin_samples(format);
        let lead = self.initial_lead_samples(format);
        let queued = self.max_queued_samples(format);
        if !(0 <= margin && margin < lead && lead < queued) {
            return Err(BlError::InvalidConfig(format!(
                "aux limits must satisfy margin < lead < max queued ({margin} / {lead} / {queued} samples)"
            )));
        }
        if queued > ring_len as i64 {
            return Err(BlError::InvalidConfig(format!(
                "max queued ({queued} samples) exceeds aux ring ({ring_len} samples)"
            )));
        }
        Ok(())
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: SampleRate,
    pub ring: RingConfig,
    pub aux: AuxConfig,
    /// Capacity of the control -> real-time command queue
    pub command_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz44100,
            ring: RingConfig::default(),
            aux: AuxConfig::default(),
            command_queue_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> BlResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> BlResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> BlResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> BlResult<()> {
        if self.ring.block_count == 0 {
            return Err(BlError::InvalidConfig("ring block count is zero".into()));
        }
        if self.ring.block_size == 0 || self.ring.block_size > u16::MAX as usize {
            return Err(BlError::InvalidConfig(format!(
                "ring block size {} outside 1..=65535",
                self.ring.block_size
            )));
        }
        if self.command_queue_capacity == 0 {
            return Err(BlError::InvalidConfig("command queue capacity is zero".into()));
        }
        let nyquist = self.sample_rate.as_f64() / 2.0;
        if !(self.aux.crossover_hz > 0.0 && self.aux.crossover_hz < nyquist) {
            return Err(BlError::InvalidConfig(format!(
                "crossover {} Hz outside (0, {nyquist})",
                self.aux.crossover_hz
            )));
        }
        Ok(())
    }

    /// Total primary ring size in bytes
    #[inline]
    pub fn ring_bytes(&self) -> usize {
        self.ring.block_count * self.ring.block_size
    }
}

/// Driver-wide state handed to the engine explicitly
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverContext {
    /// Master mute: produced output is silence
    pub mute: bool,
    /// Linear master volume, applied to the aux stream
    pub left_volume: f32,
    pub right_volume: f32,
}

impl Default for DriverContext {
    fn default() -> Self {
        Self {
            mute: false,
            left_volume: 1.0,
            right_volume: 1.0,
        }
    }
}
