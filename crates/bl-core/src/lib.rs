//! bl-core: Shared types for Basslink
//!
//! Stream formats, feature flags, configuration, the shared auxiliary ring
//! and the generation-tagged ring cursor used by the streaming engine.

mod aux_ring;
mod config;
mod cursor;
mod error;
mod features;
mod format;

pub use aux_ring::*;
pub use config::*;
pub use cursor::*;
pub use error::*;
pub use features::*;
pub use format::*;

/// Host mix buffer sample (interleaved, nominal range -1.0..=1.0)
pub type Sample = f32;

/// Primary stream sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum SampleRate {
    Hz32000 = 32000,
    Hz44100 = 44100,
    Hz48000 = 48000,
    Hz88200 = 88200,
    Hz96000 = 96000,
}

impl SampleRate {
    #[inline]
    pub fn as_f64(self) -> f64 {
        self as u32 as f64
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            32000 => Some(Self::Hz32000),
            44100 => Some(Self::Hz44100),
            48000 => Some(Self::Hz48000),
            88200 => Some(Self::Hz88200),
            96000 => Some(Self::Hz96000),
            _ => None,
        }
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::Hz44100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_from_hz() {
        assert_eq!(SampleRate::from_hz(44100), Some(SampleRate::Hz44100));
        assert_eq!(SampleRate::from_hz(6000), None);
        assert_eq!(SampleRate::Hz48000.as_u32(), 48000);
    }
}
