//! Per-stream feature flags

use serde::{Deserialize, Serialize};

/// Dual-mono input handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DualMonoMode {
    #[default]
    Disabled,
    CopyLeftToRight,
    CopyRightToLeft,
}

/// Feature flags that influence routine selection.
///
/// Every setter on the engine side mutates one of these and re-runs
/// selection, so the struct itself carries no behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Invert right channel polarity (16-bit output only)
    pub phase_inversion: bool,
    /// Delay right channel output by one frame
    pub right_delay: bool,
    /// Sum right into left and mute right
    pub right_mix_mute: bool,
    /// -1.0 (full left) ..= 1.0 (full right)
    pub balance: f32,
    pub dual_mono: DualMonoMode,
    pub software_gain: bool,
    pub aux_attached: bool,
}

impl FeatureFlags {
    /// Per-channel gains derived from balance
    pub fn balance_gains(&self) -> (f32, f32) {
        let b = self.balance.clamp(-1.0, 1.0);
        let left = if b > 0.0 { 1.0 - b } else { 1.0 };
        let right = if b < 0.0 { 1.0 + b } else { 1.0 };
        (left, right)
    }
}

/// Software input gain (linear)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputGain {
    pub left: f32,
    pub right: f32,
}

impl Default for InputGain {
    fn default() -> Self {
        Self {
            left: 1.0,
            right: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_gains() {
        let mut flags = FeatureFlags::default();
        assert_eq!(flags.balance_gains(), (1.0, 1.0));

        flags.balance = 0.5;
        assert_eq!(flags.balance_gains(), (0.5, 1.0));

        flags.balance = -2.0;
        assert_eq!(flags.balance_gains(), (1.0, 0.0));
    }
}
