//! Per-block sample kernels
//!
//! Output kernels clip float mix samples into 16/32-bit PCM, input kernels do
//! the reverse. Both work on interleaved frames and honour the stream's byte
//! order. Nothing here allocates.

use bl_core::{ByteOrder, DualMonoMode, InputGain, Sample, SampleWidth};

/// Left/right treatment applied while clipping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelStage {
    Plain,
    /// Negate the right channel
    InvertRight,
    /// Left becomes the L/R average, right is silenced
    MixRightMute,
    /// Right channel runs one frame late
    DelayRight,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SAMPLE ENCODING
// ═══════════════════════════════════════════════════════════════════════════════

#[inline]
pub fn clip_i16(x: Sample) -> i16 {
    (x.clamp(-1.0, 1.0) * 32767.0) as i16
}

#[inline]
pub fn clip_i32(x: Sample) -> i32 {
    (x.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32
}

#[inline]
fn put_i16(dst: &mut [u8], value: i16, order: ByteOrder) {
    let bytes = match order {
        ByteOrder::BigEndian => value.to_be_bytes(),
        ByteOrder::LittleEndian => value.to_le_bytes(),
    };
    dst.copy_from_slice(&bytes);
}

#[inline]
fn put_i32(dst: &mut [u8], value: i32, order: ByteOrder) {
    let bytes = match order {
        ByteOrder::BigEndian => value.to_be_bytes(),
        ByteOrder::LittleEndian => value.to_le_bytes(),
    };
    dst.copy_from_slice(&bytes);
}

#[inline]
fn get_i16(src: &[u8], order: ByteOrder) -> i16 {
    let bytes = [src[0], src[1]];
    match order {
        ByteOrder::BigEndian => i16::from_be_bytes(bytes),
        ByteOrder::LittleEndian => i16::from_le_bytes(bytes),
    }
}

#[inline]
fn get_i32(src: &[u8], order: ByteOrder) -> i32 {
    let bytes = [src[0], src[1], src[2], src[3]];
    match order {
        ByteOrder::BigEndian => i32::from_be_bytes(bytes),
        ByteOrder::LittleEndian => i32::from_le_bytes(bytes),
    }
}

#[inline]
fn encode(dst: &mut [u8], value: Sample, width: SampleWidth, order: ByteOrder) {
    match width {
        SampleWidth::Bits16 => put_i16(dst, clip_i16(value), order),
        SampleWidth::Bits32 => put_i32(dst, clip_i32(value), order),
    }
}

#[inline]
fn decode(src: &[u8], width: SampleWidth, order: ByteOrder) -> Sample {
    match width {
        SampleWidth::Bits16 => get_i16(src, order) as Sample / 32768.0,
        SampleWidth::Bits32 => (get_i32(src, order) as f64 / 2_147_483_648.0) as Sample,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Clip `src` into `dst`.
///
/// `delayed_right` carries the right sample between blocks for
/// [`ChannelStage::DelayRight`]. With `mute` set every written sample is zero,
/// but the delay line still advances.
#[allow(clippy::too_many_arguments)]
pub fn clip_block(
    src: &[Sample],
    dst: &mut [u8],
    channels: usize,
    width: SampleWidth,
    order: ByteOrder,
    stage: ChannelStage,
    mute: bool,
    delayed_right: &mut Sample,
) {
    let bps = width.bytes();
    let frames = src
        .chunks_exact(channels)
        .zip(dst.chunks_exact_mut(channels * bps));

    for (frame, out) in frames {
        let mut left = frame[0];
        let mut right = if channels > 1 { frame[1] } else { 0.0 };

        match stage {
            ChannelStage::Plain => {}
            ChannelStage::InvertRight => right = -right,
            ChannelStage::MixRightMute => {
                left = (left + right) * 0.5;
                right = 0.0;
            }
            ChannelStage::DelayRight => std::mem::swap(&mut right, delayed_right),
        }

        for (ch, slot) in out.chunks_exact_mut(bps).enumerate() {
            let value = match ch {
                _ if mute => 0.0,
                0 => left,
                1 => right,
                _ => frame[ch],
            };
            encode(slot, value, width, order);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INPUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Decode `src` into float frames in `dst`, applying dual-mono copy and
/// optional per-channel gain
pub fn convert_block(
    src: &[u8],
    dst: &mut [Sample],
    channels: usize,
    width: SampleWidth,
    order: ByteOrder,
    gain: Option<InputGain>,
    dual_mono: DualMonoMode,
) {
    let bps = width.bytes();
    let frames = src
        .chunks_exact(channels * bps)
        .zip(dst.chunks_exact_mut(channels));

    for (raw, out) in frames {
        for (ch, slot) in raw.chunks_exact(bps).enumerate() {
            out[ch] = decode(slot, width, order);
        }

        if channels > 1 {
            match dual_mono {
                DualMonoMode::Disabled => {}
                DualMonoMode::CopyLeftToRight => out[1] = out[0],
                DualMonoMode::CopyRightToLeft => out[0] = out[1],
            }
        }

        if let Some(gain) = gain {
            out[0] *= gain.left;
            if channels > 1 {
                out[1] *= gain.right;
            }
        }
    }
}
