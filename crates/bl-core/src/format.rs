//! Stream format description
//!
//! A `FormatDescriptor` is negotiated by the host and drives conversion
//! routine selection. Only signed integer 16/32-bit PCM is converted; other
//! mixable formats are rejected at configuration time.

use serde::{Deserialize, Serialize};

use crate::{BlError, BlResult};

/// Numeric representation of samples in the hardware buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericRepr {
    SignedInt,
    Float,
}

/// Byte order of samples in the hardware buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    BigEndian,
    LittleEndian,
}

/// Bit widths the conversion pipeline handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleWidth {
    Bits16,
    Bits32,
}

impl SampleWidth {
    #[inline]
    pub fn bytes(self) -> usize {
        match self {
            Self::Bits16 => 2,
            Self::Bits32 => 4,
        }
    }
}

/// Negotiated stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub channels: u16,
    /// Container width in bits
    pub bit_width: u8,
    pub numeric: NumericRepr,
    pub byte_order: ByteOrder,
    /// Non-mixable streams (encoded passthrough) bypass all DSP
    pub mixable: bool,
}

impl FormatDescriptor {
    /// Stereo 16-bit big-endian PCM, the usual onboard format
    pub const fn stereo_i16() -> Self {
        Self {
            channels: 2,
            bit_width: 16,
            numeric: NumericRepr::SignedInt,
            byte_order: ByteOrder::BigEndian,
            mixable: true,
        }
    }

    /// Stereo 32-bit big-endian PCM
    pub const fn stereo_i32() -> Self {
        Self {
            bit_width: 32,
            ..Self::stereo_i16()
        }
    }

    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        (self.bit_width as usize).div_ceil(8)
    }

    #[inline]
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Resolve the conversion width, rejecting anything the kernels can't handle
    pub fn sample_width(&self) -> BlResult<SampleWidth> {
        if self.numeric != NumericRepr::SignedInt {
            return Err(BlError::FormatUnsupported(format!(
                "{:?} samples are not converted",
                self.numeric
            )));
        }
        match self.bit_width {
            16 => Ok(SampleWidth::Bits16),
            32 => Ok(SampleWidth::Bits32),
            other => Err(BlError::FormatUnsupported(format!("{other}-bit samples"))),
        }
    }

    /// Check the descriptor is usable at all
    pub fn validate(&self) -> BlResult<()> {
        if self.channels == 0 {
            return Err(BlError::FormatUnsupported("zero channels".into()));
        }
        if self.bit_width == 0 {
            return Err(BlError::FormatUnsupported("zero bit width".into()));
        }
        if self.mixable {
            self.sample_width()?;
        }
        Ok(())
    }
}

impl Default for FormatDescriptor {
    fn default() -> Self {
        Self::stereo_i16()
    }
}
