//! Shared ring for the auxiliary bass sink
//!
//! The engine writes downsampled 16-bit samples, the sink reads them on its
//! own clock. Cells are atomics so both sides can touch the ring without a
//! lock; ordering between them is carried by the sink's reported position,
//! not by the cells.

use std::sync::atomic::{AtomicI16, Ordering};

use crate::{BlError, BlResult};

/// Native format of the auxiliary sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AuxFormat {
    fn default() -> Self {
        Self {
            sample_rate: 6000,
            channels: 2,
        }
    }
}

/// Read position reported by the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuxPosition {
    /// Sample offset, `0 <= offset < ring len`
    pub offset: usize,
    pub loop_count: u64,
}

/// Fixed-length ring of interleaved 16-bit samples
#[derive(Debug)]
pub struct AuxRing {
    samples: Box<[AtomicI16]>,
}

impl AuxRing {
    /// Allocate a zeroed ring of `len` samples
    pub fn new(len: usize) -> BlResult<Self> {
        if len == 0 {
            return Err(BlError::InvalidConfig("aux ring length is zero".into()));
        }
        let mut samples = Vec::new();
        samples
            .try_reserve_exact(len)
            .map_err(|e| BlError::AllocationFailure(format!("aux ring ({len} samples): {e}")))?;
        samples.extend((0..len).map(|_| AtomicI16::new(0)));
        Ok(Self {
            samples: samples.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Store one sample; `index` is reduced modulo the ring length
    #[inline]
    pub fn write(&self, index: usize, value: i16) {
        let idx = index % self.samples.len();
        self.samples[idx].store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn read(&self, index: usize) -> i16 {
        let idx = index % self.samples.len();
        self.samples[idx].load(Ordering::Relaxed)
    }

    /// Zero every sample
    pub fn clear(&self) {
        for s in self.samples.iter() {
            s.store(0, Ordering::Relaxed);
        }
    }

    /// Copy `out.len()` samples starting at `start`, wrapping
    pub fn read_into(&self, start: usize, out: &mut [i16]) {
        for (i, o) in out.iter_mut().enumerate() {
            *o = self.read(start + i);
        }
    }
}
