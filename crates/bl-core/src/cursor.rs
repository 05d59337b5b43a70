//! Generation-tagged ring cursor
//!
//! Positions inside a circular buffer are kept as a signed index plus a
//! generation (loop) counter. Every mutation goes through [`RingCursor::normalize`]
//! so the wraparound rules live in one place.

/// Position in a circular buffer: `index` in samples, `generation` counts wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingCursor {
    pub index: i64,
    pub generation: u64,
}

impl RingCursor {
    pub const fn new(index: i64, generation: u64) -> Self {
        Self { index, generation }
    }

    /// Fold `index` back into `[0, len)`, adjusting the generation by one per wrap.
    ///
    /// A backwards wrap below generation zero pins the cursor to the start of
    /// generation zero; there is no earlier loop to land in.
    pub fn normalize(&mut self, len: usize) {
        if len == 0 {
            self.index = 0;
            return;
        }
        let len = len as i64;
        let wraps = self.index.div_euclid(len);
        let index = self.index.rem_euclid(len);

        if wraps >= 0 {
            self.generation = self.generation.saturating_add(wraps as u64);
            self.index = index;
        } else {
            let back = wraps.unsigned_abs();
            match self.generation.checked_sub(back) {
                Some(generation) => {
                    self.generation = generation;
                    self.index = index;
                }
                None => {
                    self.generation = 0;
                    self.index = 0;
                }
            }
        }
    }

    /// Move by `delta` samples and normalize
    pub fn advance(&mut self, delta: i64, len: usize) {
        self.index = self.index.saturating_add(delta);
        self.normalize(len);
    }

    /// Absolute sample position counting whole loops
    pub fn absolute(&self, len: usize) -> i128 {
        self.generation as i128 * len as i128 + self.index as i128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_wrap() {
        let mut c = RingCursor::new(90, 3);
        c.advance(25, 100);
        assert_eq!(c, RingCursor::new(15, 4));
    }

    #[test]
    fn test_multi_wrap() {
        let mut c = RingCursor::new(0, 0);
        c.advance(350, 100);
        assert_eq!(c, RingCursor::new(50, 3));
    }

    #[test]
    fn test_backward_wrap() {
        let mut c = RingCursor::new(10, 2);
        c.advance(-30, 100);
        assert_eq!(c, RingCursor::new(80, 1));
    }

    #[test]
    fn test_backward_past_zero_pins() {
        let mut c = RingCursor::new(10, 0);
        c.advance(-30, 100);
        assert_eq!(c, RingCursor::new(0, 0));
    }

    #[test]
    fn test_exact_boundary() {
        let mut c = RingCursor::new(100, 0);
        c.normalize(100);
        assert_eq!(c, RingCursor::new(0, 1));
    }

    #[test]
    fn test_absolute_preserved_by_normalize() {
        let mut c = RingCursor::new(-250, 5);
        let before = c.absolute(100);
        c.normalize(100);
        assert_eq!(c.absolute(100), before);
        assert!((0..100).contains(&c.index));
    }
}
