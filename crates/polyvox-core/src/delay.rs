//! Circular delay line with fractional reads.
//!
//! Used by plucked-string voices, where the loop length follows the note
//! frequency and rarely lands on a whole number of samples.

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std as alloc;

use alloc::vec;
use alloc::vec::Vec;

/// Delay line over a heap buffer allocated once at construction.
///
/// Reads address samples by age: `read(0)` is the sample written most
/// recently. Reads past the capacity return silence rather than wrapping
/// into stale data.
///
/// # Example
///
/// ```rust
/// use polyvox_core::DelayLine;
///
/// let mut delay = DelayLine::new(8);
/// delay.write(1.0);
/// delay.write(3.0);
///
/// assert_eq!(delay.read(0), 3.0);
/// assert_eq!(delay.read(1), 1.0);
/// assert_eq!(delay.read_interpolated(0.5), 2.0);
/// ```
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    /// Creates a delay line holding `capacity` samples (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            write_pos: 0,
        }
    }

    /// Samples the line can remember.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Pushes one sample.
    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    /// Sample written `samples_ago` writes back.
    #[inline]
    pub fn read(&self, samples_ago: usize) -> f32 {
        let len = self.buffer.len();
        if samples_ago >= len {
            return 0.0;
        }
        self.buffer[(self.write_pos + len - 1 - samples_ago) % len]
    }

    /// Linearly interpolated read at a fractional age.
    #[inline]
    pub fn read_interpolated(&self, samples_ago: f32) -> f32 {
        if samples_ago.is_nan() || samples_ago < 0.0 {
            return 0.0;
        }
        let whole = samples_ago as usize;
        let frac = samples_ago - whole as f32;
        let a = self.read(whole);
        let b = self.read(whole + 1);
        a + (b - a) * frac
    }

    /// Zeroes the buffer.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_by_age() {
        let mut delay = DelayLine::new(4);
        for i in 1..=6 {
            delay.write(i as f32);
        }
        assert_eq!(delay.read(0), 6.0);
        assert_eq!(delay.read(3), 3.0);
        assert_eq!(delay.read(4), 0.0, "reads beyond capacity are silent");
    }

    #[test]
    fn test_interpolated_read() {
        let mut delay = DelayLine::new(16);
        delay.write(0.0);
        delay.write(4.0);
        assert!((delay.read_interpolated(0.25) - 3.0).abs() < 1e-6);
        assert_eq!(delay.read_interpolated(-1.0), 0.0);
        assert_eq!(delay.read_interpolated(f32::NAN), 0.0);
    }

    #[test]
    fn test_clear() {
        let mut delay = DelayLine::new(4);
        delay.write(1.0);
        delay.clear();
        assert_eq!(delay.read(0), 0.0);
    }
}
