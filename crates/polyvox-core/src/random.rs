//! Deterministic pseudo-random numbers for audio-rate use.
//!
//! Nothing here touches global state, so two engines fed the same events
//! produce the same noise.

/// Xorshift32 generator.
///
/// # Example
///
/// ```rust
/// use polyvox_core::Xorshift32;
///
/// let mut a = Xorshift32::new(7);
/// let mut b = Xorshift32::new(7);
/// assert_eq!(a.next_bipolar(), b.next_bipolar());
/// ```
#[derive(Debug, Clone)]
pub struct Xorshift32 {
    state: u32,
}

impl Xorshift32 {
    /// Seeds the generator. A zero seed is replaced, since xorshift would
    /// stay at zero forever.
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 0x9E37_79B9 } else { seed },
        }
    }

    /// Next raw 32-bit value.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform in `[0, 1)`.
    #[inline]
    pub fn next_unipolar(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform in `[-1, 1)`.
    #[inline]
    pub fn next_bipolar(&mut self) -> f32 {
        self.next_unipolar() * 2.0 - 1.0
    }
}

impl Default for Xorshift32 {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Stateless hash-based random value in `[0, 1)` for `(seed, index)`.
///
/// The same pair always yields the same value, which makes spectra built
/// from it reproducible across runs and save/load.
#[inline]
pub fn deterministic_random(seed: u32, index: u32) -> f32 {
    // splitmix-style finalizer
    let mut z = ((u64::from(seed) << 32) | u64::from(index)).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 40) as f32 / (1u64 << 24) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        let mut rng = Xorshift32::new(12345);
        for _ in 0..10000 {
            let u = rng.next_unipolar();
            assert!((0.0..1.0).contains(&u), "unipolar out of range: {u}");
            let b = rng.next_bipolar();
            assert!((-1.0..1.0).contains(&b), "bipolar out of range: {b}");
        }
    }

    #[test]
    fn test_zero_seed_is_usable() {
        let mut rng = Xorshift32::new(0);
        assert_ne!(rng.next_u32(), 0);
    }

    #[test]
    fn test_deterministic_random_is_stable() {
        assert_eq!(deterministic_random(60, 3), deterministic_random(60, 3));
        assert_ne!(deterministic_random(60, 3), deterministic_random(60, 4));
        assert_ne!(deterministic_random(61, 3), deterministic_random(60, 3));
        for i in 0..1000 {
            let v = deterministic_random(7, i);
            assert!((0.0..1.0).contains(&v));
        }
    }
}
