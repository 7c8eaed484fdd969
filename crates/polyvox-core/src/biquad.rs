//! Second-order low-pass filter.
//!
//! Coefficients follow the RBJ Audio EQ Cookbook. Only the low-pass
//! response is needed by the voices, so that is the only one provided.

use core::f32::consts::PI;
use libm::{cosf, sinf};

/// Direct Form I biquad:
///
/// ```text
/// y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
/// ```
#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    /// Creates a pass-through filter.
    pub fn new() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Configures a low-pass response. `frequency` is clamped below Nyquist.
    pub fn set_lowpass(&mut self, frequency: f32, q: f32, sample_rate: f32) {
        let frequency = frequency.clamp(10.0, sample_rate * 0.49);
        let omega = 2.0 * PI * frequency / sample_rate;
        let cos_omega = cosf(omega);
        let alpha = sinf(omega) / (2.0 * q.max(0.01));

        let a0_inv = 1.0 / (1.0 + alpha);
        self.b0 = (1.0 - cos_omega) * 0.5 * a0_inv;
        self.b1 = (1.0 - cos_omega) * a0_inv;
        self.b2 = self.b0;
        self.a1 = -2.0 * cos_omega * a0_inv;
        self.a2 = (1.0 - alpha) * a0_inv;
    }

    /// Filters one sample.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = crate::flush_denormal(output);
        self.y1
    }

    /// Clears the delay state, keeping coefficients.
    pub fn clear(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_by_default() {
        let mut filter = Biquad::new();
        assert_eq!(filter.process(0.5), 0.5);
    }

    #[test]
    fn test_lowpass_dc_gain_is_unity() {
        let mut filter = Biquad::new();
        filter.set_lowpass(1000.0, 0.707, 48000.0);
        let mut out = 0.0;
        for _ in 0..10000 {
            out = filter.process(1.0);
        }
        assert!((out - 1.0).abs() < 1e-3, "Expected DC gain 1, got {out}");
    }

    #[test]
    fn test_lowpass_attenuates_nyquist() {
        let mut filter = Biquad::new();
        filter.set_lowpass(500.0, 0.707, 48000.0);
        let mut peak = 0.0_f32;
        for i in 0..4800 {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            let y = filter.process(x);
            if i > 1000 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.01, "Expected Nyquist to be attenuated, got {peak}");
    }
}
