//! Small numeric helpers shared by envelopes, voices and the mixer.
//!
//! Every function here is allocation-free and `no_std` friendly.
//!
//! # Utilities
//!
//! - [`lerp`] / [`clamp`] - Interpolation and limiting
//! - [`curve_ease`] - Endpoint-preserving easing used by envelope stages
//! - [`pan_gains`] - Constant-power pan law
//! - [`flush_denormal`] - Denormal protection for feedback paths
//! - [`wrap_phase`] - Phase wraparound with non-finite recovery

use libm::{exp2f, powf, sincosf};

/// Linear interpolation between two values.
///
/// # Example
/// ```rust
/// use polyvox_core::lerp;
///
/// assert_eq!(lerp(0.0, 10.0, 0.25), 2.5);
/// ```
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Clamp a value to a range.
#[inline]
pub fn clamp(x: f32, min: f32, max: f32) -> f32 {
    x.clamp(min, max)
}

/// Bends a normalized position `t` in `[0, 1]` by `curve`.
///
/// `curve == 0` is linear. Positive values make the output rise late
/// (slow start), negative values make it rise early (fast start).
/// The endpoints are always preserved: `f(0) = 0`, `f(1) = 1`, and the
/// result is monotonic in `t` for any finite `curve`.
///
/// The exponent is `2^(-3 * curve)`, so `curve = 1` is roughly a cubic
/// and `curve = -1` roughly a cube root.
///
/// # Example
/// ```rust
/// use polyvox_core::curve_ease;
///
/// assert_eq!(curve_ease(0.5, 0.0), 0.5);
/// assert!(curve_ease(0.5, 1.0) < 0.5);
/// assert!(curve_ease(0.5, -1.0) > 0.5);
/// assert_eq!(curve_ease(1.0, 0.7), 1.0);
/// ```
#[inline]
pub fn curve_ease(t: f32, curve: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if curve == 0.0 || t == 0.0 || t == 1.0 {
        return t;
    }
    powf(t, exp2f(-3.0 * curve))
}

/// Constant-power pan law.
///
/// `pan` ranges from -1 (hard left) to 1 (hard right); values outside are
/// clamped. Returns `(left_gain, right_gain)`, both 0.707 at center.
///
/// # Example
/// ```rust
/// use polyvox_core::pan_gains;
///
/// let (l, r) = pan_gains(0.0);
/// assert!((l - r).abs() < 1e-6);
/// let (l, r) = pan_gains(-1.0);
/// assert!(l > 0.99 && r < 1e-6);
/// ```
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * core::f32::consts::FRAC_PI_4;
    let (sin, cos) = sincosf(angle);
    (cos.max(0.0), sin.max(0.0))
}

/// Flush denormal (subnormal) floats to zero.
///
/// Values with absolute magnitude below 1e-20 are replaced with 0.0.
/// Use this in feedback paths (delay loops, one-pole smoothers) where a
/// decaying signal would otherwise sit in the subnormal range and stall
/// the FPU on some architectures.
#[inline]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < 1e-20 { 0.0 } else { x }
}

/// Wraps `phase` into `[0, period)`.
///
/// Returns `None` when the phase is not finite so the caller can reset
/// the accumulator and report it.
#[inline]
pub fn wrap_phase(phase: f32, period: f32) -> Option<f32> {
    if !phase.is_finite() {
        return None;
    }
    let mut p = phase;
    if p >= period || p < 0.0 {
        p -= period * libm::floorf(p / period);
        // rounding can land exactly on the period
        if p >= period {
            p = 0.0;
        }
    }
    Some(p)
}
