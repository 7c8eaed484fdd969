//! Phase-addressed oscillators for the voice implementations.
//!
//! Voices own their phase accumulators (several per note when unison or
//! sync is active), so an [`Oscillator`] here is a waveform shaper: given a
//! phase in cycles it returns a sample. [`EnvOscillator`] pairs one with its
//! own [`Adsr`] for the FM operators.

use core::f32::consts::PI;
use libm::{fabsf, sinf};
use polyvox_core::Xorshift32;

use crate::envelope::Adsr;

/// Oscillator waveform shapes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Waveform {
    /// Pure sine.
    #[default]
    Sine,
    /// Pulse wave; the duty cycle is [`Oscillator::set_pulse_width`].
    Square,
    /// Triangle.
    Triangle,
    /// Rising sawtooth.
    Saw,
    /// Falling sawtooth.
    NegSaw,
    /// White noise. The phase is ignored.
    Noise,
}

/// Waveform shaper evaluated at an explicit phase.
///
/// # Example
///
/// ```rust
/// use polyvox_synth::{Oscillator, Waveform};
///
/// let mut osc = Oscillator::new(Waveform::Sine);
/// assert!((osc.value(0.25, 0.01) - 1.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    pulse_width: f32,
    shuffle: f32,
    soften: f32,
    noise: Xorshift32,
}

impl Oscillator {
    /// Creates an oscillator with a 50% pulse width and no shuffle or soften.
    pub fn new(waveform: Waveform) -> Self {
        Self {
            waveform,
            pulse_width: 0.5,
            shuffle: 0.0,
            soften: 0.0,
            noise: Xorshift32::new(0x1234_5678),
        }
    }

    /// Current waveform.
    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Sets the waveform.
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    /// Sets the pulse duty cycle, clamped to `0.01..=0.99`.
    pub fn set_pulse_width(&mut self, width: f32) {
        self.pulse_width = width.clamp(0.01, 0.99);
    }

    /// Sets the shuffle amount in `0..=1`.
    ///
    /// Shuffle treats two cycles as one period and lengthens the first at
    /// the expense of the second, like swing applied to the waveform.
    pub fn set_shuffle(&mut self, shuffle: f32) {
        self.shuffle = shuffle.clamp(0.0, 1.0);
    }

    /// Current shuffle amount.
    pub fn shuffle(&self) -> f32 {
        self.shuffle
    }

    /// Sets how much the saw and pulse edges are rounded, in `0..=1`.
    pub fn set_soften(&mut self, soften: f32) {
        self.soften = soften.clamp(0.0, 1.0);
    }

    /// Reseeds the noise generator.
    pub fn seed_noise(&mut self, seed: u32) {
        self.noise = Xorshift32::new(seed);
    }

    /// Sample at `phase` (in cycles, any value; wrapped to the two-cycle
    /// shuffle period). `dt` is the phase increment per sample and sets the
    /// width of the edge correction.
    #[inline]
    pub fn value(&mut self, phase: f32, dt: f32) -> f32 {
        let p = phase - 2.0 * libm::floorf(phase * 0.5);
        let boundary = 1.0 + self.shuffle * 0.5;
        let (local, dt) = if p < boundary {
            (p / boundary, dt / boundary)
        } else {
            let rest = 2.0 - boundary;
            ((p - boundary) / rest, dt / rest)
        };
        self.shape(local.clamp(0.0, 1.0 - f32::EPSILON), dt)
    }

    #[inline]
    fn shape(&mut self, t: f32, dt: f32) -> f32 {
        let window = (fabsf(dt) + self.soften * 0.2).min(0.24);
        match self.waveform {
            Waveform::Sine => sinf(t * 2.0 * PI),
            Waveform::Saw => 2.0 * t - 1.0 - poly_blep(t, window),
            Waveform::NegSaw => 1.0 - 2.0 * t + poly_blep(t, window),
            Waveform::Square => {
                let duty = self.pulse_width;
                let naive = if t < duty { 1.0 } else { -1.0 };
                let falling = t - duty + if t < duty { 1.0 } else { 0.0 };
                naive + poly_blep(t, window) - poly_blep(falling, window)
            }
            Waveform::Triangle => 1.0 - 4.0 * fabsf(t - 0.5),
            Waveform::Noise => self.noise.next_bipolar(),
        }
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new(Waveform::Sine)
    }
}

/// 4th-order PolyBLEP (Polynomial Band-Limited Step) correction.
///
/// A C²-continuous piecewise polynomial spanning two samples on each side
/// of the discontinuity. Returns 0 away from the edge or when `dt` is not
/// positive.
#[inline]
fn poly_blep(t: f32, dt: f32) -> f32 {
    const A4: f32 = -43.0 / 48.0;
    const A3: f32 = 7.0 / 6.0;
    const A2: f32 = 0.5;
    const A0: f32 = -1.0;
    const C: f32 = -11.0 / 48.0;

    if dt <= 0.0 {
        return 0.0;
    }
    let dt2 = 2.0 * dt;
    let residual = |n: f32| {
        if n < 1.0 {
            let n2 = n * n;
            A4 * n2 * n2 + A3 * n2 * n + A2 * n2 + A0
        } else {
            let u = 2.0 - n;
            let u2 = u * u;
            C * u2 * u2
        }
    };
    if t < dt2 {
        residual(t / dt)
    } else if t > 1.0 - dt2 {
        -residual((1.0 - t) / dt)
    } else {
        0.0
    }
}

/// An oscillator with its own envelope.
#[derive(Debug, Clone, Default)]
pub struct EnvOscillator {
    /// Waveform shaper.
    pub osc: Oscillator,
    /// Amplitude envelope.
    pub adsr: Adsr,
}

impl EnvOscillator {
    /// Creates an enveloped oscillator with the default envelope.
    pub fn new(waveform: Waveform) -> Self {
        Self {
            osc: Oscillator::new(waveform),
            adsr: Adsr::default(),
        }
    }

    /// Enveloped sample at `time` and `phase`.
    #[inline]
    pub fn audio(&mut self, time: f64, phase: f32, dt: f32) -> f32 {
        let level = self.adsr.value(time);
        if level == 0.0 {
            return 0.0;
        }
        self.osc.value(phase, dt) * level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(osc: &mut Oscillator, freq: f32, n: usize) -> Vec<f32> {
        let dt = freq / 48000.0;
        (0..n).map(|i| osc.value(i as f32 * dt, dt)).collect()
    }

    #[test]
    fn test_sine_zero_crossings() {
        let mut osc = Oscillator::new(Waveform::Sine);
        let samples = render(&mut osc, 440.0, 48000);
        let crossings = samples.windows(2).filter(|w| w[0] <= 0.0 && w[1] > 0.0).count() as i32;
        assert!((crossings - 440).abs() <= 2, "Expected ~440 zero crossings, got {crossings}");
    }

    #[test]
    fn test_waveform_ranges() {
        for waveform in [
            Waveform::Sine,
            Waveform::Square,
            Waveform::Triangle,
            Waveform::Saw,
            Waveform::NegSaw,
            Waveform::Noise,
        ] {
            let mut osc = Oscillator::new(waveform);
            for s in render(&mut osc, 1000.0, 4800) {
                assert!(s.abs() <= 1.1, "{waveform:?} out of range: {s}");
            }
        }
    }

    #[test]
    fn test_pulse_width_sets_duty() {
        let mut osc = Oscillator::new(Waveform::Square);
        osc.set_pulse_width(0.25);
        let samples = render(&mut osc, 100.0, 48000);
        let high = samples.iter().filter(|&&s| s > 0.0).count() as f32 / samples.len() as f32;
        assert!((high - 0.25).abs() < 0.02, "Expected 25% duty, got {high}");
    }

    #[test]
    fn test_shuffle_stretches_first_cycle() {
        let mut plain = Oscillator::new(Waveform::Saw);
        let mut shuffled = Oscillator::new(Waveform::Saw);
        shuffled.set_shuffle(1.0);
        // halfway through the first cycle the shuffled saw is still lower
        assert!(shuffled.value(0.5, 0.0) < plain.value(0.5, 0.0));
        // both periods still wrap every two cycles
        assert!((shuffled.value(2.25, 0.0) - shuffled.value(0.25, 0.0)).abs() < 1e-5);
    }

    #[test]
    fn test_soften_rounds_edges() {
        let mut hard = Oscillator::new(Waveform::Saw);
        let mut soft = Oscillator::new(Waveform::Saw);
        soft.set_soften(1.0);
        let dt = 0.001;
        // near the wrap the softened saw has already started falling
        assert!(soft.value(0.95, dt) < hard.value(0.95, dt));
    }

    #[test]
    fn test_env_oscillator_follows_envelope() {
        let mut op = EnvOscillator::new(Waveform::Sine);
        op.adsr.set(10.0, 10.0, 0.5, 10.0);
        assert_eq!(op.audio(0.0, 0.25, 0.01), 0.0);
        op.adsr.start(0.0, 1.0);
        assert!((op.audio(10.0, 0.25, 0.01) - 1.0).abs() < 1e-4);
        assert!((op.audio(100.0, 0.25, 0.01) - 0.5).abs() < 1e-4);
    }
}
