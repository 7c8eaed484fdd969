//! Pitch to frequency mapping.

use libm::{exp2f, log2f};

/// Equal-tempered tuning anchored at a reference pitch.
///
/// Pitches are fractional MIDI note numbers, so pitch bend and detune are
/// simply added to the note before conversion.
///
/// # Example
///
/// ```rust
/// use polyvox_core::Tuning;
///
/// let tuning = Tuning::default();
/// assert!((tuning.pitch_to_freq(69.0) - 440.0).abs() < 1e-3);
/// assert!((tuning.pitch_to_freq(81.0) - 880.0).abs() < 1e-2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    /// Pitch that sounds at `reference_freq`.
    pub reference_pitch: f32,
    /// Frequency of `reference_pitch` in Hz.
    pub reference_freq: f32,
    /// Steps per octave.
    pub tones_per_octave: f32,
}

impl Tuning {
    /// Twelve-tone equal temperament with the given A4 frequency.
    pub fn equal_tempered(a4: f32) -> Self {
        Self {
            reference_pitch: 69.0,
            reference_freq: a4,
            tones_per_octave: 12.0,
        }
    }

    /// Frequency in Hz of a (fractional) pitch.
    #[inline]
    pub fn pitch_to_freq(&self, pitch: f32) -> f32 {
        self.reference_freq * exp2f((pitch - self.reference_pitch) / self.tones_per_octave)
    }

    /// Pitch of a frequency in Hz. Non-positive frequencies map to the
    /// lowest representable pitch.
    #[inline]
    pub fn freq_to_pitch(&self, freq: f32) -> f32 {
        if freq <= 0.0 {
            return f32::MIN;
        }
        self.reference_pitch + self.tones_per_octave * log2f(freq / self.reference_freq)
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self::equal_tempered(440.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middle_c() {
        let freq = Tuning::default().pitch_to_freq(60.0);
        assert!((freq - 261.626).abs() < 0.01, "Expected ~261.63 Hz, got {freq}");
    }

    #[test]
    fn test_freq_to_pitch_inverse() {
        let tuning = Tuning::equal_tempered(432.0);
        for pitch in [21.0, 48.5, 60.0, 100.25] {
            let back = tuning.freq_to_pitch(tuning.pitch_to_freq(pitch));
            assert!((back - pitch).abs() < 1e-3, "Expected {pitch}, got {back}");
        }
    }
}
