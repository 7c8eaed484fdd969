//! Per-note modulation inputs.
//!
//! A note can carry its own pitch bend, mod wheel and pressure curves (MPE
//! style). Curves are shared with the control side through `Arc`, and read
//! per sample offset on the audio thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// A control signal sampled at an offset within the current block.
pub trait ModulationCurve: Send + Sync {
    /// Value at `sample_offset` samples into the block.
    fn value_at(&self, sample_offset: usize) -> f32;
}

/// Constant curve.
impl ModulationCurve for f32 {
    fn value_at(&self, _sample_offset: usize) -> f32 {
        *self
    }
}

/// A curve the control thread can move while the audio thread reads it.
///
/// The value is stored as `f32` bits in an atomic, so reads never block and
/// never tear.
///
/// # Example
///
/// ```rust
/// use polyvox_synth::{AtomicModulation, ModulationCurve};
///
/// let bend = AtomicModulation::new(0.0);
/// bend.set(2.0);
/// assert_eq!(bend.value_at(17), 2.0);
/// ```
#[derive(Debug, Default)]
pub struct AtomicModulation {
    bits: AtomicU32,
}

impl AtomicModulation {
    /// Creates the curve at `value`.
    pub fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    /// Moves the curve to `value`.
    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Current value.
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl ModulationCurve for AtomicModulation {
    fn value_at(&self, _sample_offset: usize) -> f32 {
        self.get()
    }
}

/// Modulation attached to a note-on.
///
/// Missing curves read as 0.
#[derive(Clone, Default)]
pub struct Modulation {
    /// Stereo position, -1 (left) to 1 (right).
    pub pan: f32,
    /// Pitch offset in semitones.
    pub pitch_bend: Option<Arc<dyn ModulationCurve>>,
    /// Mod wheel, nominally 0 to 1.
    pub mod_wheel: Option<Arc<dyn ModulationCurve>>,
    /// Channel or polyphonic pressure, nominally 0 to 1.
    pub pressure: Option<Arc<dyn ModulationCurve>>,
}

impl Modulation {
    /// Modulation with only a pan position.
    pub fn with_pan(pan: f32) -> Self {
        Self {
            pan,
            ..Self::default()
        }
    }

    /// True when any curve is attached.
    pub fn has_curves(&self) -> bool {
        self.pitch_bend.is_some() || self.mod_wheel.is_some() || self.pressure.is_some()
    }

    /// Pitch bend at `sample_offset`.
    #[inline]
    pub fn pitch_bend_at(&self, sample_offset: usize) -> f32 {
        read(self.pitch_bend.as_deref(), sample_offset)
    }

    /// Mod wheel at `sample_offset`.
    #[inline]
    pub fn mod_wheel_at(&self, sample_offset: usize) -> f32 {
        read(self.mod_wheel.as_deref(), sample_offset)
    }

    /// Pressure at `sample_offset`.
    #[inline]
    pub fn pressure_at(&self, sample_offset: usize) -> f32 {
        read(self.pressure.as_deref(), sample_offset)
    }
}

impl core::fmt::Debug for Modulation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Modulation")
            .field("pan", &self.pan)
            .field("pitch_bend", &self.pitch_bend_at(0))
            .field("mod_wheel", &self.mod_wheel_at(0))
            .field("pressure", &self.pressure_at(0))
            .finish()
    }
}

#[inline]
fn read(curve: Option<&dyn ModulationCurve>, sample_offset: usize) -> f32 {
    curve.map_or(0.0, |c| c.value_at(sample_offset))
}
