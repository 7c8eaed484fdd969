//! The voice contract and its implementations.
//!
//! A voice plays exactly one note at a time. [`crate::PolyphonyMgr`] owns a
//! fixed pool of them and drives every one through the [`MidiVoice`]
//! lifecycle:
//!
//! ```text
//! clear_voice -> set_pitch / set_modulators -> start -> set_pan
//!     -> process ... -> stop -> process ... (until is_done)
//! ```
//!
//! Each voice type names its parameter struct through
//! [`MidiVoice::Params`], so pairing a voice with the wrong parameters is a
//! compile error. Parameters are shared read-only between all voices of a
//! pool via `Arc`.

mod fm;
mod karplus_strong;
mod oscillator;
mod pad_synth;
mod sample;

pub use fm::{FmVoice, FmVoiceParams};
pub use karplus_strong::{ExciterSource, KarplusStrongVoice, KarplusStrongVoiceParams};
pub use oscillator::{OscillatorVoice, OscillatorVoiceParams, SyncMode, MAX_UNISON};
pub use pad_synth::{
    MAX_PAD_HARMONICS, MAX_PAD_UNDERSAMPLE, PAD_TABLE_SIZE, PadAmplitude, PadSynthVoice,
    PadSynthVoiceParams,
};
pub use sample::{DEFAULT_ROOT_PITCH, SampleVoice, SampleVoiceParams};

use std::sync::Arc;

use polyvox_core::{ChannelBuffer, lerp};

use crate::context::{EngineSetup, RenderContext};
use crate::modulation::Modulation;

/// Pitch, pan and modulation shared by every voice type.
#[derive(Debug, Clone, Default)]
pub struct VoiceState {
    /// Base pitch (fractional MIDI note).
    pub pitch: f32,
    /// Stereo position, -1 to 1.
    pub pan: f32,
    /// Per-note modulation curves.
    pub modulation: Modulation,
}

impl VoiceState {
    /// Pitch including bend at `sample_offset`.
    #[inline]
    pub fn pitch_at(&self, sample_offset: usize) -> f32 {
        self.pitch + self.modulation.pitch_bend_at(sample_offset)
    }

    /// Mod wheel at `sample_offset`.
    #[inline]
    pub fn mod_wheel_at(&self, sample_offset: usize) -> f32 {
        self.modulation.mod_wheel_at(sample_offset)
    }

    /// Pressure at `sample_offset`.
    #[inline]
    pub fn pressure_at(&self, sample_offset: usize) -> f32 {
        self.modulation.pressure_at(sample_offset)
    }
}

/// A sound generator for one note.
///
/// Implementations must not allocate outside [`MidiVoice::create`].
pub trait MidiVoice: Send {
    /// Timbre parameters shared by all voices of a pool.
    type Params: Default + Send + Sync + 'static;

    /// Builds the voice for pool slot `slot`, allocating any buffers it will
    /// ever need.
    fn create(setup: &EngineSetup, slot: usize) -> Self
    where
        Self: Sized;

    /// Shared pitch, pan and modulation state.
    fn voice_state(&self) -> &VoiceState;

    /// Mutable shared state.
    fn voice_state_mut(&mut self) -> &mut VoiceState;

    /// Begins a note at `time` with velocity-derived `amount` in `0..=1`.
    fn start(&mut self, time: f64, amount: f32);

    /// Begins the release at `time`. Output continues until [`MidiVoice::is_done`].
    fn stop(&mut self, time: f64);

    /// Resets envelopes, phases and buffers without a fade.
    fn clear_voice(&mut self);

    /// Adds `out.buffer_size()` samples starting at `time` into `out`.
    ///
    /// Returns `false` when the voice had nothing to contribute.
    fn process(&mut self, time: f64, out: &mut ChannelBuffer, ctx: &RenderContext<'_>) -> bool;

    /// Replaces the shared parameters.
    fn set_voice_params(&mut self, params: Arc<Self::Params>);

    /// True once every contributing envelope has decayed.
    fn is_done(&self, time: f64) -> bool;

    /// Sets the base pitch.
    fn set_pitch(&mut self, pitch: f32) {
        self.voice_state_mut().pitch = pitch;
    }

    /// Base pitch.
    fn pitch(&self) -> f32 {
        self.voice_state().pitch
    }

    /// Sets the stereo position.
    fn set_pan(&mut self, pan: f32) {
        self.voice_state_mut().pan = pan.clamp(-1.0, 1.0);
    }

    /// Stereo position.
    fn pan(&self) -> f32 {
        self.voice_state().pan
    }

    /// Attaches per-note modulation.
    fn set_modulators(&mut self, modulation: Modulation) {
        self.voice_state_mut().modulation = modulation;
    }
}

/// Envelope time scale for a velocity.
///
/// Positive `vel_to_envelope` makes soft notes faster (scale down to
/// `1 - vel_to_envelope`); negative values make loud notes faster.
pub fn velocity_envelope_scale(velocity: f32, vel_to_envelope: f32) -> f32 {
    if vel_to_envelope >= 0.0 {
        lerp((1.0 - vel_to_envelope).clamp(0.0, 1.0), 1.0, velocity)
    } else {
        lerp(1.0, 1.0 + vel_to_envelope, velocity).clamp(0.001, 1.0)
    }
}

/// Envelope curve offset for a velocity-to-envelope amount outside `-1..=1`.
pub fn velocity_envelope_curve(_velocity: f32, vel_to_envelope: f32) -> f32 {
    if vel_to_envelope < -1.0 {
        -(vel_to_envelope + 1.0) * 0.25
    } else if vel_to_envelope > 1.0 {
        -(vel_to_envelope - 1.0) * 0.25
    } else {
        0.0
    }
}

/// Output level for a velocity.
///
/// `vel_to_volume` of 0 ignores velocity, 1 maps it linearly, and values
/// above 1 apply a power curve that also lets loud notes exceed unity.
pub fn velocity_volume(velocity: f32, vel_to_volume: f32) -> f32 {
    let velocity = if vel_to_volume > 1.0 {
        libm::powf(velocity, vel_to_volume)
    } else {
        velocity
    };
    lerp((1.0 - vel_to_volume).max(0.0), vel_to_volume.max(1.0), velocity)
}

/// Seed for per-slot noise so each voice sounds different but runs repeat.
pub(crate) fn slot_seed(slot: usize, salt: u32) -> u32 {
    (slot as u32).wrapping_mul(0x9E37_79B9) ^ salt
}

/// Runs `render` at the context's oversampling factor.
///
/// `render` receives the buffer to add into, the oversampling factor and the
/// output sample its buffer starts at. With no oversampling it writes
/// straight into `out` from sample 0. Otherwise the block is rendered in
/// chunks of at most `work.capacity() / oversampling` output samples, each
/// decimated and added into `out` at its offset, so blocks longer than the
/// setup's maximum block size still render in full.
pub(crate) fn render_oversampled<F>(
    work: &mut ChannelBuffer,
    out: &mut ChannelBuffer,
    ctx: &RenderContext<'_>,
    mut render: F,
) -> bool
where
    F: FnMut(&mut ChannelBuffer, usize, usize) -> bool,
{
    let oversampling = ctx.oversampling.max(1);
    if oversampling == 1 {
        return render(out, 1, 0);
    }
    let chunk = work.capacity() / oversampling;
    if chunk == 0 {
        return false;
    }
    work.set_num_active_channels(out.num_active_channels());
    let mut produced = false;
    let mut start = 0;
    while start < out.buffer_size() {
        let len = chunk.min(out.buffer_size() - start);
        work.set_buffer_size(len * oversampling);
        work.clear();
        if render(work, oversampling, start) {
            work.downsample_add_into_at(out, oversampling, start);
            produced = true;
        }
        start += len;
    }
    produced
}
