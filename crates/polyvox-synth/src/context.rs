//! Explicit render context handed to voices.
//!
//! Everything a voice needs to know about the world (sample rate, tuning,
//! oversampling, optional external input, the owner's control hook) arrives
//! through these structs. There is no process-wide state.

use polyvox_core::{ChannelBuffer, MAX_CHANNELS, Tuning};

/// Fixed sizes decided when an engine is built.
///
/// Voices size their work buffers from this in [`crate::MidiVoice::create`],
/// which is the only place they may allocate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSetup {
    /// Output sample rate in Hz.
    pub sample_rate: f32,
    /// Typical largest block [`crate::PolyphonyMgr::process`] is asked for.
    /// Oversampled voices render longer blocks in chunks of this size.
    pub max_block_size: usize,
    /// Largest oversampling factor that may be requested.
    pub max_oversampling: usize,
    /// Output channels, `1..=MAX_CHANNELS`.
    pub num_channels: usize,
}

impl EngineSetup {
    /// Setup for `sample_rate` and `max_block_size` without oversampling.
    pub fn new(sample_rate: f32, max_block_size: usize) -> Self {
        Self {
            sample_rate,
            max_block_size,
            max_oversampling: 1,
            num_channels: MAX_CHANNELS,
        }
    }

    /// Sets the output channel count, clamped to `1..=MAX_CHANNELS`.
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.num_channels = channels.clamp(1, MAX_CHANNELS);
        self
    }

    /// Allows oversampling up to `factor` (rounded down to a power of two).
    pub fn with_max_oversampling(mut self, factor: usize) -> Self {
        self.max_oversampling = floor_power_of_two(factor);
        self
    }

    /// Samples a voice work buffer must hold for the worst case.
    pub fn work_buffer_len(&self) -> usize {
        self.max_block_size.max(crate::polyphony::VOICE_FADE_SAMPLES) * self.max_oversampling
    }
}

impl Default for EngineSetup {
    fn default() -> Self {
        Self::new(48000.0, 512)
    }
}

/// Callback into the owner, invoked by voices once per control update.
///
/// Owners use this to recompute control-rate values (sliders, LFOs) at a
/// given sample offset of the current block before the voice reads its
/// parameters.
pub trait ControlHook: Send + Sync {
    /// Recompute controls for `sample_offset` within the current block.
    fn compute_controls(&self, sample_offset: usize);
}

/// Per-block information passed to [`crate::MidiVoice::process`].
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    /// Output sample rate in Hz.
    pub sample_rate: f32,
    /// Pitch mapping.
    pub tuning: &'a Tuning,
    /// Oversampling factor for this block (a power of two).
    pub oversampling: usize,
    /// External audio for voices that process an input.
    pub input: Option<&'a ChannelBuffer>,
    /// Owner callback for control-rate updates.
    pub control_hook: Option<&'a dyn ControlHook>,
}

impl<'a> RenderContext<'a> {
    /// Context with no input, no hook and no oversampling.
    pub fn new(sample_rate: f32, tuning: &'a Tuning) -> Self {
        Self {
            sample_rate,
            tuning,
            oversampling: 1,
            input: None,
            control_hook: None,
        }
    }

    /// Milliseconds per output sample.
    #[inline]
    pub fn ms_per_sample(&self) -> f64 {
        1000.0 / f64::from(self.sample_rate)
    }

    /// Runs the owner hook, if any.
    #[inline]
    pub fn compute_controls(&self, sample_offset: usize) {
        if let Some(hook) = self.control_hook {
            hook.compute_controls(sample_offset);
        }
    }

    /// Copy of this context with another oversampling factor.
    pub fn with_oversampling(self, oversampling: usize) -> Self {
        Self {
            oversampling: oversampling.max(1),
            ..self
        }
    }

    /// Copy of this context reading external audio from `input`.
    pub fn with_input(self, input: &'a ChannelBuffer) -> Self {
        Self {
            input: Some(input),
            ..self
        }
    }

    /// Copy of this context calling `hook` for control updates.
    pub fn with_control_hook(self, hook: &'a dyn ControlHook) -> Self {
        Self {
            control_hook: Some(hook),
            ..self
        }
    }
}

impl core::fmt::Debug for RenderContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RenderContext")
            .field("sample_rate", &self.sample_rate)
            .field("tuning", self.tuning)
            .field("oversampling", &self.oversampling)
            .field("has_input", &self.input.is_some())
            .field("has_control_hook", &self.control_hook.is_some())
            .finish()
    }
}

/// Largest power of two not above `n` (1 for 0).
pub(crate) fn floor_power_of_two(n: usize) -> usize {
    if n <= 1 {
        1
    } else {
        1 << (usize::BITS - 1 - n.leading_zeros())
    }
}
