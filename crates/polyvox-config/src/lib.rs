//! Voice presets for the polyvox synthesis engine.
//!
//! A preset names one voice type, its parameters and envelopes, and the
//! voice pool settings, stored as TOML. This crate parses, validates and
//! saves presets and turns them into parameter blocks for `polyvox-synth`.
//!
//! # Features
//!
//! - **Presets**: [`VoicePreset`] load/save in TOML
//! - **Envelopes**: ADSR or explicit stage lists via [`EnvelopeConfig`]
//! - **Validation**: range checks that report every problem at once
//! - **Paths**: platform preset directories (`std` feature)
//! - **Factory Presets**: built-in starting points for each voice type
//!
//! # Example
//!
//! ```rust
//! use polyvox_config::{EnvelopeConfig, OscillatorConfig, VoiceConfig, VoicePreset};
//! use polyvox_synth::{EngineSetup, OscillatorVoice, PolyphonyMgr, Waveform};
//!
//! let preset = VoicePreset::new(
//!     "Bright Keys",
//!     VoiceConfig::Oscillator(OscillatorConfig {
//!         waveform: Waveform::Saw,
//!         envelope: EnvelopeConfig::adsr(2.0, 300.0, 0.5, 200.0),
//!         ..OscillatorConfig::default()
//!     }),
//! );
//! preset.validate().unwrap();
//!
//! let VoiceConfig::Oscillator(osc) = &preset.voice else { unreachable!() };
//! let mut mgr: PolyphonyMgr<OscillatorVoice, 8> =
//!     PolyphonyMgr::new(&EngineSetup::default(), osc.to_params().unwrap());
//! preset.polyphony.apply(&mut mgr);
//! ```

mod envelope;
mod error;
mod polyphony;
mod preset;
mod voice;

/// Platform-specific paths for presets.
#[cfg(feature = "std")]
pub mod paths;

/// Preset validation.
pub mod validation;

/// Factory presets bundled with the library.
pub mod factory_presets;

pub use envelope::{EnvelopeConfig, StageConfig};
pub use error::{ConfigError, Result};
pub use factory_presets::{
    FACTORY_PRESET_NAMES, factory_preset_names, factory_presets, get_factory_preset,
    is_factory_preset,
};
#[cfg(feature = "std")]
pub use paths::{
    ensure_user_config_dir, ensure_user_presets_dir, find_preset, list_all_presets,
    list_presets_in_dir, list_system_presets, list_user_presets, preset_name_from_path,
    resolve_preset, system_presets_dir, user_config_dir, user_presets_dir,
};
pub use polyphony::PolyphonyConfig;
pub use preset::VoicePreset;
pub use validation::{
    MAX_OVERSAMPLING, MAX_STAGE_MS, MAX_VOICE_LIMIT, ValidationError, ValidationResult,
    validate_envelope, validate_polyphony, validate_preset, validate_range, validate_voice,
};
pub use voice::{FmConfig, KarplusConfig, OscillatorConfig, PadConfig, SamplerConfig, VoiceConfig};
