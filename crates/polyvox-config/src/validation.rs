//! Preset validation.
//!
//! Checks that every numeric field of a preset is inside the range the
//! synth handles sensibly, that explicit envelopes are well formed and that
//! the pool settings are usable. Validation reports every problem it finds,
//! not just the first.
//!
//! # Example
//!
//! ```rust
//! use polyvox_config::{EnvelopeConfig, ValidationError, validate_envelope};
//!
//! let env = EnvelopeConfig::adsr(5.0, 50.0, 1.5, 100.0);
//! let err = validate_envelope(&env, "envelope").unwrap_err();
//! assert!(matches!(err, ValidationError::OutOfRange { .. }));
//! ```

use polyvox_synth::{MAX_ADSR_STAGES, MAX_PAD_HARMONICS, MAX_PAD_UNDERSAMPLE, MAX_UNISON, SyncMode};
use thiserror::Error;

use crate::envelope::EnvelopeConfig;
use crate::polyphony::PolyphonyConfig;
use crate::preset::VoicePreset;
use crate::voice::{FmConfig, KarplusConfig, OscillatorConfig, PadConfig, SamplerConfig, VoiceConfig};

/// Longest stage or hold time accepted, in ms.
pub const MAX_STAGE_MS: f32 = 60_000.0;

/// Largest voice limit a preset may ask for.
pub const MAX_VOICE_LIMIT: usize = 256;

/// Largest oversampling factor a preset may ask for.
pub const MAX_OVERSAMPLING: usize = 8;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Parameter value out of range.
    #[error("parameter '{param}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Name of the parameter.
        param: String,
        /// The value that was out of range.
        value: f32,
        /// Minimum allowed value.
        min: f32,
        /// Maximum allowed value.
        max: f32,
    },

    /// Parameter is not a power of two.
    #[error("parameter '{param}' value {value} is not a power of two")]
    NotPowerOfTwo {
        /// Name of the parameter.
        param: String,
        /// The offending value.
        value: usize,
    },

    /// Explicit stage list is longer than an envelope holds.
    #[error("{count} envelope stages, at most {max} allowed")]
    TooManyStages {
        /// Stages given.
        count: usize,
        /// Stages supported.
        max: usize,
    },

    /// Explicit stage list with a sustain stage but no stages.
    #[error("envelope has a sustain stage but no stages")]
    EmptyStages,

    /// Sustain index past the end of the stage list.
    #[error("sustain stage {index} out of range for {count} stages")]
    SustainStageOutOfRange {
        /// Requested sustain stage.
        index: usize,
        /// Stages given.
        count: usize,
    },

    /// Preset without a name.
    #[error("preset name is empty")]
    EmptyName,

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Accumulates errors so a single pass reports all of them.
#[derive(Default)]
struct Report {
    errors: Vec<ValidationError>,
}

impl Report {
    fn range(&mut self, param: &str, value: f32, min: f32, max: f32) {
        if let Err(e) = validate_range(param, value, min, max) {
            self.errors.push(e);
        }
    }

    fn merge(&mut self, result: ValidationResult<()>) {
        match result {
            Ok(()) => {}
            Err(ValidationError::Multiple(errors)) => self.errors.extend(errors),
            Err(e) => self.errors.push(e),
        }
    }

    fn finish(mut self) -> ValidationResult<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(ValidationError::Multiple(self.errors)),
        }
    }
}

/// Checks `min <= value <= max`. NaN is always out of range.
pub fn validate_range(param: &str, value: f32, min: f32, max: f32) -> ValidationResult<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            param: param.to_string(),
            value,
            min,
            max,
        })
    }
}

/// Validates an envelope section. `context` prefixes parameter names in
/// the errors.
pub fn validate_envelope(env: &EnvelopeConfig, context: &str) -> ValidationResult<()> {
    let mut report = Report::default();
    let name = |field: &str| format!("{context}.{field}");

    if env.is_explicit() {
        let count = env.stages.len();
        if count > MAX_ADSR_STAGES {
            report.errors.push(ValidationError::TooManyStages {
                count,
                max: MAX_ADSR_STAGES,
            });
        }
        for (i, stage) in env.stages.iter().enumerate() {
            report.range(&name(&format!("stages[{i}].target")), stage.target, 0.0, 1.0);
            report.range(&name(&format!("stages[{i}].time")), stage.time, 0.0, MAX_STAGE_MS);
            report.range(&name(&format!("stages[{i}].curve")), stage.curve, -2.0, 2.0);
        }
        if let Some(index) = env.sustain_stage
            && index >= count
        {
            report.errors.push(ValidationError::SustainStageOutOfRange { index, count });
        }
    } else {
        if env.sustain_stage.is_some() {
            report.errors.push(ValidationError::EmptyStages);
        }
        report.range(&name("attack"), env.attack, 0.0, MAX_STAGE_MS);
        report.range(&name("decay"), env.decay, 0.0, MAX_STAGE_MS);
        report.range(&name("sustain"), env.sustain, 0.0, 1.0);
        report.range(&name("release"), env.release, 0.0, MAX_STAGE_MS);
    }

    if let Some(hold) = env.hold {
        report.range(&name("hold"), hold, 0.0, MAX_STAGE_MS);
    }
    report.range(&name("time_scale"), env.time_scale, 0.01, 100.0);
    report.finish()
}

fn check_oscillator(osc: &OscillatorConfig, report: &mut Report) {
    report.merge(validate_envelope(&osc.envelope, "envelope"));
    report.merge(validate_envelope(&osc.filter_envelope, "filter_envelope"));
    if let Some(max) = osc.filter_cutoff_max {
        report.range("filter_cutoff_max", max, 10.0, 20_000.0);
    }
    report.range("filter_cutoff_min", osc.filter_cutoff_min, 10.0, 20_000.0);
    report.range("filter_q", osc.filter_q, 0.1, 20.0);
    report.range("vol", osc.vol, 0.0, 1.0);
    report.range("pulse_width", osc.pulse_width, 0.01, 0.99);
    report.range("shuffle", osc.shuffle, 0.0, 1.0);
    report.range("soften", osc.soften, 0.0, 1.0);
    report.range("mult", osc.mult, 0.01, 16.0);
    report.range("detune", osc.detune, 0.0, 12.0);
    report.range("unison", osc.unison as f32, 1.0, MAX_UNISON as f32);
    report.range("unison_width", osc.unison_width, 0.0, 1.0);
    report.range("phase_offset", osc.phase_offset, 0.0, 1.0);
    match osc.sync {
        SyncMode::None => {}
        SyncMode::Frequency(hz) => report.range("sync.frequency", hz, 1.0, 20_000.0),
        SyncMode::Ratio(r) => report.range("sync.ratio", r, 0.01, 16.0),
    }
    report.range("vel_to_volume", osc.vel_to_volume, 0.0, 1.0);
    report.range("vel_to_envelope", osc.vel_to_envelope, -1.0, 1.0);
}

fn check_fm(fm: &FmConfig, report: &mut Report) {
    report.merge(validate_envelope(&fm.envelope, "envelope"));
    report.merge(validate_envelope(&fm.harm_envelope, "harm_envelope"));
    report.merge(validate_envelope(&fm.mod_index_envelope, "mod_index_envelope"));
    report.merge(validate_envelope(&fm.harm2_envelope, "harm2_envelope"));
    report.merge(validate_envelope(&fm.mod_index2_envelope, "mod_index2_envelope"));
    report.range("harm_ratio", fm.harm_ratio, 0.0, 32.0);
    report.range("mod_index", fm.mod_index, 0.0, 100.0);
    report.range("harm_ratio2", fm.harm_ratio2, 0.0, 32.0);
    report.range("mod_index2", fm.mod_index2, 0.0, 100.0);
    for (param, value) in [
        ("phase_offset0", fm.phase_offset0),
        ("phase_offset1", fm.phase_offset1),
        ("phase_offset2", fm.phase_offset2),
    ] {
        report.range(param, value, 0.0, 1.0);
    }
    report.range("vol", fm.vol, 0.0, 2.0);
}

fn check_karplus(ks: &KarplusConfig, report: &mut Report) {
    report.range("filter", ks.filter, 0.0, 10.0);
    report.range("feedback", ks.feedback, 0.0, 1.0);
    report.range("exciter_freq", ks.exciter_freq, 1.0, 20_000.0);
    report.range("exciter_attack", ks.exciter_attack, 0.0, 1000.0);
    report.range("exciter_decay", ks.exciter_decay, 0.0, 10_000.0);
    report.range("excitation", ks.excitation, 0.0, 1.0);
    report.range("pitch_tone", ks.pitch_tone, -4.0, 4.0);
    report.range("vel_to_volume", ks.vel_to_volume, 0.0, 1.0);
    report.range("vel_to_envelope", ks.vel_to_envelope, -1.0, 1.0);
}

fn check_sampler(sampler: &SamplerConfig, report: &mut Report) {
    report.merge(validate_envelope(&sampler.envelope, "envelope"));
    report.range("vol", sampler.vol, 0.0, 1.0);
    if let Some(freq) = sampler.detected_freq {
        report.range("detected_freq", freq, 1.0, 20_000.0);
    }
    report.range("root_pitch", sampler.root_pitch, 0.0, 127.0);
    report.range("vel_to_volume", sampler.vel_to_volume, 0.0, 1.0);
}

fn check_pad(pad: &PadConfig, report: &mut Report) {
    report.merge(validate_envelope(&pad.envelope, "envelope"));
    let bound = MAX_PAD_HARMONICS as f32;
    report.range("harmonics", pad.harmonics as f32, -bound, bound);
    report.range("bandwidth", pad.bandwidth, 0.1, 1200.0);
    report.range("bandwidth_scale", pad.bandwidth_scale, 0.0, 4.0);
    report.range("spread", pad.spread, 0.0, 1.0);
    report.range("channel_offset", pad.channel_offset, 0.0, 1.0);
    report.range("undersample", pad.undersample as f32, 0.0, MAX_PAD_UNDERSAMPLE as f32);
    report.range("vol", pad.vol, 0.0, 2.0);
    report.range("vel_to_volume", pad.vel_to_volume, 0.0, 1.0);
    report.range("vel_to_envelope", pad.vel_to_envelope, -1.0, 1.0);
}

/// Validates a voice section.
pub fn validate_voice(voice: &VoiceConfig) -> ValidationResult<()> {
    let mut report = Report::default();
    match voice {
        VoiceConfig::Oscillator(osc) => check_oscillator(osc, &mut report),
        VoiceConfig::Fm(fm) => check_fm(fm, &mut report),
        VoiceConfig::Karplus(ks) => check_karplus(ks, &mut report),
        VoiceConfig::Sampler(sampler) => check_sampler(sampler, &mut report),
        VoiceConfig::Pad(pad) => check_pad(pad, &mut report),
    }
    report.finish()
}

/// Validates pool settings.
pub fn validate_polyphony(poly: &PolyphonyConfig) -> ValidationResult<()> {
    let mut report = Report::default();
    report.range(
        "voice_limit",
        poly.voice_limit as f32,
        1.0,
        MAX_VOICE_LIMIT as f32,
    );
    if !poly.oversampling.is_power_of_two() {
        report.errors.push(ValidationError::NotPowerOfTwo {
            param: "oversampling".to_string(),
            value: poly.oversampling,
        });
    } else {
        report.range(
            "oversampling",
            poly.oversampling as f32,
            1.0,
            MAX_OVERSAMPLING as f32,
        );
    }
    report.finish()
}

/// Validates a whole preset.
pub fn validate_preset(preset: &VoicePreset) -> ValidationResult<()> {
    let mut report = Report::default();
    if preset.name.trim().is_empty() {
        report.errors.push(ValidationError::EmptyName);
    }
    report.merge(validate_voice(&preset.voice));
    report.merge(validate_polyphony(&preset.polyphony));
    report.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::StageConfig;

    #[test]
    fn test_range_bounds_inclusive() {
        assert!(validate_range("x", 0.0, 0.0, 1.0).is_ok());
        assert!(validate_range("x", 1.0, 0.0, 1.0).is_ok());
        assert!(validate_range("x", 1.0001, 0.0, 1.0).is_err());
        assert!(validate_range("x", f32::NAN, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_default_sections_are_valid() {
        for voice in [
            VoiceConfig::Oscillator(OscillatorConfig::default()),
            VoiceConfig::Fm(FmConfig::default()),
            VoiceConfig::Karplus(KarplusConfig::default()),
            VoiceConfig::Sampler(SamplerConfig::default()),
            VoiceConfig::Pad(PadConfig::default()),
        ] {
            assert!(validate_voice(&voice).is_ok(), "{} defaults invalid: {:?}", voice.kind(), validate_voice(&voice));
        }
        assert!(validate_polyphony(&PolyphonyConfig::default()).is_ok());
    }

    #[test]
    fn test_envelope_errors_carry_context() {
        let env = EnvelopeConfig::adsr(5.0, 5.0, 2.0, 5.0);
        let err = validate_envelope(&env, "filter_envelope").unwrap_err();
        assert!(
            matches!(err, ValidationError::OutOfRange { ref param, .. } if param == "filter_envelope.sustain"),
            "got {err:?}"
        );
    }

    #[test]
    fn test_too_many_stages() {
        let stage = StageConfig { target: 0.5, time: 1.0, curve: 0.0 };
        let env = EnvelopeConfig::default().with_stages(vec![stage; MAX_ADSR_STAGES + 1], Some(0));
        assert_eq!(
            validate_envelope(&env, "envelope"),
            Err(ValidationError::TooManyStages { count: MAX_ADSR_STAGES + 1, max: MAX_ADSR_STAGES })
        );
    }

    #[test]
    fn test_sustain_index_past_end() {
        let stage = StageConfig { target: 0.5, time: 1.0, curve: 0.0 };
        let env = EnvelopeConfig::default().with_stages([stage, stage], Some(2));
        assert_eq!(
            validate_envelope(&env, "envelope"),
            Err(ValidationError::SustainStageOutOfRange { index: 2, count: 2 })
        );
    }

    #[test]
    fn test_sustain_index_without_stages() {
        let mut env = EnvelopeConfig::default();
        env.sustain_stage = Some(1);
        assert_eq!(validate_envelope(&env, "envelope"), Err(ValidationError::EmptyStages));
    }

    #[test]
    fn test_oversampling_power_of_two() {
        let poly = PolyphonyConfig {
            oversampling: 3,
            ..PolyphonyConfig::default()
        };
        assert!(matches!(
            validate_polyphony(&poly),
            Err(ValidationError::NotPowerOfTwo { value: 3, .. })
        ));

        let poly = PolyphonyConfig {
            oversampling: 16,
            ..PolyphonyConfig::default()
        };
        assert!(matches!(validate_polyphony(&poly), Err(ValidationError::OutOfRange { .. })));
    }

    #[test]
    fn test_collects_every_error() {
        let preset = VoicePreset {
            name: " ".to_string(),
            description: None,
            voice: VoiceConfig::Oscillator(OscillatorConfig {
                vol: 3.0,
                unison: 0,
                ..OscillatorConfig::default()
            }),
            polyphony: PolyphonyConfig {
                voice_limit: 0,
                ..PolyphonyConfig::default()
            },
        };
        match validate_preset(&preset) {
            Err(ValidationError::Multiple(errors)) => {
                assert_eq!(errors.len(), 4, "got {errors:?}");
                assert!(errors.contains(&ValidationError::EmptyName));
            }
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_multiple_display_joins_messages() {
        let err = ValidationError::Multiple(vec![ValidationError::EmptyName, ValidationError::EmptyStages]);
        assert_eq!(
            err.to_string(),
            "multiple validation errors: preset name is empty; envelope has a sustain stage but no stages"
        );
    }
}
