//! Preset file format and operations.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, Result};
use crate::polyphony::PolyphonyConfig;
use crate::validation::{ValidationResult, validate_preset};
use crate::voice::VoiceConfig;

/// A playable instrument: one voice type with its parameters, plus the
/// voice pool settings.
///
/// # TOML Format
///
/// ```toml
/// name = "Soft Pluck"
/// description = "Short nylon-like string"
///
/// [voice]
/// type = "karplus"
/// feedback = 0.985
/// source = "noise"
///
/// [polyphony]
/// voice_limit = 8
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoicePreset {
    /// Name of the preset.
    pub name: String,

    /// Optional description of the preset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Voice type and parameters.
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Voice pool settings.
    #[serde(default)]
    pub polyphony: PolyphonyConfig,
}

impl VoicePreset {
    /// Create a preset with default pool settings.
    pub fn new(name: impl Into<String>, voice: VoiceConfig) -> Self {
        Self {
            name: name.into(),
            description: None,
            voice,
            polyphony: PolyphonyConfig::default(),
        }
    }

    /// Create a preset with a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the pool settings.
    pub fn with_polyphony(mut self, polyphony: PolyphonyConfig) -> Self {
        self.polyphony = polyphony;
        self
    }

    /// Load a preset from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load a preset from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the preset to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the preset to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_preset(self)
    }
}

impl Default for VoicePreset {
    fn default() -> Self {
        Self::new("Untitled", VoiceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeConfig;
    use crate::voice::{FmConfig, KarplusConfig, OscillatorConfig, PadConfig};
    use polyvox_synth::{ExciterSource, RetriggerPolicy, SyncMode, Waveform};

    #[test]
    fn test_preset_new() {
        let preset = VoicePreset::new("Test Preset", VoiceConfig::default());
        assert_eq!(preset.name, "Test Preset");
        assert!(preset.description.is_none());
        assert_eq!(preset.polyphony, PolyphonyConfig::default());
    }

    #[test]
    fn test_preset_from_toml() {
        let toml = r#"
name = "Test"
description = "A test preset"

[voice]
type = "oscillator"
waveform = "saw"
unison = 3
detune = 0.2
sync = { ratio = 2.0 }

[voice.envelope]
attack = 5.0
decay = 100.0
sustain = 0.4
release = 250.0

[polyphony]
voice_limit = 6
retrigger = "always_preserve"
"#;

        let preset = VoicePreset::from_toml(toml).unwrap();
        assert_eq!(preset.name, "Test");
        assert_eq!(preset.description.as_deref(), Some("A test preset"));
        let VoiceConfig::Oscillator(osc) = &preset.voice else {
            panic!("expected oscillator voice, got {}", preset.voice.kind());
        };
        assert_eq!(osc.waveform, Waveform::Saw);
        assert_eq!(osc.unison, 3);
        assert_eq!(osc.sync, SyncMode::Ratio(2.0));
        assert_eq!(osc.envelope, EnvelopeConfig::adsr(5.0, 100.0, 0.4, 250.0));
        // unlisted fields keep their defaults
        assert_eq!(osc.vol, OscillatorConfig::default().vol);
        assert_eq!(preset.polyphony.voice_limit, 6);
        assert!(preset.polyphony.allow_stealing);
        assert_eq!(preset.polyphony.retrigger, RetriggerPolicy::AlwaysPreserve);
    }

    #[test]
    fn test_preset_to_toml() {
        let preset = VoicePreset::new(
            "Pluck",
            VoiceConfig::Karplus(KarplusConfig {
                source: ExciterSource::Noise,
                ..KarplusConfig::default()
            }),
        )
        .with_description("Test description");

        let toml = preset.to_toml().unwrap();
        assert!(toml.contains("name = \"Pluck\""));
        assert!(toml.contains("description = \"Test description\""));
        assert!(toml.contains("type = \"karplus\""));
        assert!(toml.contains("source = \"noise\""));
    }

    #[test]
    fn test_preset_roundtrip() {
        for voice in [
            VoiceConfig::Oscillator(OscillatorConfig {
                filter_cutoff_max: Some(2500.0),
                sync: SyncMode::Frequency(110.0),
                ..OscillatorConfig::default()
            }),
            VoiceConfig::Fm(FmConfig {
                harm_ratio: 3.0,
                mod_index: 1.5,
                ..FmConfig::default()
            }),
            VoiceConfig::Pad(PadConfig::default()),
        ] {
            let original = VoicePreset::new("Roundtrip", voice).with_description("Testing serialization");
            let toml = original.to_toml().unwrap();
            let parsed = VoicePreset::from_toml(&toml).unwrap();
            assert_eq!(original, parsed, "round trip changed the preset:\n{toml}");
        }
    }

    #[test]
    fn test_unknown_voice_type_rejected() {
        let toml = r#"
name = "Bad"
[voice]
type = "theremin"
"#;
        assert!(matches!(
            VoicePreset::from_toml(toml),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_minimal_toml() {
        let preset = VoicePreset::from_toml("name = \"Minimal\"").unwrap();
        assert_eq!(preset.name, "Minimal");
        assert_eq!(preset.voice, VoiceConfig::default());
        assert!(preset.validate().is_ok());
    }

    #[test]
    fn test_preset_default() {
        let preset = VoicePreset::default();
        assert_eq!(preset.name, "Untitled");
        assert_eq!(preset.voice.kind(), "oscillator");
    }
}
