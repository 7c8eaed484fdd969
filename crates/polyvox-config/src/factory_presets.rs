//! Factory presets bundled with the polyvox library.
//!
//! One or more starting points for each voice type, always available
//! without external files.

use crate::VoicePreset;

/// Array of factory preset names for external access.
pub static FACTORY_PRESET_NAMES: &[&str] = &[
    "init",
    "supersaw",
    "soft_square",
    "e_piano",
    "fm_bell",
    "pluck",
    "harp",
    "warm_pad",
    "glass_pad",
];

/// TOML content for factory presets, embedded at compile time.
static FACTORY_PRESETS_TOML: &[(&str, &str)] = &[
    ("init", INIT_PRESET),
    ("supersaw", SUPERSAW_PRESET),
    ("soft_square", SOFT_SQUARE_PRESET),
    ("e_piano", E_PIANO_PRESET),
    ("fm_bell", FM_BELL_PRESET),
    ("pluck", PLUCK_PRESET),
    ("harp", HARP_PRESET),
    ("warm_pad", WARM_PAD_PRESET),
    ("glass_pad", GLASS_PAD_PRESET),
];

/// Initialization preset - a plain sine with a short envelope.
const INIT_PRESET: &str = r#"
name = "Init"
description = "Plain sine voice with a short click-free envelope"

[voice]
type = "oscillator"
waveform = "sine"

[voice.envelope]
attack = 10.0
decay = 0.0
sustain = 1.0
release = 10.0
"#;

/// Detuned unison saw through a sweeping low-pass.
const SUPERSAW_PRESET: &str = r#"
name = "Supersaw"
description = "Seven detuned saws spread across the stereo field"

[voice]
type = "oscillator"
waveform = "saw"
vol = 0.2
unison = 7
detune = 0.25
unison_width = 0.8
filter_cutoff_max = 6000.0
filter_cutoff_min = 300.0
filter_q = 0.9
vel_to_volume = 0.6

[voice.envelope]
attack = 15.0
decay = 300.0
sustain = 0.8
release = 350.0

[voice.filter_envelope]
attack = 5.0
decay = 600.0
sustain = 0.4
release = 400.0

[polyphony]
voice_limit = 8
"#;

/// Softened pulse wave.
const SOFT_SQUARE_PRESET: &str = r#"
name = "Soft Square"
description = "Rounded hollow lead with a narrow pulse"

[voice]
type = "oscillator"
waveform = "square"
pulse_width = 0.35
soften = 0.6
vol = 0.25

[voice.envelope]
attack = 8.0
decay = 120.0
sustain = 0.7
release = 180.0

[polyphony]
voice_limit = 4
allow_stealing = true
"#;

/// Classic tine piano built from two FM pairs.
const E_PIANO_PRESET: &str = r#"
name = "E-Piano"
description = "Bright attack that mellows as the modulation index decays"

[voice]
type = "fm"
harm_ratio = 1.0
mod_index = 2.5
harm_ratio2 = 14.0
mod_index2 = 0.6
vol = 0.8

[voice.envelope]
attack = 2.0
decay = 1500.0
sustain = 0.3
release = 300.0

[voice.mod_index_envelope]
attack = 1.0
decay = 800.0
sustain = 0.2
release = 300.0

[voice.mod_index2_envelope]
attack = 1.0
decay = 60.0
sustain = 0.0
release = 50.0

[polyphony]
oversampling = 2
"#;

/// Inharmonic FM bell with a long ring.
const FM_BELL_PRESET: &str = r#"
name = "FM Bell"
description = "Inharmonic ratio with a slow stage-list decay"

[voice]
type = "fm"
harm_ratio = 3.5
mod_index = 4.0
vol = 0.6

[voice.envelope]
sustain_stage = 1
stages = [
    { target = 1.0, time = 1.0 },
    { target = 0.4, time = 2500.0, curve = -0.5 },
    { target = 0.0, time = 1200.0, curve = -0.5 },
]

[voice.mod_index_envelope]
attack = 1.0
decay = 2000.0
sustain = 0.1
release = 1000.0

[polyphony]
oversampling = 2
"#;

/// Nylon-like plucked string.
const PLUCK_PRESET: &str = r#"
name = "Pluck"
description = "Short noise-excited string"

[voice]
type = "karplus"
source = "noise"
filter = 1.5
feedback = 0.985
exciter_decay = 2.0
vel_to_volume = 0.7
"#;

/// Longer, brighter string.
const HARP_PRESET: &str = r#"
name = "Harp"
description = "Long-ringing string with a mixed exciter"

[voice]
type = "karplus"
source = "mix"
filter = 0.6
feedback = 0.995
exciter_freq = 400.0
exciter_attack = 0.5
exciter_decay = 4.0
pitch_tone = 0.5

[polyphony]
voice_limit = 24
"#;

/// Wide, slow PADsynth pad.
const WARM_PAD_PRESET: &str = r#"
name = "Warm Pad"
description = "Broad harmonic smear with a slow swell"

[voice]
type = "pad"
harmonics = 24
bandwidth = 60.0
bandwidth_scale = 1.0
amplitude = "sqrt"
vol = 0.8

[voice.envelope]
attack = 800.0
decay = 500.0
sustain = 0.8
release = 1500.0

[polyphony]
voice_limit = 8
retrigger = "always_preserve"
"#;

/// Sparse, glassy PADsynth pad.
const GLASS_PAD_PRESET: &str = r#"
name = "Glass Pad"
description = "Subharmonic series with narrow bandwidth and a slight stereo offset"

[voice]
type = "pad"
harmonics = -12
bandwidth = 12.0
bandwidth_scale = 0.5
amplitude = "step"
spread = 0.2
channel_offset = 0.3
vol = 0.7

[voice.envelope]
attack = 300.0
decay = 1000.0
sustain = 0.6
release = 2000.0

[polyphony]
voice_limit = 8
"#;

/// Get all factory presets.
///
/// Presets that fail to parse are skipped.
///
/// # Example
///
/// ```rust
/// use polyvox_config::factory_presets;
///
/// for preset in factory_presets() {
///     println!("{}: {} voice", preset.name, preset.voice.kind());
/// }
/// ```
pub fn factory_presets() -> Vec<VoicePreset> {
    FACTORY_PRESETS_TOML
        .iter()
        .filter_map(|(_, toml)| VoicePreset::from_toml(toml).ok())
        .collect()
}

/// Get a factory preset by name.
///
/// Matches the internal identifier or the display name, ignoring case.
///
/// # Example
///
/// ```rust
/// use polyvox_config::get_factory_preset;
///
/// let preset = get_factory_preset("e_piano").unwrap();
/// assert_eq!(preset.voice.kind(), "fm");
/// ```
pub fn get_factory_preset(name: &str) -> Option<VoicePreset> {
    let name_lower = name.to_lowercase();

    if let Some((_, toml)) = FACTORY_PRESETS_TOML
        .iter()
        .find(|(id, _)| id.to_lowercase() == name_lower)
    {
        return VoicePreset::from_toml(toml).ok();
    }

    FACTORY_PRESETS_TOML
        .iter()
        .filter_map(|(_, toml)| VoicePreset::from_toml(toml).ok())
        .find(|preset| preset.name.to_lowercase() == name_lower)
}

/// Get the internal identifiers of all factory presets.
pub fn factory_preset_names() -> Vec<&'static str> {
    FACTORY_PRESETS_TOML.iter().map(|(name, _)| *name).collect()
}

/// Check if a name refers to a factory preset, by identifier or display
/// name, ignoring case.
///
/// # Example
///
/// ```rust
/// use polyvox_config::is_factory_preset;
///
/// assert!(is_factory_preset("warm_pad"));
/// assert!(is_factory_preset("Warm Pad"));
/// assert!(!is_factory_preset("my_custom_preset"));
/// ```
pub fn is_factory_preset(name: &str) -> bool {
    get_factory_preset(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VoiceConfig;

    #[test]
    fn test_factory_presets_load() {
        let presets = factory_presets();
        assert_eq!(presets.len(), FACTORY_PRESETS_TOML.len(), "every factory preset should parse");

        let names: Vec<_> = presets.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"Init"));
        assert!(names.contains(&"E-Piano"));
        assert!(names.contains(&"Warm Pad"));
    }

    #[test]
    fn test_get_factory_preset() {
        let preset = get_factory_preset("pluck").expect("pluck should exist");
        assert_eq!(preset.name, "Pluck");

        let preset = get_factory_preset("Glass Pad").expect("Glass Pad should exist");
        assert_eq!(preset.name, "Glass Pad");

        let preset = get_factory_preset("SUPERSAW").expect("SUPERSAW should exist");
        assert_eq!(preset.name, "Supersaw");

        assert!(get_factory_preset("nonexistent").is_none());
    }

    #[test]
    fn test_names_table_matches_presets() {
        assert_eq!(factory_preset_names(), FACTORY_PRESET_NAMES);
    }

    #[test]
    fn test_all_factory_presets_valid() {
        for (name, toml) in FACTORY_PRESETS_TOML {
            let result = VoicePreset::from_toml(toml);
            assert!(result.is_ok(), "factory preset '{}' should parse: {:?}", name, result);

            let preset = result.unwrap();
            assert!(preset.description.is_some(), "preset '{}' should have a description", name);
            assert_eq!(preset.validate(), Ok(()), "preset '{}' should validate", name);
        }
    }

    #[test]
    fn test_every_synthesized_voice_type_covered() {
        let kinds: Vec<_> = factory_presets().iter().map(|p| p.voice.kind()).collect();
        for kind in ["oscillator", "fm", "karplus", "pad"] {
            assert!(kinds.contains(&kind), "no factory preset uses the {kind} voice");
        }
    }

    #[test]
    fn test_fm_bell_uses_stage_list() {
        let bell = get_factory_preset("fm_bell").expect("fm_bell should exist");
        let VoiceConfig::Fm(fm) = bell.voice else {
            panic!("fm_bell should be an fm voice");
        };
        assert!(fm.envelope.is_explicit());
        let adsr = fm.envelope.to_adsr().unwrap();
        assert_eq!(adsr.num_stages(), 3);
        assert_eq!(adsr.sustain_stage(), 1);
    }

    #[test]
    fn test_is_factory_preset() {
        assert!(is_factory_preset("harp"));
        assert!(is_factory_preset("E-Piano"));
        assert!(!is_factory_preset("harpsichord"));
    }
}
