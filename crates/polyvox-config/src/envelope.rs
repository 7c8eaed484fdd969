//! Envelope sections of a voice preset.

use polyvox_synth::{Adsr, MAX_ADSR_STAGES, Stage};
use serde::{Deserialize, Serialize};

use crate::validation::{ValidationResult, validate_envelope};

/// One explicit envelope stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Level at the end of the stage, relative to the note's peak.
    pub target: f32,
    /// Duration in ms.
    pub time: f32,
    /// Interpolation bias; 0 is linear.
    #[serde(default)]
    pub curve: f32,
}

impl From<Stage> for StageConfig {
    fn from(stage: Stage) -> Self {
        Self {
            target: stage.target,
            time: stage.time,
            curve: stage.curve,
        }
    }
}

impl From<StageConfig> for Stage {
    fn from(stage: StageConfig) -> Self {
        Self {
            target: stage.target,
            time: stage.time,
            curve: stage.curve,
        }
    }
}

/// Envelope description as stored in presets.
///
/// Either a classic attack/decay/sustain/release shape, or, when `stages`
/// is non-empty, an explicit stage list. With an explicit list the
/// `sustain_stage` index holds until note-off; without one the envelope
/// runs straight through.
///
/// # TOML Format
///
/// ```toml
/// [voice.envelope]
/// attack = 5.0
/// decay = 250.0
/// sustain = 0.6
/// release = 400.0
/// hold = 2000.0
/// ```
///
/// ```toml
/// [voice.envelope]
/// sustain_stage = 1
/// stages = [
///     { target = 1.0, time = 2.0 },
///     { target = 0.3, time = 80.0, curve = -0.5 },
///     { target = 0.0, time = 300.0, curve = -0.5 },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Attack time in ms.
    pub attack: f32,
    /// Decay time in ms.
    pub decay: f32,
    /// Sustain level, `0..=1`.
    pub sustain: f32,
    /// Release time in ms.
    pub release: f32,
    /// Longest the sustain may hold before releasing on its own, in ms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold: Option<f32>,
    /// Explicit stages, replacing attack/decay/sustain/release.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageConfig>,
    /// Held stage of an explicit stage list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sustain_stage: Option<usize>,
    /// Let the last stage end at its own target instead of silence.
    pub free_release_level: bool,
    /// Multiplier for every stage time except the last.
    pub time_scale: f32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self::adsr(10.0, 0.0, 1.0, 10.0)
    }
}

impl EnvelopeConfig {
    /// Classic four-parameter envelope.
    pub fn adsr(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
            hold: None,
            stages: Vec::new(),
            sustain_stage: None,
            free_release_level: false,
            time_scale: 1.0,
        }
    }

    /// Sets a forced-release hold.
    pub fn with_hold(mut self, hold: f32) -> Self {
        self.hold = Some(hold);
        self
    }

    /// Replaces the shape with an explicit stage list.
    pub fn with_stages(
        mut self,
        stages: impl IntoIterator<Item = StageConfig>,
        sustain_stage: Option<usize>,
    ) -> Self {
        self.stages = stages.into_iter().collect();
        self.sustain_stage = sustain_stage;
        self
    }

    /// True when an explicit stage list is in use.
    pub fn is_explicit(&self) -> bool {
        !self.stages.is_empty()
    }

    /// Builds the envelope after validating this section.
    pub fn to_adsr(&self) -> ValidationResult<Adsr> {
        validate_envelope(self, "envelope")?;

        let mut adsr = if self.is_explicit() {
            let mut adsr = Adsr::default();
            adsr.set_num_stages(self.stages.len());
            for (i, stage) in self.stages.iter().enumerate() {
                *adsr.stage_mut(i) = (*stage).into();
            }
            adsr.set_has_sustain_stage(self.sustain_stage.is_some());
            adsr.set_sustain_stage(self.sustain_stage.unwrap_or(0));
            adsr
        } else {
            Adsr::new(self.attack, self.decay, self.sustain, self.release)
        };

        if self.time_scale != 1.0 {
            let last = adsr.num_stages() - 1;
            for i in 0..last {
                adsr.stage_mut(i).time *= self.time_scale;
            }
        }
        adsr.set_max_sustain(self.hold);
        adsr.set_free_release_level(self.free_release_level);
        Ok(adsr)
    }

    /// Describes an existing envelope.
    ///
    /// Standard three-stage envelopes with the default curves come back in
    /// attack/decay/sustain/release form, anything else as a stage list.
    pub fn from_adsr(adsr: &Adsr) -> Self {
        let hold = adsr.max_sustain();
        let free_release_level = adsr.free_release_level();

        if is_plain_adsr(adsr) {
            return Self {
                hold,
                free_release_level,
                ..Self::adsr(adsr.attack(), adsr.decay(), adsr.sustain(), adsr.release())
            };
        }

        let count = adsr.num_stages().min(MAX_ADSR_STAGES);
        Self {
            hold,
            free_release_level,
            ..Self::default().with_stages(
                (0..count).map(|i| StageConfig::from(*adsr.stage(i))),
                adsr.has_sustain_stage().then(|| adsr.sustain_stage()),
            )
        }
    }
}

fn is_plain_adsr(adsr: &Adsr) -> bool {
    adsr.is_standard_adsr()
        && adsr.has_sustain_stage()
        && adsr.stage(0).target == 1.0
        && adsr.stage(0).curve == 0.0
        && adsr.stage(1).curve == -0.5
        && adsr.stage(2).target == 0.0
        && adsr.stage(2).curve == -0.5
}
