//! Voice sections of a preset, one per voice type.
//!
//! Each section mirrors the synth's parameter struct, with envelopes in
//! their serializable [`EnvelopeConfig`] form. Every field has a default,
//! so a preset only needs to list what it changes.

use std::sync::Arc;

use polyvox_synth::{
    DEFAULT_ROOT_PITCH, ExciterSource, FmVoiceParams, KarplusStrongVoiceParams,
    OscillatorVoiceParams, PadAmplitude, PadSynthVoiceParams, SampleVoiceParams, SyncMode,
    Waveform,
};
use serde::{Deserialize, Serialize};

use crate::envelope::EnvelopeConfig;
use crate::error::{ConfigError, Result};

fn envelope(config: &EnvelopeConfig, name: &str) -> Result<polyvox_synth::Adsr> {
    config
        .to_adsr()
        .map_err(|e| ConfigError::invalid_envelope(name, e))
}

/// Voice type and its parameters.
///
/// Serialized with a `type` tag:
///
/// ```toml
/// [voice]
/// type = "oscillator"
/// waveform = "saw"
/// unison = 3
/// detune = 0.15
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoiceConfig {
    /// Unison oscillator voice.
    Oscillator(OscillatorConfig),
    /// Three-operator FM voice.
    Fm(FmConfig),
    /// Plucked string.
    Karplus(KarplusConfig),
    /// Sample playback.
    Sampler(SamplerConfig),
    /// PADsynth wavetable voice.
    Pad(PadConfig),
}

impl VoiceConfig {
    /// Tag used in preset files.
    pub fn kind(&self) -> &'static str {
        match self {
            VoiceConfig::Oscillator(_) => "oscillator",
            VoiceConfig::Fm(_) => "fm",
            VoiceConfig::Karplus(_) => "karplus",
            VoiceConfig::Sampler(_) => "sampler",
            VoiceConfig::Pad(_) => "pad",
        }
    }

    /// Every tag a preset may use.
    pub const KINDS: &'static [&'static str] = &["oscillator", "fm", "karplus", "sampler", "pad"];
}

impl Default for VoiceConfig {
    fn default() -> Self {
        VoiceConfig::Oscillator(OscillatorConfig::default())
    }
}

/// Oscillator voice section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillatorConfig {
    /// Amplitude envelope.
    pub envelope: EnvelopeConfig,
    /// Filter envelope.
    pub filter_envelope: EnvelopeConfig,
    /// Filter cutoff at full filter envelope. Absent disables the filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_cutoff_max: Option<f32>,
    /// Filter cutoff at zero filter envelope, in Hz.
    pub filter_cutoff_min: f32,
    /// Filter resonance.
    pub filter_q: f32,
    /// Output level.
    pub vol: f32,
    /// Waveform.
    pub waveform: Waveform,
    /// Pulse duty cycle.
    pub pulse_width: f32,
    /// Alternate-cycle pulse width shift.
    pub shuffle: f32,
    /// Edge smoothing.
    pub soften: f32,
    /// Frequency multiplier.
    pub mult: f32,
    /// Unison spread in semitones.
    pub detune: f32,
    /// Stacked oscillators.
    pub unison: usize,
    /// Stereo spread of the unison stack.
    pub unison_width: f32,
    /// Start phase in cycles.
    pub phase_offset: f32,
    /// Hard sync.
    pub sync: SyncMode,
    /// Velocity to output level.
    pub vel_to_volume: f32,
    /// Velocity to envelope speed.
    pub vel_to_envelope: f32,
    /// Control updates once per block.
    pub lite_cpu_mode: bool,
}

impl Default for OscillatorConfig {
    fn default() -> Self {
        Self::from_params(&OscillatorVoiceParams::default())
    }
}

impl OscillatorConfig {
    /// Synth parameters for this section.
    pub fn to_params(&self) -> Result<OscillatorVoiceParams> {
        Ok(OscillatorVoiceParams {
            adsr: envelope(&self.envelope, "envelope")?,
            filter_adsr: envelope(&self.filter_envelope, "filter_envelope")?,
            filter_cutoff_max: self.filter_cutoff_max,
            filter_cutoff_min: self.filter_cutoff_min,
            filter_q: self.filter_q,
            vol: self.vol,
            waveform: self.waveform,
            pulse_width: self.pulse_width,
            shuffle: self.shuffle,
            soften: self.soften,
            mult: self.mult,
            detune: self.detune,
            unison: self.unison,
            unison_width: self.unison_width,
            phase_offset: self.phase_offset,
            sync: self.sync,
            vel_to_volume: self.vel_to_volume,
            vel_to_envelope: self.vel_to_envelope,
            lite_cpu_mode: self.lite_cpu_mode,
        })
    }

    /// Section describing existing synth parameters.
    pub fn from_params(params: &OscillatorVoiceParams) -> Self {
        Self {
            envelope: EnvelopeConfig::from_adsr(&params.adsr),
            filter_envelope: EnvelopeConfig::from_adsr(&params.filter_adsr),
            filter_cutoff_max: params.filter_cutoff_max,
            filter_cutoff_min: params.filter_cutoff_min,
            filter_q: params.filter_q,
            vol: params.vol,
            waveform: params.waveform,
            pulse_width: params.pulse_width,
            shuffle: params.shuffle,
            soften: params.soften,
            mult: params.mult,
            detune: params.detune,
            unison: params.unison,
            unison_width: params.unison_width,
            phase_offset: params.phase_offset,
            sync: params.sync,
            vel_to_volume: params.vel_to_volume,
            vel_to_envelope: params.vel_to_envelope,
            lite_cpu_mode: params.lite_cpu_mode,
        }
    }
}

/// FM voice section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FmConfig {
    /// Carrier amplitude envelope.
    pub envelope: EnvelopeConfig,
    /// First modulator amplitude envelope.
    pub harm_envelope: EnvelopeConfig,
    /// First modulation index envelope.
    pub mod_index_envelope: EnvelopeConfig,
    /// Second modulator amplitude envelope.
    pub harm2_envelope: EnvelopeConfig,
    /// Second modulation index envelope.
    pub mod_index2_envelope: EnvelopeConfig,
    /// First modulator frequency ratio.
    pub harm_ratio: f32,
    /// First modulation index.
    pub mod_index: f32,
    /// Second modulator frequency ratio.
    pub harm_ratio2: f32,
    /// Second modulation index.
    pub mod_index2: f32,
    /// Carrier start phase in cycles.
    pub phase_offset0: f32,
    /// First modulator start phase in cycles.
    pub phase_offset1: f32,
    /// Second modulator start phase in cycles.
    pub phase_offset2: f32,
    /// Output level.
    pub vol: f32,
}

impl Default for FmConfig {
    fn default() -> Self {
        Self::from_params(&FmVoiceParams::default())
    }
}

impl FmConfig {
    /// Synth parameters for this section.
    pub fn to_params(&self) -> Result<FmVoiceParams> {
        Ok(FmVoiceParams {
            osc_adsr: envelope(&self.envelope, "envelope")?,
            harm_adsr: envelope(&self.harm_envelope, "harm_envelope")?,
            mod_index_adsr: envelope(&self.mod_index_envelope, "mod_index_envelope")?,
            harm2_adsr: envelope(&self.harm2_envelope, "harm2_envelope")?,
            mod_index2_adsr: envelope(&self.mod_index2_envelope, "mod_index2_envelope")?,
            harm_ratio: self.harm_ratio,
            mod_index: self.mod_index,
            harm_ratio2: self.harm_ratio2,
            mod_index2: self.mod_index2,
            phase_offset0: self.phase_offset0,
            phase_offset1: self.phase_offset1,
            phase_offset2: self.phase_offset2,
            vol: self.vol,
        })
    }

    /// Section describing existing synth parameters.
    pub fn from_params(params: &FmVoiceParams) -> Self {
        Self {
            envelope: EnvelopeConfig::from_adsr(&params.osc_adsr),
            harm_envelope: EnvelopeConfig::from_adsr(&params.harm_adsr),
            mod_index_envelope: EnvelopeConfig::from_adsr(&params.mod_index_adsr),
            harm2_envelope: EnvelopeConfig::from_adsr(&params.harm2_adsr),
            mod_index2_envelope: EnvelopeConfig::from_adsr(&params.mod_index2_adsr),
            harm_ratio: params.harm_ratio,
            mod_index: params.mod_index,
            harm_ratio2: params.harm_ratio2,
            mod_index2: params.mod_index2,
            phase_offset0: params.phase_offset0,
            phase_offset1: params.phase_offset1,
            phase_offset2: params.phase_offset2,
            vol: params.vol,
        }
    }
}

/// Karplus-Strong voice section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KarplusConfig {
    /// Damping filter rate.
    pub filter: f32,
    /// Loop feedback.
    pub feedback: f32,
    /// Exciter source.
    pub source: ExciterSource,
    /// Inverted feedback.
    pub invert: bool,
    /// Exciter oscillator frequency in Hz.
    pub exciter_freq: f32,
    /// Exciter attack in ms.
    pub exciter_attack: f32,
    /// Exciter decay in ms.
    pub exciter_decay: f32,
    /// Constant exciter level.
    pub excitation: f32,
    /// Damping pitch tracking.
    pub pitch_tone: f32,
    /// Velocity to output level.
    pub vel_to_volume: f32,
    /// Velocity to exciter attack.
    pub vel_to_envelope: f32,
    /// Control updates once per block.
    pub lite_cpu_mode: bool,
}

impl Default for KarplusConfig {
    fn default() -> Self {
        Self::from_params(&KarplusStrongVoiceParams::default())
    }
}

impl KarplusConfig {
    /// Synth parameters for this section.
    pub fn to_params(&self) -> KarplusStrongVoiceParams {
        KarplusStrongVoiceParams {
            filter: self.filter,
            feedback: self.feedback,
            source: self.source,
            invert: self.invert,
            exciter_freq: self.exciter_freq,
            exciter_attack: self.exciter_attack,
            exciter_decay: self.exciter_decay,
            excitation: self.excitation,
            pitch_tone: self.pitch_tone,
            vel_to_volume: self.vel_to_volume,
            vel_to_envelope: self.vel_to_envelope,
            lite_cpu_mode: self.lite_cpu_mode,
        }
    }

    /// Section describing existing synth parameters.
    pub fn from_params(params: &KarplusStrongVoiceParams) -> Self {
        Self {
            filter: params.filter,
            feedback: params.feedback,
            source: params.source,
            invert: params.invert,
            exciter_freq: params.exciter_freq,
            exciter_attack: params.exciter_attack,
            exciter_decay: params.exciter_decay,
            excitation: params.excitation,
            pitch_tone: params.pitch_tone,
            vel_to_volume: params.vel_to_volume,
            vel_to_envelope: params.vel_to_envelope,
            lite_cpu_mode: params.lite_cpu_mode,
        }
    }
}

/// Sampler voice section. The audio itself is supplied at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Amplitude envelope.
    pub envelope: EnvelopeConfig,
    /// Output level.
    pub vol: f32,
    /// Fundamental of the sample in Hz, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_freq: Option<f32>,
    /// Pitch the sample plays unchanged at when no frequency is known.
    pub root_pitch: f32,
    /// Loop the sample while the note is held.
    pub looping: bool,
    /// Velocity to output level.
    pub vel_to_volume: f32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            envelope: EnvelopeConfig::default(),
            vol: 0.5,
            detected_freq: None,
            root_pitch: DEFAULT_ROOT_PITCH,
            looping: false,
            vel_to_volume: 1.0,
        }
    }
}

impl SamplerConfig {
    /// Synth parameters playing `data` recorded at `data_sample_rate`.
    pub fn to_params(&self, data: Arc<[f32]>, data_sample_rate: f32) -> Result<SampleVoiceParams> {
        Ok(SampleVoiceParams {
            adsr: envelope(&self.envelope, "envelope")?,
            vol: self.vol,
            data,
            data_sample_rate,
            detected_freq: self.detected_freq,
            root_pitch: self.root_pitch,
            looping: self.looping,
            vel_to_volume: self.vel_to_volume,
        })
    }
}

/// PADsynth voice section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PadConfig {
    /// Amplitude envelope.
    pub envelope: EnvelopeConfig,
    /// Harmonic count; negative for a subharmonic series.
    pub harmonics: i32,
    /// Scale the harmonic count with pitch.
    pub harmonics_relative: bool,
    /// Fundamental band width in cents.
    pub bandwidth: f32,
    /// Band width growth per harmonic.
    pub bandwidth_scale: f32,
    /// Inharmonic stretch.
    pub spread: f32,
    /// Harmonic rolloff.
    pub amplitude: PadAmplitude,
    /// Right channel table offset.
    pub channel_offset: f32,
    /// Table length doubling steps.
    pub undersample: u32,
    /// Output level.
    pub vol: f32,
    /// Velocity to output level.
    pub vel_to_volume: f32,
    /// Velocity to envelope curve.
    pub vel_to_envelope: f32,
}

impl Default for PadConfig {
    fn default() -> Self {
        Self::from_params(&PadSynthVoiceParams::default())
    }
}

impl PadConfig {
    /// Synth parameters for this section.
    pub fn to_params(&self) -> Result<PadSynthVoiceParams> {
        Ok(PadSynthVoiceParams {
            adsr: envelope(&self.envelope, "envelope")?,
            harmonics: self.harmonics,
            harmonics_relative: self.harmonics_relative,
            bandwidth: self.bandwidth,
            bandwidth_scale: self.bandwidth_scale,
            spread: self.spread,
            amplitude: self.amplitude,
            channel_offset: self.channel_offset,
            undersample: self.undersample,
            vol: self.vol,
            vel_to_volume: self.vel_to_volume,
            vel_to_envelope: self.vel_to_envelope,
        })
    }

    /// Section describing existing synth parameters.
    pub fn from_params(params: &PadSynthVoiceParams) -> Self {
        Self {
            envelope: EnvelopeConfig::from_adsr(&params.adsr),
            harmonics: params.harmonics,
            harmonics_relative: params.harmonics_relative,
            bandwidth: params.bandwidth,
            bandwidth_scale: params.bandwidth_scale,
            spread: params.spread,
            amplitude: params.amplitude,
            channel_offset: params.channel_offset,
            undersample: params.undersample,
            vol: params.vol,
            vel_to_volume: params.vel_to_volume,
            vel_to_envelope: params.vel_to_envelope,
        }
    }
}
