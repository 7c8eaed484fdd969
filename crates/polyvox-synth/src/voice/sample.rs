//! Sample playback voice.

use std::sync::Arc;

use polyvox_core::{ChannelBuffer, pan_gains};

use super::{MidiVoice, VoiceState, velocity_volume};
use crate::context::{EngineSetup, RenderContext};
use crate::envelope::Adsr;

/// Pitch a sample plays back unchanged at when it has no detected frequency.
pub const DEFAULT_ROOT_PITCH: f32 = 60.0;

/// Parameters for [`SampleVoice`].
#[derive(Debug, Clone)]
pub struct SampleVoiceParams {
    /// Amplitude envelope.
    pub adsr: Adsr,
    /// Output level.
    pub vol: f32,
    /// Mono sample data, shared between voices.
    pub data: Arc<[f32]>,
    /// Rate the data was recorded at, in Hz.
    pub data_sample_rate: f32,
    /// Fundamental of the sample, if known. Without it the sample plays
    /// unchanged at `root_pitch`.
    pub detected_freq: Option<f32>,
    /// Pitch used when `detected_freq` is `None`.
    pub root_pitch: f32,
    /// Wrap to the start at the end of the data.
    pub looping: bool,
    /// Velocity to output level.
    pub vel_to_volume: f32,
}

impl Default for SampleVoiceParams {
    fn default() -> Self {
        Self {
            adsr: Adsr::new(10.0, 0.0, 1.0, 10.0),
            vol: 0.5,
            data: Arc::from(Vec::new()),
            data_sample_rate: 48000.0,
            detected_freq: None,
            root_pitch: DEFAULT_ROOT_PITCH,
            looping: false,
            vel_to_volume: 1.0,
        }
    }
}

/// Sample playback voice.
///
/// Reads the shared data with linear interpolation at a rate derived from the
/// note pitch relative to the sample's own pitch.
#[derive(Debug)]
pub struct SampleVoice {
    state: VoiceState,
    params: Arc<SampleVoiceParams>,
    adsr: Adsr,
    pos: f64,
}

impl SampleVoice {
    fn playback_rate(&self, sample_offset: usize, ctx: &RenderContext<'_>) -> f64 {
        let params = &self.params;
        let freq = ctx.tuning.pitch_to_freq(self.state.pitch_at(sample_offset));
        let root = params
            .detected_freq
            .filter(|f| *f > 0.0)
            .unwrap_or_else(|| ctx.tuning.pitch_to_freq(params.root_pitch));
        f64::from(freq / root) * f64::from(params.data_sample_rate / ctx.sample_rate)
    }

    fn finished_data(&self) -> bool {
        !self.params.looping && self.pos >= self.params.data.len() as f64
    }
}

impl MidiVoice for SampleVoice {
    type Params = SampleVoiceParams;

    fn create(_setup: &EngineSetup, _slot: usize) -> Self {
        Self {
            state: VoiceState::default(),
            params: Arc::new(SampleVoiceParams::default()),
            adsr: Adsr::default(),
            pos: 0.0,
        }
    }

    fn voice_state(&self) -> &VoiceState {
        &self.state
    }

    fn voice_state_mut(&mut self) -> &mut VoiceState {
        &mut self.state
    }

    fn start(&mut self, time: f64, amount: f32) {
        let params = Arc::clone(&self.params);
        let volume = velocity_volume(amount, params.vel_to_volume);
        self.adsr.start_with(time, volume, &params.adsr, 1.0, 0.0);
        self.pos = 0.0;
    }

    fn stop(&mut self, time: f64) {
        self.adsr.stop(time, true);
    }

    fn clear_voice(&mut self) {
        self.adsr.clear();
        self.pos = 0.0;
    }

    fn process(&mut self, time: f64, out: &mut ChannelBuffer, ctx: &RenderContext<'_>) -> bool {
        if self.is_done(time) {
            return false;
        }

        let params = Arc::clone(&self.params);
        let data = &params.data;
        let len = data.len();
        let mono = out.num_active_channels() == 1;
        let ms_per_sample = ctx.ms_per_sample();
        let mut time = time;

        for pos in 0..out.buffer_size() {
            ctx.compute_controls(pos);
            if self.finished_data() {
                break;
            }
            if self.pos >= len as f64 {
                self.pos %= len as f64;
            }

            let whole = self.pos.floor();
            let frac = (self.pos - whole) as f32;
            let i = whole as usize;
            let next = if i + 1 < len {
                data[i + 1]
            } else if params.looping {
                data[0]
            } else {
                0.0
            };
            let sample = (data[i] + (next - data[i]) * frac) * self.adsr.value(time) * params.vol;

            if mono {
                out.channel_mut(0)[pos] += sample;
            } else {
                let (l, r) = pan_gains(self.state.pan);
                out.channel_mut(0)[pos] += sample * l;
                out.channel_mut(1)[pos] += sample * r;
            }

            self.pos += self.playback_rate(pos, ctx);
            time += ms_per_sample;
        }
        true
    }

    fn set_voice_params(&mut self, params: Arc<Self::Params>) {
        self.params = params;
    }

    fn is_done(&self, time: f64) -> bool {
        self.params.data.is_empty() || self.adsr.is_done(time) || self.finished_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyvox_core::Tuning;

    fn ramp_data(len: usize) -> Arc<[f32]> {
        (0..len).map(|i| i as f32 / len as f32).collect()
    }

    fn voice_with(params: SampleVoiceParams, pitch: f32) -> SampleVoice {
        let mut voice = SampleVoice::create(&EngineSetup::default(), 0);
        voice.set_voice_params(Arc::new(params));
        voice.set_pitch(pitch);
        voice.start(0.0, 1.0);
        voice
    }

    fn render(voice: &mut SampleVoice, len: usize) -> Vec<f32> {
        let tuning = Tuning::default();
        let ctx = RenderContext::new(48000.0, &tuning);
        let mut out = ChannelBuffer::with_channels(len, 1);
        voice.process(0.0, &mut out, &ctx);
        out.channel(0).to_vec()
    }

    fn flat_params(data: Arc<[f32]>) -> SampleVoiceParams {
        SampleVoiceParams {
            adsr: Adsr::new(1.0, 1.0, 1.0, 1.0),
            vol: 1.0,
            data,
            ..SampleVoiceParams::default()
        }
    }

    #[test]
    fn test_root_pitch_plays_at_unit_rate() {
        let mut voice = voice_with(flat_params(ramp_data(1000)), DEFAULT_ROOT_PITCH);
        render(&mut voice, 100);
        assert!((voice.pos - 100.0).abs() < 1e-6, "Expected pos 100, got {}", voice.pos);
    }

    #[test]
    fn test_octave_up_doubles_rate() {
        let mut voice = voice_with(flat_params(ramp_data(1000)), DEFAULT_ROOT_PITCH + 12.0);
        render(&mut voice, 100);
        assert!((voice.pos - 200.0).abs() < 1e-3, "Expected pos 200, got {}", voice.pos);
    }

    #[test]
    fn test_detected_freq_sets_root() {
        let params = SampleVoiceParams {
            detected_freq: Some(220.0),
            ..flat_params(ramp_data(1000))
        };
        let mut voice = voice_with(params, 69.0);
        render(&mut voice, 100);
        assert!((voice.pos - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_one_shot_ends_with_data() {
        let mut voice = voice_with(flat_params(ramp_data(64)), DEFAULT_ROOT_PITCH);
        let out = render(&mut voice, 128);
        assert!(out[100..].iter().all(|&s| s == 0.0));
        assert!(voice.is_done(10.0));
    }

    #[test]
    fn test_loop_wraps() {
        let params = SampleVoiceParams {
            looping: true,
            ..flat_params(ramp_data(64))
        };
        let mut voice = voice_with(params, DEFAULT_ROOT_PITCH);
        let out = render(&mut voice, 256);
        assert!(out[200..].iter().any(|&s| s > 0.1));
        assert!(!voice.is_done(5.0));
    }

    #[test]
    fn test_empty_sample_is_done() {
        let voice = voice_with(SampleVoiceParams::default(), 60.0);
        assert!(voice.is_done(0.0));
    }
}
