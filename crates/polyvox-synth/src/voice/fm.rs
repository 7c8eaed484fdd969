//! Three-operator FM voice.
//!
//! Operator chain: `harm2 -> harm -> osc`. Each modulator runs at a ratio of
//! the carrier frequency shaped by its own envelope, and its depth follows a
//! separate modulation-index envelope.

use std::sync::Arc;

use polyvox_core::{ChannelBuffer, pan_gains};

use super::{MidiVoice, VoiceState, render_oversampled};
use crate::context::{EngineSetup, RenderContext};
use crate::envelope::Adsr;
use crate::oscillator::{EnvOscillator, Waveform};

/// Release time at or below which a modulator envelope is treated as a gate:
/// it restarts from zero on each note and is left sustaining on note-off.
const GATE_RELEASE_MS: f32 = 1.0;

/// Parameters for [`FmVoice`].
#[derive(Debug, Clone)]
pub struct FmVoiceParams {
    /// Carrier amplitude envelope.
    pub osc_adsr: Adsr,
    /// First modulator ratio envelope.
    pub harm_adsr: Adsr,
    /// First modulation-index envelope.
    pub mod_index_adsr: Adsr,
    /// Second modulator ratio envelope.
    pub harm2_adsr: Adsr,
    /// Second modulation-index envelope.
    pub mod_index2_adsr: Adsr,
    /// First modulator frequency ratio.
    pub harm_ratio: f32,
    /// First modulation index, `0..=20`.
    pub mod_index: f32,
    /// Second modulator frequency ratio (relative to the first).
    pub harm_ratio2: f32,
    /// Second modulation index.
    pub mod_index2: f32,
    /// Carrier phase offset in cycles.
    pub phase_offset0: f32,
    /// First modulator phase offset in cycles.
    pub phase_offset1: f32,
    /// Second modulator phase offset in cycles.
    pub phase_offset2: f32,
    /// Output level, `0..=2`.
    pub vol: f32,
}

impl Default for FmVoiceParams {
    fn default() -> Self {
        Self {
            osc_adsr: Adsr::new(10.0, 0.0, 1.0, 10.0),
            harm_adsr: Adsr::new(1.0, 0.0, 1.0, 1.0),
            mod_index_adsr: Adsr::new(1.0, 0.0, 1.0, 1.0),
            harm2_adsr: Adsr::new(1.0, 0.0, 1.0, 1.0),
            mod_index2_adsr: Adsr::new(1.0, 0.0, 1.0, 1.0),
            harm_ratio: 1.0,
            mod_index: 0.0,
            harm_ratio2: 1.0,
            mod_index2: 0.0,
            phase_offset0: 0.0,
            phase_offset1: 0.0,
            phase_offset2: 0.0,
            vol: 1.0,
        }
    }
}

/// FM voice.
#[derive(Debug)]
pub struct FmVoice {
    state: VoiceState,
    params: Arc<FmVoiceParams>,
    osc: EnvOscillator,
    harm: EnvOscillator,
    harm2: EnvOscillator,
    mod_index: Adsr,
    mod_index2: Adsr,
    osc_phase: f32,
    harm_phase: f32,
    harm_phase2: f32,
    work: ChannelBuffer,
}

fn start_modulator(env: &mut Adsr, shape: &Adsr, time: f64) {
    if shape.release() <= GATE_RELEASE_MS {
        env.clear();
    }
    env.start_with(time, 1.0, shape, 1.0, 0.0);
}

fn stop_modulator(env: &mut Adsr, time: f64) {
    if env.release() > GATE_RELEASE_MS {
        env.stop(time, false);
    }
}

fn advance(phase: &mut f32, inc: f32) {
    *phase += inc;
    if phase.is_finite() {
        *phase -= libm::floorf(*phase);
    } else {
        *phase = 0.0;
    }
}

impl FmVoice {
    fn render_into(
        &mut self,
        time: f64,
        dest: &mut ChannelBuffer,
        oversampling: usize,
        start: usize,
        ctx: &RenderContext<'_>,
    ) {
        let params = Arc::clone(&self.params);
        let step_ms = ctx.ms_per_sample() / oversampling as f64;
        let os_rate = ctx.sample_rate * oversampling as f32;
        let mono = dest.num_active_channels() == 1;
        let mut time = time + start as f64 * ctx.ms_per_sample();

        for pos in 0..dest.buffer_size() {
            let offset = start + pos / oversampling;
            ctx.compute_controls(offset);

            let osc_freq = ctx.tuning.pitch_to_freq(self.state.pitch_at(offset));
            let harm_freq = osc_freq * self.harm.adsr.value(time) * params.harm_ratio;
            let harm_freq2 = harm_freq * self.harm2.adsr.value(time) * params.harm_ratio2;

            let inc2 = harm_freq2 / os_rate;
            advance(&mut self.harm_phase2, inc2);
            let mod_harm_freq = harm_freq
                + self.harm2.audio(time, self.harm_phase2 + params.phase_offset2, inc2)
                    * harm_freq2
                    * self.mod_index2.value(time)
                    * params.mod_index2;

            let inc1 = mod_harm_freq / os_rate;
            advance(&mut self.harm_phase, inc1);
            let mod_osc_freq = osc_freq
                + self.harm.audio(time, self.harm_phase + params.phase_offset1, inc1)
                    * harm_freq
                    * self.mod_index.value(time)
                    * params.mod_index;

            let inc0 = mod_osc_freq / os_rate;
            advance(&mut self.osc_phase, inc0);
            let sample = self.osc.audio(time, self.osc_phase + params.phase_offset0, inc0) * params.vol / 20.0;

            if mono {
                dest.channel_mut(0)[pos] += sample;
            } else {
                let (l, r) = pan_gains(self.state.pan);
                dest.channel_mut(0)[pos] += sample * l;
                dest.channel_mut(1)[pos] += sample * r;
            }
            time += step_ms;
        }
    }
}

impl MidiVoice for FmVoice {
    type Params = FmVoiceParams;

    fn create(setup: &EngineSetup, _slot: usize) -> Self {
        Self {
            state: VoiceState::default(),
            params: Arc::new(FmVoiceParams::default()),
            osc: EnvOscillator::new(Waveform::Sine),
            harm: EnvOscillator::new(Waveform::Sine),
            harm2: EnvOscillator::new(Waveform::Sine),
            mod_index: Adsr::default(),
            mod_index2: Adsr::default(),
            osc_phase: 0.0,
            harm_phase: 0.0,
            harm_phase2: 0.0,
            work: ChannelBuffer::new(setup.work_buffer_len()),
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
        self.osc.adsr.start_with(time, amount, &params.osc_adsr, 1.0, 0.0);
        start_modulator(&mut self.harm.adsr, &params.harm_adsr, time);
        start_modulator(&mut self.mod_index, &params.mod_index_adsr, time);
        start_modulator(&mut self.harm2.adsr, &params.harm2_adsr, time);
        start_modulator(&mut self.mod_index2, &params.mod_index2_adsr, time);
    }

    fn stop(&mut self, time: f64) {
        self.osc.adsr.stop(time, true);
        stop_modulator(&mut self.harm.adsr, time);
        stop_modulator(&mut self.mod_index, time);
        stop_modulator(&mut self.harm2.adsr, time);
        stop_modulator(&mut self.mod_index2, time);
    }

    fn clear_voice(&mut self) {
        self.osc.adsr.clear();
        self.harm.adsr.clear();
        self.mod_index.clear();
        self.harm2.adsr.clear();
        self.mod_index2.clear();
        self.osc_phase = 0.0;
        self.harm_phase = 0.0;
        self.harm_phase2 = 0.0;
    }

    fn process(&mut self, time: f64, out: &mut ChannelBuffer, ctx: &RenderContext<'_>) -> bool {
        if self.is_done(time) {
            return false;
        }
        let mut work = core::mem::take(&mut self.work);
        render_oversampled(&mut work, out, ctx, |dest, oversampling, start| {
            self.render_into(time, dest, oversampling, start, ctx);
            true
        });
        self.work = work;
        true
    }

    fn set_voice_params(&mut self, params: Arc<Self::Params>) {
        self.params = params;
    }

    fn is_done(&self, time: f64) -> bool {
        self.osc.adsr.is_done(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyvox_core::Tuning;

    fn voice_with(params: FmVoiceParams) -> FmVoice {
        let setup = EngineSetup::new(48000.0, 512).with_max_oversampling(4);
        let mut voice = FmVoice::create(&setup, 0);
        voice.set_voice_params(Arc::new(params));
        voice.set_pitch(69.0);
        voice
    }

    fn render(voice: &mut FmVoice, oversampling: usize, len: usize) -> Vec<f32> {
        let tuning = Tuning::default();
        let ctx = RenderContext::new(48000.0, &tuning).with_oversampling(oversampling);
        let mut out = ChannelBuffer::with_channels(len, 1);
        voice.process(0.0, &mut out, &ctx);
        out.channel(0).to_vec()
    }

    #[test]
    fn test_no_modulation_is_plain_sine() {
        let mut voice = voice_with(FmVoiceParams {
            vol: 2.0,
            ..FmVoiceParams::default()
        });
        voice.start(0.0, 1.0);
        let out = render(&mut voice, 1, 4800);
        let peak = out[960..].iter().fold(0.0_f32, |m, &s| m.max(s.abs()));
        assert!((peak - 0.1).abs() < 0.002, "Expected 0.1 peak, got {peak}");
        let crossings = out[960..].windows(2).filter(|w| w[0] <= 0.0 && w[1] > 0.0).count() as i32;
        assert!((crossings - 35).abs() <= 1, "Expected ~35 cycles, got {crossings}");
    }

    #[test]
    fn test_modulation_adds_harmonics() {
        let flatness = |params: FmVoiceParams| {
            let mut voice = voice_with(params);
            voice.start(0.0, 1.0);
            let out = render(&mut voice, 1, 4800);
            // sum of absolute first differences grows with bright content
            out[960..].windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f32>()
        };
        let plain = flatness(FmVoiceParams::default());
        let bright = flatness(FmVoiceParams {
            mod_index: 5.0,
            harm_ratio: 2.0,
            ..FmVoiceParams::default()
        });
        assert!(bright > plain * 1.5, "Expected brighter output, got {bright} vs {plain}");
    }

    #[test]
    fn test_third_operator_modulates_the_chain() {
        let render_with = |mod_index2: f32| {
            let mut voice = voice_with(FmVoiceParams {
                mod_index: 2.0,
                harm_ratio: 1.0,
                harm_ratio2: 3.0,
                mod_index2,
                ..FmVoiceParams::default()
            });
            voice.start(0.0, 1.0);
            render(&mut voice, 1, 2400)
        };
        let two_op = render_with(0.0);
        let three_op = render_with(4.0);
        let diff: f32 = two_op.iter().zip(&three_op).map(|(a, b)| (a - b).abs()).sum();
        assert!(diff > 1.0, "second modulator should reshape the output, diff {diff}");
    }

    #[test]
    fn test_oversampled_render_matches_level() {
        let mut plain = voice_with(FmVoiceParams::default());
        let mut over = voice_with(FmVoiceParams::default());
        plain.start(0.0, 1.0);
        over.start(0.0, 1.0);
        let a = render(&mut plain, 1, 512);
        let b = render(&mut over, 4, 512);
        let rms = |v: &[f32]| (v[256..].iter().map(|s| s * s).sum::<f32>() / 256.0).sqrt();
        assert!((rms(&a) - rms(&b)).abs() < 0.005);
    }

    #[test]
    fn test_long_block_renders_in_chunks() {
        let params = FmVoiceParams {
            mod_index: 3.0,
            harm_ratio: 2.0,
            ..FmVoiceParams::default()
        };
        let mut wide = voice_with(params.clone());
        let small_setup = EngineSetup::new(48000.0, 64).with_max_oversampling(2);
        let mut narrow = FmVoice::create(&small_setup, 0);
        narrow.set_voice_params(Arc::new(params));
        narrow.set_pitch(69.0);
        wide.start(0.0, 1.0);
        narrow.start(0.0, 1.0);

        let a = render(&mut wide, 2, 512);
        let b = render(&mut narrow, 2, 512);
        assert!(b[400..].iter().any(|&s| s != 0.0));
        for (i, (x, y)) in a.iter().zip(&b).enumerate() {
            assert!((x - y).abs() < 1e-3, "sample {i}: {x} vs {y}");
        }
    }

    #[test]
    fn test_gate_modulators_sustain_through_release() {
        let mut voice = voice_with(FmVoiceParams::default());
        voice.start(0.0, 1.0);
        voice.stop(50.0);
        assert_eq!(voice.harm.adsr.stop_time(55.0), None);
        assert!(voice.osc.adsr.stop_time(55.0).is_some());
        assert!(voice.is_done(61.0));
    }

    #[test]
    fn test_clear_resets_phases() {
        let mut voice = voice_with(FmVoiceParams::default());
        voice.start(0.0, 1.0);
        render(&mut voice, 1, 100);
        voice.clear_voice();
        assert_eq!(voice.osc_phase, 0.0);
        assert!(voice.is_done(0.0));
    }
}
