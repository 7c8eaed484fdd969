//! Plucked-string voice using a Karplus-Strong feedback loop.
//!
//! A short enveloped exciter is fed into a delay line one period long. The
//! delayed signal passes through a one-pole low-pass and back into the line.

use std::sync::Arc;

use libm::{exp2f, powf, sqrtf};
use polyvox_core::{ChannelBuffer, DelayLine, Ramp, Xorshift32, flush_denormal, lerp, pan_gains};

use super::{MidiVoice, VoiceState, render_oversampled, velocity_envelope_scale};
use crate::context::{EngineSetup, RenderContext};
use crate::envelope::{Adsr, Stage};
use crate::oscillator::{Oscillator, Waveform};

/// Time a released string takes to fall silent, in ms.
const MUTE_MS: f64 = 400.0;

/// Exciter phase at note start. A quarter cycle keeps the sine exciter
/// roughly DC free.
const EXCITER_START_PHASE: f32 = 0.25;

/// What is fed into the string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ExciterSource {
    /// Sine burst at the exciter frequency.
    Sin,
    /// White noise burst.
    Noise,
    /// Noise for high notes, sine for low ones.
    #[default]
    Mix,
    /// Saw burst at the exciter frequency.
    Saw,
    /// External input, shaped by the exciter envelope.
    Input,
    /// External input fed in unshaped; only the resonance is heard.
    InputNoEnvelope,
}

/// Parameters for [`KarplusStrongVoice`].
#[derive(Debug, Clone)]
pub struct KarplusStrongVoiceParams {
    /// Damping filter rate; higher is darker.
    pub filter: f32,
    /// Loop feedback, `0..=1`.
    pub feedback: f32,
    /// Exciter source.
    pub source: ExciterSource,
    /// Invert the feedback (odd harmonics only, pitch corrected by an octave).
    pub invert: bool,
    /// Exciter oscillator frequency in Hz.
    pub exciter_freq: f32,
    /// Exciter attack in ms.
    pub exciter_attack: f32,
    /// Exciter decay in ms.
    pub exciter_decay: f32,
    /// Constant exciter level added to the envelope.
    pub excitation: f32,
    /// How strongly damping tracks pitch, as a power-of-two exponent.
    pub pitch_tone: f32,
    /// Velocity to output level.
    pub vel_to_volume: f32,
    /// Velocity to exciter attack time.
    pub vel_to_envelope: f32,
    /// Update controls once per block instead of per sample.
    pub lite_cpu_mode: bool,
}

impl Default for KarplusStrongVoiceParams {
    fn default() -> Self {
        Self {
            filter: 1.0,
            feedback: 0.98,
            source: ExciterSource::Mix,
            invert: false,
            exciter_freq: 100.0,
            exciter_attack: 1.0,
            exciter_decay: 3.0,
            excitation: 0.0,
            pitch_tone: 0.0,
            vel_to_volume: 0.5,
            vel_to_envelope: 0.5,
            lite_cpu_mode: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Controls {
    pitch: f32,
    period: f32,
    filter_lerp: f32,
    osc_inc: f32,
}

/// Karplus-Strong voice.
#[derive(Debug)]
pub struct KarplusStrongVoice {
    state: VoiceState,
    params: Arc<KarplusStrongVoiceParams>,
    env: Adsr,
    osc: Oscillator,
    osc_phase: f32,
    noise: Xorshift32,
    delay: DelayLine,
    filtered: f32,
    mute: Ramp,
    active: bool,
    work: ChannelBuffer,
}

impl KarplusStrongVoice {
    fn controls(&self, sample_offset: usize, rate: f32, oversampling: usize, ctx: &RenderContext<'_>) -> Controls {
        ctx.compute_controls(sample_offset);
        let params = &self.params;
        let mut pitch = self.state.pitch_at(sample_offset);
        if params.invert {
            // inverted feedback resonates an octave low
            pitch += 12.0;
        }
        let freq = ctx.tuning.pitch_to_freq(pitch);
        let filter_rate = params.filter
            * powf(freq / 300.0, exp2f(params.pitch_tone))
            * (1.0 + self.state.mod_wheel_at(sample_offset));
        Controls {
            pitch,
            period: rate / freq,
            filter_lerp: exp2f(-filter_rate / oversampling as f32).clamp(0.0, 1.0),
            osc_inc: params.exciter_freq / rate,
        }
    }

    fn render_into(
        &mut self,
        time: f64,
        dest: &mut ChannelBuffer,
        oversampling: usize,
        start: usize,
        ctx: &RenderContext<'_>,
    ) {
        let params = Arc::clone(&self.params);
        let rate = ctx.sample_rate * oversampling as f32;
        let step_ms = ctx.ms_per_sample() / oversampling as f64;
        let mono = dest.num_active_channels() == 1;
        let mut time = time + start as f64 * ctx.ms_per_sample();

        self.osc.set_waveform(if params.source == ExciterSource::Saw {
            Waveform::Saw
        } else {
            Waveform::Sine
        });

        let mut controls = self.controls(start, rate, oversampling, ctx);
        for pos in 0..dest.buffer_size() {
            let offset = start + pos / oversampling;
            if pos > 0 && !params.lite_cpu_mode {
                controls = self.controls(offset, rate, oversampling, ctx);
            }

            self.osc_phase += controls.osc_inc;
            self.osc_phase -= libm::floorf(self.osc_phase);
            let osc_sample = self.osc.value(self.osc_phase, controls.osc_inc);
            let noise_sample = self.noise.next_bipolar();
            let pitch_blend = ((controls.pitch - 40.0) / 60.0).clamp(0.0, 1.0);
            let pitch_blend = pitch_blend * pitch_blend;

            let mut sample = match params.source {
                ExciterSource::Sin | ExciterSource::Saw => osc_sample,
                ExciterSource::Noise => noise_sample,
                ExciterSource::Mix => lerp(osc_sample, noise_sample, pitch_blend),
                ExciterSource::Input | ExciterSource::InputNoEnvelope => ctx
                    .input
                    .and_then(|input| input.channel(0).get(offset).copied())
                    .unwrap_or(0.0),
            };
            if params.source != ExciterSource::InputNoEnvelope {
                sample *= self.env.value(time) + params.excitation;
            }

            let delayed = if controls.period.is_finite() {
                self.delay.read_interpolated(controls.period - 1.0)
            } else {
                0.0
            };
            self.filtered = flush_denormal(lerp(delayed, self.filtered, controls.filter_lerp));
            let mut feedback = self.filtered
                * sqrtf((params.feedback + self.state.pressure_at(offset) * 0.02).max(0.0))
                * self.mute.value(time);
            if params.invert {
                feedback = -feedback;
            }

            let looped = flush_denormal(sample + feedback);
            self.delay.write(looped);
            let output = if params.source == ExciterSource::InputNoEnvelope {
                feedback
            } else {
                looped
            };

            if mono {
                dest.channel_mut(0)[pos] += output;
            } else {
                let (l, r) = pan_gains(self.state.pan);
                dest.channel_mut(0)[pos] += output * l;
                dest.channel_mut(1)[pos] += output * r;
            }
            time += step_ms;
        }
    }
}

impl MidiVoice for KarplusStrongVoice {
    type Params = KarplusStrongVoiceParams;

    fn create(setup: &EngineSetup, slot: usize) -> Self {
        let mut env = Adsr::default();
        env.set_num_stages(2);
        env.set_has_sustain_stage(false);
        *env.stage_mut(0) = Stage {
            target: 1.0,
            time: 3.0,
            curve: 0.0,
        };
        *env.stage_mut(1) = Stage {
            target: 0.0,
            time: 3.0,
            curve: 0.0,
        };
        // one second of history at the highest rendering rate
        let delay_len = (setup.sample_rate as usize).max(1) * setup.max_oversampling.max(1);

        let mut voice = Self {
            state: VoiceState::default(),
            params: Arc::new(KarplusStrongVoiceParams::default()),
            env,
            osc: Oscillator::new(Waveform::Sine),
            osc_phase: 0.0,
            noise: Xorshift32::new(super::slot_seed(slot, 0x4B53)),
            delay: DelayLine::new(delay_len),
            filtered: 0.0,
            mute: Ramp::new(),
            active: false,
            work: ChannelBuffer::new(setup.work_buffer_len()),
        };
        voice.clear_voice();
        voice
    }

    fn voice_state(&self) -> &VoiceState {
        &self.state
    }

    fn voice_state_mut(&mut self) -> &mut VoiceState {
        &mut self.state
    }

    fn start(&mut self, time: f64, amount: f32) {
        let params = Arc::clone(&self.params);
        let volume = lerp(1.0 - params.vel_to_volume, 1.0, amount * amount);
        let env_scale = velocity_envelope_scale(amount, -params.vel_to_envelope);

        self.osc_phase = EXCITER_START_PHASE;
        self.env.clear();
        self.env.stage_mut(0).time = params.exciter_attack * env_scale;
        self.env.stage_mut(1).time = params.exciter_decay;
        self.env.start(time, volume);
        self.env.set_max_sustain(Some(10.0));
        self.mute.set_value(1.0);
        self.active = true;
    }

    fn stop(&mut self, time: f64) {
        self.mute.start(time, 0.0, time + MUTE_MS);
    }

    fn clear_voice(&mut self) {
        self.delay.clear();
        self.filtered = 0.0;
        self.active = false;
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
        !self.active || self.mute.value(time) == 0.0
    }
}
