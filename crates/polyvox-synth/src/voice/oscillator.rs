//! Subtractive oscillator voice with unison, sync and a low-pass filter.

use std::sync::Arc;

use libm::exp2f;
use polyvox_core::{Biquad, ChannelBuffer, Xorshift32, lerp, pan_gains, wrap_phase};

use super::{MidiVoice, VoiceState, velocity_envelope_curve, velocity_envelope_scale, velocity_volume};
use crate::context::{EngineSetup, RenderContext};
use crate::envelope::Adsr;
use crate::oscillator::{Oscillator, Waveform};

/// Maximum stacked oscillators per note.
pub const MAX_UNISON: usize = 8;

/// Phase period of the unison accumulators, in cycles. Two cycles so the
/// shuffle pattern can span a pair.
const PHASE_PERIOD: f32 = 2.0;

/// Oscillator sync source.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SyncMode {
    /// Free running.
    #[default]
    None,
    /// The audible oscillator runs at this fixed frequency (Hz) and is reset
    /// by the note's phase.
    Frequency(f32),
    /// The audible oscillator runs at this multiple of the note frequency.
    Ratio(f32),
}

/// Parameters for [`OscillatorVoice`].
#[derive(Debug, Clone)]
pub struct OscillatorVoiceParams {
    /// Amplitude envelope.
    pub adsr: Adsr,
    /// Cutoff envelope.
    pub filter_adsr: Adsr,
    /// Cutoff at the top of the filter envelope. `None` bypasses the filter.
    pub filter_cutoff_max: Option<f32>,
    /// Cutoff at the bottom of the filter envelope.
    pub filter_cutoff_min: f32,
    /// Filter resonance.
    pub filter_q: f32,
    /// Output level.
    pub vol: f32,
    /// Waveform.
    pub waveform: Waveform,
    /// Pulse duty cycle.
    pub pulse_width: f32,
    /// Two-cycle swing amount.
    pub shuffle: f32,
    /// Edge rounding amount.
    pub soften: f32,
    /// Frequency multiplier.
    pub mult: f32,
    /// Unison detune spread in semitones.
    pub detune: f32,
    /// Stacked oscillators, `1..=MAX_UNISON`.
    pub unison: usize,
    /// Stereo spread of the unison stack.
    pub unison_width: f32,
    /// Start phase offset in cycles.
    pub phase_offset: f32,
    /// Sync mode.
    pub sync: SyncMode,
    /// Velocity to output level.
    pub vel_to_volume: f32,
    /// Velocity to envelope speed.
    pub vel_to_envelope: f32,
    /// Update controls once per block instead of per sample.
    pub lite_cpu_mode: bool,
}

impl Default for OscillatorVoiceParams {
    fn default() -> Self {
        Self {
            adsr: Adsr::new(10.0, 0.0, 1.0, 10.0),
            filter_adsr: Adsr::new(1.0, 0.0, 1.0, 1000.0),
            filter_cutoff_max: None,
            filter_cutoff_min: 10.0,
            filter_q: core::f32::consts::FRAC_1_SQRT_2,
            vol: 0.25,
            waveform: Waveform::Square,
            pulse_width: 0.5,
            shuffle: 0.0,
            soften: 0.0,
            mult: 1.0,
            detune: 0.0,
            unison: 1,
            unison_width: 0.0,
            phase_offset: 0.0,
            sync: SyncMode::None,
            vel_to_volume: 1.0,
            vel_to_envelope: 0.0,
            lite_cpu_mode: false,
        }
    }
}

#[derive(Debug, Clone)]
struct UnisonOsc {
    osc: Oscillator,
    phase: f32,
    sync_phase: f32,
    phase_inc: f32,
    detune_factor: f32,
}

/// Per-block control values.
#[derive(Debug, Clone, Copy, Default)]
struct Controls {
    vol: f32,
    sync_inc: f32,
}

/// Oscillator voice.
///
/// Phases survive a retrigger; only [`MidiVoice::clear_voice`] resets them,
/// so legato notes continue without a click.
#[derive(Debug)]
pub struct OscillatorVoice {
    state: VoiceState,
    params: Arc<OscillatorVoiceParams>,
    adsr: Adsr,
    filter_adsr: Adsr,
    use_filter: bool,
    filter_left: Biquad,
    filter_right: Biquad,
    filter_settings: (f32, f32),
    unison: [UnisonOsc; MAX_UNISON],
    rng: Xorshift32,
}

impl OscillatorVoice {
    fn unison_count(&self) -> usize {
        self.params.unison.clamp(1, MAX_UNISON)
    }

    fn update_controls(&mut self, sample_offset: usize, ctx: &RenderContext<'_>) -> Controls {
        ctx.compute_controls(sample_offset);
        let params = &self.params;
        let unison = self.unison_count();
        let freq = ctx.tuning.pitch_to_freq(self.state.pitch_at(sample_offset)) * params.mult;
        let sync_inc = match params.sync {
            SyncMode::None => 0.0,
            SyncMode::Frequency(hz) => hz / ctx.sample_rate,
            SyncMode::Ratio(ratio) => freq * ratio / ctx.sample_rate,
        };
        let spread = params.detune * (1.0 - self.state.pressure_at(sample_offset)) / 12.0;
        for u in &mut self.unison[..unison] {
            u.phase_inc = freq * exp2f(spread * u.detune_factor) / ctx.sample_rate;
        }
        Controls {
            vol: params.vol * 0.4 / unison as f32,
            sync_inc,
        }
    }
}

impl MidiVoice for OscillatorVoice {
    type Params = OscillatorVoiceParams;

    fn create(_setup: &EngineSetup, slot: usize) -> Self {
        let mut voice = Self {
            state: VoiceState::default(),
            params: Arc::new(OscillatorVoiceParams::default()),
            adsr: Adsr::default(),
            filter_adsr: Adsr::default(),
            use_filter: false,
            filter_left: Biquad::new(),
            filter_right: Biquad::new(),
            filter_settings: (0.0, 0.0),
            unison: core::array::from_fn(|u| UnisonOsc {
                osc: Oscillator::default(),
                phase: 0.0,
                sync_phase: 0.0,
                phase_inc: 0.0,
                detune_factor: 0.0,
            }
            .seeded(super::slot_seed(slot, u as u32 + 1))),
            rng: Xorshift32::new(super::slot_seed(slot, 0x05C1)),
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
        let velocity = if params.vel_to_volume > 1.0 {
            libm::powf(amount, params.vel_to_volume)
        } else {
            amount
        };
        let volume = velocity_volume(amount, params.vel_to_volume);
        let cutoff_scale = 1.0 + (params.vel_to_envelope - 1.0).max(0.0);
        let time_scale = velocity_envelope_scale(velocity, params.vel_to_envelope);
        let curve = velocity_envelope_curve(velocity, params.vel_to_envelope);

        self.adsr.start_with(time, volume, &params.adsr, 1.0, curve);

        self.use_filter = params.filter_cutoff_max.is_some();
        if self.use_filter {
            self.filter_adsr
                .start_with(time, cutoff_scale, &params.filter_adsr, time_scale, curve);
        }
    }

    fn stop(&mut self, time: f64) {
        self.adsr.stop(time, true);
        if self.use_filter {
            self.filter_adsr.stop(time, false);
        }
    }

    fn clear_voice(&mut self) {
        self.adsr.clear();
        self.filter_adsr.clear();
        self.filter_left.clear();
        self.filter_right.clear();
        for u in &mut self.unison {
            u.phase = 0.0;
            u.sync_phase = 0.0;
        }
        // fresh spread for every new note, kept across retriggers
        self.unison[0].detune_factor = 1.0;
        self.unison[1].detune_factor = 0.0;
        for u in &mut self.unison[2..] {
            u.detune_factor = self.rng.next_bipolar();
        }
    }

    fn process(&mut self, time: f64, out: &mut ChannelBuffer, ctx: &RenderContext<'_>) -> bool {
        if self.is_done(time) {
            return false;
        }

        let params = Arc::clone(&self.params);
        let unison = self.unison_count();
        for u in &mut self.unison[..unison] {
            u.osc.set_waveform(params.waveform);
            u.osc.set_pulse_width(params.pulse_width);
            u.osc.set_shuffle(params.shuffle);
            u.osc.set_soften(params.soften);
        }

        let mono = out.num_active_channels() == 1;
        let ms_per_sample = ctx.ms_per_sample();
        let mut controls = self.update_controls(0, ctx);
        let mut time = time;

        for pos in 0..out.buffer_size() {
            if pos > 0 && !params.lite_cpu_mode {
                controls = self.update_controls(pos, ctx);
            }

            let level = self.adsr.value(time);
            let mut left = 0.0;
            let mut right = 0.0;
            for (u, osc) in self.unison[..unison].iter_mut().enumerate() {
                match wrap_phase(osc.phase + osc.phase_inc, PHASE_PERIOD) {
                    Some(p) => {
                        if p < osc.phase {
                            osc.sync_phase = 0.0;
                        }
                        osc.phase = p;
                    }
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            phase_inc = osc.phase_inc,
                            pitch = self.state.pitch,
                            "non-finite oscillator phase, resetting"
                        );
                        osc.phase = 0.0;
                        osc.phase_inc = 0.0;
                    }
                }
                osc.sync_phase += controls.sync_inc;
                if !osc.sync_phase.is_finite() {
                    osc.sync_phase = 0.0;
                }

                let phase = if params.sync == SyncMode::None {
                    osc.phase + params.phase_offset * (1.0 + u as f32 / unison as f32)
                } else {
                    osc.sync_phase
                };
                let dt = if params.sync == SyncMode::None {
                    osc.phase_inc
                } else {
                    controls.sync_inc
                };
                let mut sample = osc.osc.value(phase, dt) * level * controls.vol;
                if u >= 2 {
                    sample *= 1.0 - osc.detune_factor * 0.5;
                }

                if mono {
                    left += sample;
                } else {
                    let unison_pan = match (unison, u) {
                        (1, _) => 0.0,
                        (_, 0) => -1.0,
                        (_, 1) => 1.0,
                        _ => osc.detune_factor,
                    };
                    let (l, r) = pan_gains(self.state.pan + unison_pan * params.unison_width);
                    left += sample * l;
                    right += sample * r;
                }
            }

            if self.use_filter {
                let max = params.filter_cutoff_max.unwrap_or(ctx.sample_rate * 0.5);
                let cutoff = lerp(params.filter_cutoff_min, max, self.filter_adsr.value(time))
                    * (1.0 - self.state.mod_wheel_at(pos) * 0.9);
                if (cutoff, params.filter_q) != self.filter_settings {
                    self.filter_left.set_lowpass(cutoff, params.filter_q, ctx.sample_rate);
                    self.filter_right.set_lowpass(cutoff, params.filter_q, ctx.sample_rate);
                    self.filter_settings = (cutoff, params.filter_q);
                }
                left = self.filter_left.process(left);
                if !mono {
                    right = self.filter_right.process(right);
                }
            }

            out.channel_mut(0)[pos] += left;
            if !mono {
                out.channel_mut(1)[pos] += right;
            }
            time += ms_per_sample;
        }
        true
    }

    fn set_voice_params(&mut self, params: Arc<Self::Params>) {
        self.params = params;
    }

    fn is_done(&self, time: f64) -> bool {
        self.adsr.is_done(time)
    }
}

impl UnisonOsc {
    fn seeded(mut self, seed: u32) -> Self {
        self.osc.seed_noise(seed);
        self
    }
}
