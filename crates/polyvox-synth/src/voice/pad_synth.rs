//! PADsynth voice: a looping wavetable built from a smeared harmonic spectrum.
//!
//! Every harmonic contributes a Gaussian band to a magnitude spectrum. The
//! spectrum gets deterministic random phases and is inverse transformed into
//! a table that loops seamlessly. The table is built on the first block after
//! a note starts, into buffers allocated when the voice is created.

use std::sync::Arc;

use libm::{cosf, exp2f, expf, powf, sinf, sqrtf};
use polyvox_core::{ChannelBuffer, deterministic_random, lerp, pan_gains};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::{MidiVoice, VoiceState, velocity_envelope_curve};
use crate::context::{EngineSetup, RenderContext};
use crate::envelope::Adsr;

/// Wavetable length at an undersample setting of 0.
pub const PAD_TABLE_SIZE: usize = 8192;

/// Largest undersample setting; each step doubles the table.
pub const MAX_PAD_UNDERSAMPLE: u32 = 2;

/// Bound on the harmonic count after relative scaling.
pub const MAX_PAD_HARMONICS: i32 = 256;

/// Gaussian profile cut-off; `exp(-x)` beyond this is negligible.
const PROFILE_LIMIT: f32 = 14.712_806;

/// Harmonic amplitude rolloff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PadAmplitude {
    /// Every harmonic at full level.
    Flat,
    /// `1/n` for odd harmonics, `2/n` for even ones.
    Step,
    /// `1/sqrt(n)`.
    #[default]
    Sqrt,
}

/// Parameters for [`PadSynthVoice`].
#[derive(Debug, Clone)]
pub struct PadSynthVoiceParams {
    /// Amplitude envelope.
    pub adsr: Adsr,
    /// Harmonic count. Negative values build a subharmonic series.
    pub harmonics: i32,
    /// Scale the harmonic count with pitch so every note spans the same band.
    pub harmonics_relative: bool,
    /// Band width of the fundamental in cents.
    pub bandwidth: f32,
    /// How band width grows with harmonic number.
    pub bandwidth_scale: f32,
    /// Inharmonic stretch per harmonic.
    pub spread: f32,
    /// Amplitude rolloff.
    pub amplitude: PadAmplitude,
    /// Right channel table offset as a fraction of the table.
    pub channel_offset: f32,
    /// Table length doubling steps, `0..=MAX_PAD_UNDERSAMPLE`.
    pub undersample: u32,
    /// Output level.
    pub vol: f32,
    /// Velocity to output level.
    pub vel_to_volume: f32,
    /// Velocity to envelope curve.
    pub vel_to_envelope: f32,
}

impl Default for PadSynthVoiceParams {
    fn default() -> Self {
        Self {
            adsr: Adsr::new(10.0, 0.0, 1.0, 10.0),
            harmonics: 16,
            harmonics_relative: false,
            bandwidth: 40.0,
            bandwidth_scale: 1.0,
            spread: 0.0,
            amplitude: PadAmplitude::Sqrt,
            channel_offset: 0.5,
            undersample: 0,
            vol: 1.0,
            vel_to_volume: 0.5,
            vel_to_envelope: 0.0,
        }
    }
}

/// PADsynth voice.
pub struct PadSynthVoice {
    state: VoiceState,
    params: Arc<PadSynthVoiceParams>,
    adsr: Adsr,
    plans: Vec<Arc<dyn Fft<f32>>>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    table: Vec<f32>,
    table_len: usize,
    table_pitch: f32,
    needs_table: bool,
    read_pos: f64,
}

impl core::fmt::Debug for PadSynthVoice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PadSynthVoice")
            .field("state", &self.state)
            .field("table_len", &self.table_len)
            .field("table_pitch", &self.table_pitch)
            .field("needs_table", &self.needs_table)
            .finish_non_exhaustive()
    }
}

impl PadSynthVoice {
    /// Rebuilds the wavetable for `pitch`.
    fn build_table(&mut self, pitch: f32, ctx: &RenderContext<'_>) {
        let params = Arc::clone(&self.params);
        let undersample = params.undersample.min(MAX_PAD_UNDERSAMPLE);
        let len = PAD_TABLE_SIZE << undersample;
        let half = len / 2;
        let sample_rate = ctx.sample_rate;
        let freq = ctx.tuning.pitch_to_freq(pitch);

        let spectrum = &mut self.spectrum[..len];
        spectrum.fill(Complex::new(0.0, 0.0));

        let mut harmonics = params.harmonics;
        if params.harmonics_relative && harmonics != 0 && freq > 0.0 {
            let scale = if harmonics > 0 { 440.0 / freq } else { freq / 440.0 };
            harmonics = (scale * harmonics as f32) as i32;
        }
        let harmonics = harmonics.clamp(-MAX_PAD_HARMONICS, MAX_PAD_HARMONICS);

        let bandwidth = exp2f(params.bandwidth / 1200.0) - 1.0;
        for nh in 1..=harmonics.unsigned_abs() {
            let n = nh as f32;
            let series = if harmonics > 0 { n } else { 1.0 / n };
            let relf = series * (1.0 + n * params.spread);
            let bw_hz = bandwidth * freq * powf(relf, params.bandwidth_scale);
            let bwi = bw_hz / (2.0 * sample_rate);
            let fi = freq * relf / sample_rate;
            if bwi <= 0.0 || !bwi.is_finite() {
                continue;
            }
            let amp = match params.amplitude {
                PadAmplitude::Flat => 1.0,
                PadAmplitude::Step => (2 - nh % 2) as f32 / n,
                PadAmplitude::Sqrt => 1.0 / sqrtf(n),
            };
            for (i, bin) in spectrum[..half].iter_mut().enumerate() {
                let x = (i as f32 / len as f32 - fi) / bwi;
                let x = x * x;
                if x <= PROFILE_LIMIT {
                    bin.re += expf(-x) / bwi * amp;
                }
            }
        }

        let seed = pitch as i32 as u32;
        for i in 1..half {
            let magnitude = spectrum[i].re;
            let phase = deterministic_random(seed, i as u32) * 2.0 * core::f32::consts::PI;
            let bin = Complex::new(magnitude * cosf(phase), magnitude * sinf(phase));
            spectrum[i] = bin;
            spectrum[len - i] = bin.conj();
        }
        // no DC or Nyquist content
        spectrum[0] = Complex::new(0.0, 0.0);
        spectrum[half] = Complex::new(0.0, 0.0);

        let plan = &self.plans[undersample as usize];
        let scratch_len = plan.get_inplace_scratch_len();
        plan.process_with_scratch(spectrum, &mut self.scratch[..scratch_len]);

        let table = &mut self.table[..len];
        let mut max = 0.0_f32;
        for (out, bin) in table.iter_mut().zip(spectrum.iter()) {
            *out = bin.re;
            max = max.max(bin.re.abs());
        }
        let norm = 1.0 / (max.max(1e-5) * core::f32::consts::SQRT_2);
        for s in table.iter_mut() {
            *s *= norm;
        }

        self.table_len = len;
        self.table_pitch = pitch;
        self.read_pos = 0.0;
        self.needs_table = false;

        #[cfg(feature = "tracing")]
        tracing::debug!(pitch, len, harmonics, "built pad table");
    }

    #[inline]
    fn read(&self, pos: f64) -> f32 {
        let len = self.table_len;
        let whole = pos.floor();
        let frac = (pos - whole) as f32;
        let i = (whole as usize) % len;
        let a = self.table[i];
        let b = self.table[(i + 1) % len];
        a + (b - a) * frac
    }
}

impl MidiVoice for PadSynthVoice {
    type Params = PadSynthVoiceParams;

    fn create(_setup: &EngineSetup, _slot: usize) -> Self {
        let max_len = PAD_TABLE_SIZE << MAX_PAD_UNDERSAMPLE;
        let mut planner = FftPlanner::new();
        let plans: Vec<Arc<dyn Fft<f32>>> = (0..=MAX_PAD_UNDERSAMPLE)
            .map(|u| planner.plan_fft_inverse(PAD_TABLE_SIZE << u))
            .collect();
        let scratch_len = plans
            .iter()
            .map(|p| p.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);

        Self {
            state: VoiceState::default(),
            params: Arc::new(PadSynthVoiceParams::default()),
            adsr: Adsr::default(),
            plans,
            spectrum: vec![Complex::new(0.0, 0.0); max_len],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            table: vec![0.0; max_len],
            table_len: PAD_TABLE_SIZE,
            table_pitch: 0.0,
            needs_table: true,
            read_pos: 0.0,
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
        let volume = lerp(1.0 - params.vel_to_volume, 1.0, amount * amount);
        let curve = velocity_envelope_curve(amount, params.vel_to_envelope);
        self.adsr.start_with(time, volume, &params.adsr, 1.0, curve);
        self.needs_table = true;
    }

    fn stop(&mut self, time: f64) {
        self.adsr.stop(time, true);
    }

    fn clear_voice(&mut self) {
        self.adsr.clear();
    }

    fn process(&mut self, time: f64, out: &mut ChannelBuffer, ctx: &RenderContext<'_>) -> bool {
        if self.is_done(time) {
            return false;
        }
        if self.needs_table {
            ctx.compute_controls(0);
            self.build_table(self.state.pitch, ctx);
        }

        let params = Arc::clone(&self.params);
        let mono = out.num_active_channels() == 1;
        let ms_per_sample = ctx.ms_per_sample();
        let offset = (f64::from(params.channel_offset.clamp(0.0, 1.0)) * self.table_len as f64).floor();
        let len = self.table_len as f64;
        let mut time = time;

        for pos in 0..out.buffer_size() {
            ctx.compute_controls(pos);
            let rate = f64::from(exp2f((self.state.pitch_at(pos) - self.table_pitch) / 12.0));
            let level = self.adsr.value(time) * params.vol;

            if mono {
                out.channel_mut(0)[pos] += self.read(self.read_pos) * level;
            } else {
                let (l, r) = pan_gains(self.state.pan);
                let left = self.read(self.read_pos);
                let right = self.read(self.read_pos + offset);
                out.channel_mut(0)[pos] += left * l * level;
                out.channel_mut(1)[pos] += right * r * level;
            }

            self.read_pos += if rate.is_finite() { rate } else { 1.0 };
            if self.read_pos >= len {
                self.read_pos -= len * (self.read_pos / len).floor();
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
