//! Voice allocation and scheduling.
//!
//! [`PolyphonyMgr`] maps note-on/note-off events onto a fixed pool of voices.
//! Each slot moves through
//!
//! ```text
//! Free (pitch None) -> Active (note on) -> Releasing (note off) -> Free
//! ```
//!
//! and returns to `Free` once its voice reports done after a block. New
//! notes take the next free slot after the last one used, so recently
//! released voices get time to finish their tails. When every slot is busy
//! the oldest note is stolen: its next [`VOICE_FADE_SAMPLES`] samples are
//! rendered into a fade ring, faded linearly to silence and mixed into the
//! following blocks, so the steal does not click.
//!
//! Nothing here allocates after construction.

use std::sync::Arc;

use polyvox_core::ChannelBuffer;

use crate::context::{EngineSetup, RenderContext, floor_power_of_two};
use crate::modulation::Modulation;
use crate::params::{ParamsHandle, Reclaimer};
use crate::voice::MidiVoice;

/// Length of the steal crossfade, in samples.
pub const VOICE_FADE_SAMPLES: usize = 50;

/// Default pool size.
pub const DEFAULT_NUM_VOICES: usize = 16;

/// How a note-on aimed at an occupied slot is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RetriggerPolicy {
    /// Continue the sounding voice unless the new note's pan differs from
    /// the voice's, in which case the old note is faded out and the slot
    /// starts fresh.
    #[default]
    PanChangeStartsNewNote,
    /// Always continue the sounding voice.
    AlwaysPreserve,
}

/// A note-on request.
#[derive(Clone, Default)]
pub struct NoteOn {
    /// MIDI pitch.
    pub pitch: i32,
    /// Velocity in `0..=1`. Squared before it reaches the voice.
    pub amount: f32,
    /// Slot to play on, for per-note-channel control. `None` allocates.
    pub voice_idx: Option<usize>,
    /// Pan and per-note modulation curves.
    pub modulation: Modulation,
}

impl NoteOn {
    /// A note with no slot request and no modulation.
    pub fn new(pitch: i32, amount: f32) -> Self {
        Self {
            pitch,
            amount,
            ..Self::default()
        }
    }

    /// Requests slot `idx`.
    pub fn on_voice(mut self, idx: usize) -> Self {
        self.voice_idx = Some(idx);
        self
    }

    /// Attaches modulation.
    pub fn with_modulation(mut self, modulation: Modulation) -> Self {
        self.modulation = modulation;
        self
    }
}

impl core::fmt::Debug for NoteOn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NoteOn")
            .field("pitch", &self.pitch)
            .field("amount", &self.amount)
            .field("voice_idx", &self.voice_idx)
            .field("pan", &self.modulation.pan)
            .finish()
    }
}

/// One pool slot.
#[derive(Debug)]
pub struct VoiceInfo<V> {
    pitch: Option<i32>,
    voice: V,
    time: f64,
    note_on: bool,
}

impl<V> VoiceInfo<V> {
    /// Pitch held by the slot; `None` when free.
    pub fn pitch(&self) -> Option<i32> {
        self.pitch
    }

    /// True when the slot can be allocated without stealing.
    pub fn is_free(&self) -> bool {
        self.pitch.is_none()
    }

    /// True between note-on and note-off.
    pub fn is_note_on(&self) -> bool {
        self.note_on
    }

    /// Time of the last note-on, in ms.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// The voice.
    pub fn voice(&self) -> &V {
        &self.voice
    }
}

/// Fixed-size polyphonic voice pool.
///
/// # Example
///
/// ```rust
/// use polyvox_core::{ChannelBuffer, Tuning};
/// use polyvox_synth::{EngineSetup, NoteOn, OscillatorVoice, OscillatorVoiceParams, PolyphonyMgr, RenderContext};
///
/// let setup = EngineSetup::new(48000.0, 256);
/// let mut mgr: PolyphonyMgr<OscillatorVoice, 8> =
///     PolyphonyMgr::new(&setup, OscillatorVoiceParams::default());
///
/// let tuning = Tuning::default();
/// let ctx = RenderContext::new(48000.0, &tuning);
/// assert_eq!(mgr.start(0.0, NoteOn::new(60, 1.0), &ctx), Some(0));
/// assert_eq!(mgr.start(0.0, NoteOn::new(64, 1.0), &ctx), Some(1));
///
/// let mut out = ChannelBuffer::with_channels(256, 2);
/// mgr.process(0.0, &mut out, &ctx);
/// assert_eq!(mgr.active_voice_count(), 2);
/// ```
pub struct PolyphonyMgr<V: MidiVoice, const N: usize = DEFAULT_NUM_VOICES> {
    voices: [VoiceInfo<V>; N],
    params: ParamsHandle<V::Params>,
    current_params: Arc<V::Params>,
    voice_limit: usize,
    allow_stealing: bool,
    last_voice: Option<usize>,
    oversampling: usize,
    max_oversampling: usize,
    retrigger: RetriggerPolicy,
    fade_out: ChannelBuffer,
    fade_work: ChannelBuffer,
    fade_pos: usize,
    retired_modulation: Reclaimer<Modulation>,
}

impl<V: MidiVoice, const N: usize> PolyphonyMgr<V, N> {
    /// Builds the pool, creating every voice and buffer up front.
    pub fn new(setup: &EngineSetup, params: V::Params) -> Self {
        Self::with_params_handle(setup, ParamsHandle::new(params))
    }

    /// Builds the pool around an existing parameter handle.
    pub fn with_params_handle(setup: &EngineSetup, params: ParamsHandle<V::Params>) -> Self {
        let current_params = params.load();
        let voices = core::array::from_fn(|slot| {
            let mut voice = V::create(setup, slot);
            voice.set_voice_params(Arc::clone(&current_params));
            VoiceInfo {
                pitch: None,
                voice,
                time: 0.0,
                note_on: false,
            }
        });
        let mut fade_out = ChannelBuffer::new(VOICE_FADE_SAMPLES);
        let mut fade_work = ChannelBuffer::new(VOICE_FADE_SAMPLES);
        fade_out.set_num_active_channels(setup.num_channels);
        fade_work.set_num_active_channels(setup.num_channels);
        Self {
            voices,
            params,
            current_params,
            voice_limit: N,
            allow_stealing: true,
            last_voice: None,
            oversampling: 1,
            max_oversampling: setup.max_oversampling.max(1),
            retrigger: RetriggerPolicy::default(),
            fade_out,
            fade_work,
            fade_pos: 0,
            retired_modulation: Reclaimer::new(),
        }
    }

    /// Handle for publishing new voice parameters from another thread.
    pub fn params_handle(&self) -> ParamsHandle<V::Params> {
        self.params.clone()
    }

    /// Queue of per-note modulation the pool has let go of. Call
    /// [`Reclaimer::collect`] from the control side to free its curves there.
    pub fn modulation_reclaimer(&self) -> Reclaimer<Modulation> {
        self.retired_modulation.clone()
    }

    /// Starts a note. Returns the slot used, or `None` if the pool was full
    /// and stealing is off.
    pub fn start(&mut self, time: f64, note: NoteOn, ctx: &RenderContext<'_>) -> Option<usize> {
        self.refresh_params();

        let amount = note.amount * note.amount;
        let requested = match note.voice_idx {
            Some(idx) if idx >= N => {
                #[cfg(feature = "tracing")]
                tracing::warn!(idx, pool = N, "requested voice out of range, allocating");
                None
            }
            other => other,
        };
        let pan = note.modulation.pan.clamp(-1.0, 1.0);

        let preserve = requested.is_some_and(|idx| {
            let info = &self.voices[idx];
            info.pitch.is_some()
                && match self.retrigger {
                    RetriggerPolicy::AlwaysPreserve => true,
                    RetriggerPolicy::PanChangeStartsNewNote => info.voice.pan() == pan,
                }
        });

        let Some(idx) = requested
            .or_else(|| self.find_free())
            .or_else(|| self.allow_stealing.then(|| self.oldest()))
        else {
            #[cfg(feature = "tracing")]
            tracing::debug!(pitch = note.pitch, "voice pool full, dropping note");
            self.retire_modulation(note.modulation);
            return None;
        };

        if !preserve && !self.voices[idx].voice.is_done(time) {
            self.fade_out_voice(idx, time, ctx);
        }

        let info = &mut self.voices[idx];
        if !preserve {
            info.voice.clear_voice();
        }
        info.voice.set_pitch(note.pitch as f32);
        let old = core::mem::take(&mut info.voice.voice_state_mut().modulation);
        info.voice.set_modulators(note.modulation);
        info.voice.start(time, amount);
        info.voice.set_pan(pan);
        info.pitch = Some(note.pitch);
        info.time = time;
        info.note_on = true;
        self.last_voice = Some(idx);
        self.retire_modulation(old);
        Some(idx)
    }

    /// Releases every held slot playing `pitch`.
    pub fn stop(&mut self, time: f64, pitch: i32) {
        let mut released = false;
        for info in &mut self.voices {
            if info.pitch == Some(pitch) && info.note_on {
                info.voice.stop(time);
                info.note_on = false;
                released = true;
            }
        }
        if !released {
            #[cfg(feature = "tracing")]
            tracing::debug!(pitch, time, "note-off with no held note");
        }
    }

    /// Silences every voice immediately, without a fade.
    pub fn kill_all(&mut self) {
        for info in &mut self.voices {
            info.voice.clear_voice();
            info.note_on = false;
        }
    }

    /// Renders every slot into `out` and mixes in pending steal fades.
    pub fn process(&mut self, time: f64, out: &mut ChannelBuffer, ctx: &RenderContext<'_>) {
        self.refresh_params();

        let channels = out.num_active_channels();
        if channels != self.fade_out.num_active_channels() {
            // a fade pending on a channel that goes quiet must not resurface later
            for ch in channels..self.fade_out.num_total_channels() {
                self.fade_out.channel_mut(ch).fill(0.0);
            }
            self.fade_out.set_num_active_channels(channels);
            self.fade_work.set_num_active_channels(channels);
        }

        let ctx = ctx.with_oversampling(self.oversampling);
        for info in &mut self.voices {
            info.voice.process(time, out, &ctx);
            if info.pitch.is_some() && !info.note_on && info.voice.is_done(time) {
                info.pitch = None;
            }
        }

        let len = out.buffer_size();
        for ch in 0..channels {
            let fade = self.fade_out.channel_mut(ch);
            let dest = out.channel_mut(ch);
            for (i, sample) in dest.iter_mut().enumerate() {
                let idx = (i + self.fade_pos) % VOICE_FADE_SAMPLES;
                *sample += fade[idx];
                fade[idx] = 0.0;
            }
        }
        self.fade_pos = (self.fade_pos + len) % VOICE_FADE_SAMPLES;
    }

    /// Caps how many slots may be allocated, `1..=N`.
    pub fn set_voice_limit(&mut self, limit: usize) {
        self.voice_limit = limit.clamp(1, N);
    }

    /// Current voice limit.
    pub fn voice_limit(&self) -> usize {
        self.voice_limit
    }

    /// Enables stealing the oldest note when the pool is full.
    pub fn set_allow_stealing(&mut self, allow: bool) {
        self.allow_stealing = allow;
    }

    /// Whether stealing is enabled.
    pub fn allow_stealing(&self) -> bool {
        self.allow_stealing
    }

    /// Sets the oversampling factor, rounded down to a power of two and
    /// clamped to the setup maximum.
    pub fn set_oversampling(&mut self, factor: usize) {
        self.oversampling = floor_power_of_two(factor).min(self.max_oversampling);
    }

    /// Current oversampling factor.
    pub fn oversampling(&self) -> usize {
        self.oversampling
    }

    /// Sets the retrigger policy.
    pub fn set_retrigger_policy(&mut self, policy: RetriggerPolicy) {
        self.retrigger = policy;
    }

    /// Current retrigger policy.
    pub fn retrigger_policy(&self) -> RetriggerPolicy {
        self.retrigger
    }

    /// Slot `idx`, if it exists.
    pub fn slot(&self, idx: usize) -> Option<&VoiceInfo<V>> {
        self.voices.get(idx)
    }

    /// Number of slots holding a note, held or releasing.
    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.pitch.is_some()).count()
    }

    /// Pool size.
    pub const fn num_voices(&self) -> usize {
        N
    }

    fn refresh_params(&mut self) {
        let latest = self.params.load();
        if Arc::ptr_eq(&latest, &self.current_params) {
            return;
        }
        for info in &mut self.voices {
            info.voice.set_voice_params(Arc::clone(&latest));
        }
        let old = core::mem::replace(&mut self.current_params, latest);
        self.params.retire(old);
    }

    pub(crate) fn retire_modulation(&self, modulation: Modulation) {
        if modulation.has_curves() {
            self.retired_modulation.retire(modulation);
        }
    }

    fn find_free(&self) -> Option<usize> {
        let limit = self.voice_limit;
        let first = self.last_voice.map_or(0, |last| last + 1);
        (0..limit)
            .map(|i| (first + i) % limit)
            .find(|&idx| self.voices[idx].pitch.is_none())
    }

    fn oldest(&self) -> usize {
        let mut oldest = 0;
        for idx in 1..self.voice_limit {
            if self.voices[idx].time < self.voices[oldest].time {
                oldest = idx;
            }
        }
        oldest
    }

    fn fade_out_voice(&mut self, idx: usize, time: f64, ctx: &RenderContext<'_>) {
        let ctx = ctx.with_oversampling(self.oversampling);
        self.fade_work.clear();
        self.voices[idx].voice.process(time, &mut self.fade_work, &ctx);

        #[cfg(feature = "tracing")]
        tracing::trace!(slot = idx, time, "fading stolen voice");

        for ch in 0..self.fade_out.num_active_channels() {
            let tail = self.fade_work.channel(ch);
            let ring = self.fade_out.channel_mut(ch);
            for (i, sample) in tail.iter().enumerate() {
                let fade = 1.0 - i as f32 / VOICE_FADE_SAMPLES as f32;
                ring[(i + self.fade_pos) % VOICE_FADE_SAMPLES] += sample * fade;
            }
        }
    }
}

impl<V: MidiVoice + core::fmt::Debug, const N: usize> core::fmt::Debug for PolyphonyMgr<V, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PolyphonyMgr")
            .field("voices", &self.voices)
            .field("voice_limit", &self.voice_limit)
            .field("allow_stealing", &self.allow_stealing)
            .field("oversampling", &self.oversampling)
            .field("retrigger", &self.retrigger)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::VoiceState;
    use polyvox_core::Tuning;

    /// Outputs `params * amount` while held, then for `RELEASE_MS` after stop.
    #[derive(Debug)]
    struct TestVoice {
        state: VoiceState,
        params: Arc<f32>,
        start: Option<f64>,
        stop: Option<f64>,
        amount: f32,
        clears: usize,
    }

    const RELEASE_MS: f64 = 10.0;

    impl MidiVoice for TestVoice {
        type Params = f32;

        fn create(_setup: &EngineSetup, _slot: usize) -> Self {
            Self {
                state: VoiceState::default(),
                params: Arc::new(1.0),
                start: None,
                stop: None,
                amount: 0.0,
                clears: 0,
            }
        }

        fn voice_state(&self) -> &VoiceState {
            &self.state
        }

        fn voice_state_mut(&mut self) -> &mut VoiceState {
            &mut self.state
        }

        fn start(&mut self, time: f64, amount: f32) {
            self.start = Some(time);
            self.stop = None;
            self.amount = amount;
        }

        fn stop(&mut self, time: f64) {
            self.stop = Some(time);
        }

        fn clear_voice(&mut self) {
            self.start = None;
            self.stop = None;
            self.clears += 1;
        }

        fn process(&mut self, time: f64, out: &mut ChannelBuffer, _ctx: &RenderContext<'_>) -> bool {
            if self.is_done(time) {
                return false;
            }
            let level = *self.params * self.amount;
            for ch in 0..out.num_active_channels() {
                for s in out.channel_mut(ch) {
                    *s += level;
                }
            }
            true
        }

        fn set_voice_params(&mut self, params: Arc<f32>) {
            self.params = params;
        }

        fn is_done(&self, time: f64) -> bool {
            match (self.start, self.stop) {
                (None, _) => true,
                (Some(_), Some(stop)) => time >= stop + RELEASE_MS,
                (Some(_), None) => false,
            }
        }
    }

    fn mgr<const N: usize>() -> PolyphonyMgr<TestVoice, N> {
        PolyphonyMgr::new(&EngineSetup::new(48000.0, 64), 1.0)
    }

    fn with_ctx<R>(f: impl FnOnce(&RenderContext<'_>) -> R) -> R {
        let tuning = Tuning::default();
        let ctx = RenderContext::new(48000.0, &tuning);
        f(&ctx)
    }

    fn slot_pitches<const N: usize>(mgr: &PolyphonyMgr<TestVoice, N>) -> Vec<Option<i32>> {
        (0..N).map(|i| mgr.slot(i).and_then(VoiceInfo::pitch)).collect()
    }

    #[test]
    fn test_two_voice_scenario_with_stealing() {
        let mut mgr = mgr::<2>();
        with_ctx(|ctx| {
            assert_eq!(mgr.start(0.0, NoteOn::new(60, 1.0), ctx), Some(0));
            assert_eq!(mgr.start(1.0, NoteOn::new(64, 1.0), ctx), Some(1));
            // globally oldest slot is 0
            assert_eq!(mgr.start(2.0, NoteOn::new(67, 1.0), ctx), Some(0));
        });
        assert_eq!(slot_pitches(&mgr), vec![Some(67), Some(64)]);
    }

    #[test]
    fn test_two_voice_scenario_without_stealing() {
        let mut mgr = mgr::<2>();
        mgr.set_allow_stealing(false);
        with_ctx(|ctx| {
            mgr.start(0.0, NoteOn::new(60, 1.0), ctx);
            mgr.start(1.0, NoteOn::new(64, 1.0), ctx);
            assert_eq!(mgr.start(2.0, NoteOn::new(67, 1.0), ctx), None);
        });
        assert_eq!(slot_pitches(&mgr), vec![Some(60), Some(64)]);
        assert_eq!(mgr.slot(0).map(VoiceInfo::time), Some(0.0));
        assert_eq!(mgr.slot(0).map(|s| s.voice().clears), Some(1));
    }

    #[test]
    fn test_round_robin_skips_recent_slot() {
        let mut mgr = mgr::<4>();
        with_ctx(|ctx| {
            assert_eq!(mgr.start(0.0, NoteOn::new(60, 1.0), ctx), Some(0));
            mgr.stop(1.0, 60);
            let mut out = ChannelBuffer::new(64);
            mgr.process(20.0, &mut out, ctx);
            assert!(mgr.slot(0).is_some_and(VoiceInfo::is_free));
            // slot 0 is free again but the scan starts after it
            assert_eq!(mgr.start(30.0, NoteOn::new(62, 1.0), ctx), Some(1));
        });
    }

    #[test]
    fn test_voice_limit_bounds_allocation() {
        let mut mgr = mgr::<8>();
        mgr.set_voice_limit(3);
        mgr.set_allow_stealing(false);
        with_ctx(|ctx| {
            let slots: Vec<_> = (0..5)
                .map(|i| mgr.start(f64::from(i), NoteOn::new(60 + i, 1.0), ctx))
                .collect();
            assert_eq!(slots, vec![Some(0), Some(1), Some(2), None, None]);
        });
        mgr.set_voice_limit(100);
        assert_eq!(mgr.voice_limit(), 8);
    }

    #[test]
    fn test_amount_is_squared() {
        let mut mgr = mgr::<2>();
        with_ctx(|ctx| mgr.start(0.0, NoteOn::new(60, 0.5), ctx));
        assert_eq!(mgr.slot(0).map(|s| s.voice().amount), Some(0.25));
    }

    #[test]
    fn test_stop_releases_every_matching_slot() {
        let mut mgr = mgr::<4>();
        with_ctx(|ctx| {
            mgr.start(0.0, NoteOn::new(60, 1.0).on_voice(0), ctx);
            mgr.start(0.0, NoteOn::new(60, 1.0).on_voice(2), ctx);
            mgr.start(0.0, NoteOn::new(61, 1.0).on_voice(3), ctx);
        });
        mgr.stop(5.0, 60);
        assert!(!mgr.slot(0).is_some_and(VoiceInfo::is_note_on));
        assert!(!mgr.slot(2).is_some_and(VoiceInfo::is_note_on));
        assert!(mgr.slot(3).is_some_and(VoiceInfo::is_note_on));
    }

    #[test]
    fn test_released_slot_frees_after_done() {
        let mut mgr = mgr::<2>();
        let mut out = ChannelBuffer::new(64);
        with_ctx(|ctx| {
            mgr.start(0.0, NoteOn::new(60, 1.0), ctx);
            mgr.stop(5.0, 60);
            mgr.process(10.0, &mut out, ctx);
            assert_eq!(mgr.active_voice_count(), 1);
            mgr.process(15.0, &mut out, ctx);
            assert_eq!(mgr.active_voice_count(), 0);
        });
    }

    #[test]
    fn test_held_slot_never_frees() {
        let mut mgr = mgr::<2>();
        let mut out = ChannelBuffer::new(64);
        with_ctx(|ctx| {
            mgr.start(0.0, NoteOn::new(60, 1.0), ctx);
            mgr.process(1000.0, &mut out, ctx);
        });
        assert_eq!(mgr.active_voice_count(), 1);
    }

    #[test]
    fn test_preserving_retrigger_skips_clear() {
        let mut mgr = mgr::<2>();
        with_ctx(|ctx| {
            mgr.start(0.0, NoteOn::new(60, 1.0).on_voice(1), ctx);
            mgr.start(5.0, NoteOn::new(62, 1.0).on_voice(1), ctx);
        });
        let slot = mgr.slot(1).map(|s| (s.pitch(), s.voice().clears));
        assert_eq!(slot, Some((Some(62), 1)));
    }

    #[test]
    fn test_pan_change_starts_new_note() {
        let panned = |pan: f32| Modulation {
            pan,
            ..Modulation::default()
        };
        let mut mgr = mgr::<2>();
        with_ctx(|ctx| {
            mgr.start(0.0, NoteOn::new(60, 1.0).on_voice(0).with_modulation(panned(0.0)), ctx);
            mgr.start(5.0, NoteOn::new(60, 1.0).on_voice(0).with_modulation(panned(0.5)), ctx);
        });
        assert_eq!(mgr.slot(0).map(|s| s.voice().clears), Some(2));
        assert_eq!(mgr.slot(0).map(|s| s.voice().pan()), Some(0.5));

        mgr.set_retrigger_policy(RetriggerPolicy::AlwaysPreserve);
        with_ctx(|ctx| {
            mgr.start(9.0, NoteOn::new(60, 1.0).on_voice(0).with_modulation(panned(-0.5)), ctx);
        });
        assert_eq!(mgr.slot(0).map(|s| s.voice().clears), Some(2));
    }

    #[test]
    fn test_steal_fades_tail_over_following_samples() {
        let mut mgr = mgr::<1>();
        let mut out = ChannelBuffer::new(64);
        with_ctx(|ctx| {
            mgr.start(0.0, NoteOn::new(60, 1.0), ctx);
            mgr.process(0.0, &mut out, ctx);
            // steal the only voice with a silent note
            mgr.start(2.0, NoteOn::new(62, 0.0), ctx);
            out.clear();
            mgr.process(2.0, &mut out, ctx);
        });
        let ch = out.channel(0);
        // fade ring was written at position 64 % 50 = 14
        for (i, &s) in ch.iter().take(VOICE_FADE_SAMPLES).enumerate() {
            let expected = 1.0 - i as f32 / VOICE_FADE_SAMPLES as f32;
            assert!((s - expected).abs() < 1e-6, "sample {i}: expected {expected}, got {s}");
        }
        assert!(ch[VOICE_FADE_SAMPLES..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_fade_ring_is_consumed_once() {
        let mut mgr = mgr::<1>();
        let mut out = ChannelBuffer::new(64);
        with_ctx(|ctx| {
            mgr.start(0.0, NoteOn::new(60, 1.0), ctx);
            mgr.start(1.0, NoteOn::new(62, 0.0), ctx);
            mgr.process(1.0, &mut out, ctx);
            out.clear();
            mgr.process(3.0, &mut out, ctx);
        });
        assert!(out.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_steal_before_first_block_fades_every_channel() {
        let mut mgr = mgr::<1>();
        let mut out = ChannelBuffer::with_channels(64, 2);
        with_ctx(|ctx| {
            mgr.start(0.0, NoteOn::new(60, 1.0), ctx);
            mgr.start(1.0, NoteOn::new(62, 0.0), ctx);
            mgr.process(1.0, &mut out, ctx);
        });
        assert_eq!(out.channel(0)[0], 1.0);
        assert_eq!(out.channel(1)[0], 1.0);
        assert!((out.channel(1)[10] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_mono_setup_fades_mono() {
        let mut mgr: PolyphonyMgr<TestVoice, 1> =
            PolyphonyMgr::new(&EngineSetup::new(48000.0, 64).with_channels(1), 1.0);
        let mut out = ChannelBuffer::new(64);
        with_ctx(|ctx| {
            mgr.start(0.0, NoteOn::new(60, 1.0), ctx);
            mgr.start(1.0, NoteOn::new(62, 0.0), ctx);
            mgr.process(1.0, &mut out, ctx);
        });
        assert_eq!(out.num_active_channels(), 1);
        assert_eq!(out.channel(0)[0], 1.0);
    }

    #[test]
    fn test_kill_all_silences() {
        let mut mgr = mgr::<4>();
        let mut out = ChannelBuffer::new(64);
        with_ctx(|ctx| {
            mgr.start(0.0, NoteOn::new(60, 1.0), ctx);
            mgr.start(0.0, NoteOn::new(64, 1.0), ctx);
            mgr.kill_all();
            mgr.process(0.0, &mut out, ctx);
        });
        assert!(out.channel(0).iter().all(|&s| s == 0.0));
        assert_eq!(mgr.active_voice_count(), 0);
    }

    #[test]
    fn test_params_reach_every_voice() {
        let mut mgr = mgr::<3>();
        mgr.params_handle().store(0.5);
        let mut out = ChannelBuffer::new(8);
        with_ctx(|ctx| mgr.process(0.0, &mut out, ctx));
        for i in 0..3 {
            assert_eq!(mgr.slot(i).map(|s| *s.voice().params), Some(0.5));
        }
    }

    #[test]
    fn test_replaced_params_are_freed_on_control_side() {
        let mut mgr = mgr::<2>();
        let control = mgr.params_handle();
        let weak = Arc::downgrade(&control.load());
        control.store(0.5);
        let mut out = ChannelBuffer::new(8);
        with_ctx(|ctx| mgr.process(0.0, &mut out, ctx));

        // the pool handed the old snapshot back instead of freeing it
        assert_eq!(control.retired_pending(), 1);
        assert!(weak.upgrade().is_some());
        assert_eq!(control.collect_retired(), 1);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_replaced_modulation_is_reclaimed() {
        let mut mgr = mgr::<1>();
        let reclaimer = mgr.modulation_reclaimer();
        let bend: Arc<dyn crate::ModulationCurve> = Arc::new(1.0_f32);
        let weak = Arc::downgrade(&bend);
        let note = NoteOn {
            modulation: Modulation {
                pitch_bend: Some(bend),
                ..Modulation::default()
            },
            ..NoteOn::new(60, 1.0)
        };
        with_ctx(|ctx| {
            mgr.start(0.0, note, ctx);
            mgr.start(1.0, NoteOn::new(62, 1.0), ctx);
        });
        assert_eq!(reclaimer.pending(), 1);
        assert!(weak.upgrade().is_some());
        assert_eq!(reclaimer.collect(), 1);
        assert!(weak.upgrade().is_none());

        // curve-less modulation is not queued
        with_ctx(|ctx| mgr.start(2.0, NoteOn::new(64, 1.0), ctx));
        assert_eq!(reclaimer.pending(), 0);
    }

    #[test]
    fn test_dropped_note_modulation_is_reclaimed() {
        let mut mgr = mgr::<1>();
        mgr.set_allow_stealing(false);
        let reclaimer = mgr.modulation_reclaimer();
        let note = NoteOn {
            modulation: Modulation {
                pressure: Some(Arc::new(0.5_f32)),
                ..Modulation::default()
            },
            ..NoteOn::new(64, 1.0)
        };
        with_ctx(|ctx| {
            mgr.start(0.0, NoteOn::new(60, 1.0), ctx);
            assert_eq!(mgr.start(1.0, note, ctx), None);
        });
        assert_eq!(reclaimer.pending(), 1);
    }

    #[test]
    fn test_oversampling_is_power_of_two_within_setup() {
        let setup = EngineSetup::new(48000.0, 64).with_max_oversampling(4);
        let mut mgr: PolyphonyMgr<TestVoice, 2> = PolyphonyMgr::new(&setup, 1.0);
        mgr.set_oversampling(3);
        assert_eq!(mgr.oversampling(), 2);
        mgr.set_oversampling(16);
        assert_eq!(mgr.oversampling(), 4);
        mgr.set_oversampling(0);
        assert_eq!(mgr.oversampling(), 1);
    }

    #[test]
    fn test_out_of_range_voice_idx_allocates() {
        let mut mgr = mgr::<2>();
        let slot = with_ctx(|ctx| mgr.start(0.0, NoteOn::new(60, 1.0).on_voice(9), ctx));
        assert_eq!(slot, Some(0));
    }
}
