//! Multi-stage envelope with an event ring.
//!
//! [`Adsr`] describes an envelope as up to [`MAX_ADSR_STAGES`] stages, each a
//! `(target, time, curve)` triple, with an optional sustain stage. A note-on
//! is recorded as an [`EventInfo`] in a ring of [`ADSR_EVENT_SLOTS`] slots, so
//! a retrigger does not erase the release tail of the previous note: queries
//! for a time before the retrigger still resolve to the older event.
//!
//! The envelope is evaluated, not ticked. [`Adsr::value`] is a pure function
//! of time given the current stage data and event ring, which lets voices
//! sample it at any sample offset and lets the state be saved and restored
//! without drift.
//!
//! All times are milliseconds on the caller's transport clock.

use std::io::{Read, Write};

use polyvox_core::{curve_ease, lerp};

use crate::state::{self, StateError};

/// Maximum number of stages in an envelope.
pub const MAX_ADSR_STAGES: usize = 20;

/// Number of note events remembered per envelope.
pub const ADSR_EVENT_SLOTS: usize = 5;

/// Revision written by [`Adsr::save_state`].
///
/// - 0: stage data and flags
/// - 1: adds the time scale
/// - 2: adds the curve offset and the event ring
pub const ADSR_STATE_REVISION: i32 = 2;

/// Shortest stage time [`Adsr::set`] will configure, in milliseconds.
const MIN_STAGE_MS: f32 = 1.0;

/// Gap inserted when a stop lands on or before its event's start.
const STOP_NUDGE_MS: f64 = 0.0001;

/// One segment of an envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    /// Level reached at the end of the stage, relative to the event's target.
    pub target: f32,
    /// Duration in milliseconds.
    pub time: f32,
    /// Interpolation bias; 0 is linear.
    pub curve: f32,
}

impl Default for Stage {
    fn default() -> Self {
        Self {
            target: 0.0,
            time: 1.0,
            curve: 0.0,
        }
    }
}

/// One tracked note-on/note-off pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventInfo {
    /// Note-on time, `None` for an unused slot.
    pub start_time: Option<f64>,
    /// Release time, if one has been requested or scheduled.
    pub stop_time: Option<f64>,
    /// Envelope value at the instant this event started.
    pub start_blend: f32,
    /// Envelope value at the instant the release began.
    pub stop_blend: Option<f32>,
    /// Scale applied to every stage target.
    pub mult: f32,
}

impl EventInfo {
    /// An unused slot.
    pub const CLEARED: Self = Self {
        start_time: None,
        stop_time: None,
        start_blend: 0.0,
        stop_blend: None,
        mult: 1.0,
    };
}

impl Default for EventInfo {
    fn default() -> Self {
        Self::CLEARED
    }
}

/// What a call to [`Adsr::stop`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The active event now releases at the requested time.
    Released,
    /// A later scheduled release (from the max sustain) was moved earlier.
    Rescheduled,
    /// The active event was already released at or before this time.
    AlreadyStopped,
    /// No event covers the requested time. This usually means a note-off
    /// arrived without a matching note-on.
    NoActiveEvent,
}

/// Stage-based envelope generator.
///
/// # Example
///
/// ```rust
/// use polyvox_synth::Adsr;
///
/// let mut env = Adsr::new(10.0, 50.0, 0.5, 100.0);
/// env.start(0.0, 1.0);
///
/// assert_eq!(env.value(0.0), 0.0);
/// assert!((env.value(10.0) - 1.0).abs() < 1e-6);
/// assert!((env.value(60.0) - 0.5).abs() < 1e-6);
///
/// env.stop(60.0, true);
/// assert!(env.value(160.0).abs() < 1e-6);
/// assert!(env.is_done(160.0));
/// ```
#[derive(Debug, Clone)]
pub struct Adsr {
    stages: [Stage; MAX_ADSR_STAGES],
    num_stages: usize,
    sustain_stage: usize,
    has_sustain_stage: bool,
    max_sustain: Option<f32>,
    free_release_level: bool,
    time_scale: f32,
    curve_offset: f32,
    events: [EventInfo; ADSR_EVENT_SLOTS],
    next_event: usize,
}

impl Adsr {
    /// Creates a standard attack/decay/sustain/release envelope.
    pub fn new(attack_ms: f32, decay_ms: f32, sustain: f32, release_ms: f32) -> Self {
        let mut env = Self {
            stages: [Stage::default(); MAX_ADSR_STAGES],
            num_stages: 0,
            sustain_stage: 0,
            has_sustain_stage: false,
            max_sustain: None,
            free_release_level: false,
            time_scale: 1.0,
            curve_offset: 0.0,
            events: [EventInfo::CLEARED; ADSR_EVENT_SLOTS],
            next_event: 0,
        };
        env.set(attack_ms, decay_ms, sustain, release_ms);
        env
    }

    /// Reconfigures as a standard three-stage envelope with unbounded sustain.
    ///
    /// Times below 1 ms are raised to 1 ms and the sustain level to 0.0001,
    /// so every stage has a defined slope.
    pub fn set(&mut self, attack_ms: f32, decay_ms: f32, sustain: f32, release_ms: f32) {
        self.stages[0] = Stage {
            target: 1.0,
            time: attack_ms.max(MIN_STAGE_MS),
            curve: 0.0,
        };
        self.stages[1] = Stage {
            target: sustain.max(0.0001),
            time: decay_ms.max(MIN_STAGE_MS),
            curve: -0.5,
        };
        self.stages[2] = Stage {
            target: 0.0,
            time: release_ms.max(MIN_STAGE_MS),
            curve: -0.5,
        };
        self.num_stages = 3;
        self.sustain_stage = 1;
        self.has_sustain_stage = true;
        self.max_sustain = None;
    }

    /// Like [`Adsr::set`], with the sustain forced to release after `hold_ms`.
    pub fn set_with_hold(
        &mut self,
        attack_ms: f32,
        decay_ms: f32,
        sustain: f32,
        release_ms: f32,
        hold_ms: f32,
    ) {
        self.set(attack_ms, decay_ms, sustain, release_ms);
        self.max_sustain = (hold_ms >= 0.0).then_some(hold_ms);
    }

    /// Copies the shape of `other`. The event ring is left untouched.
    pub fn set_from(&mut self, other: &Adsr) {
        self.stages = other.stages;
        self.num_stages = other.num_stages;
        self.sustain_stage = other.sustain_stage;
        self.has_sustain_stage = other.has_sustain_stage;
        self.max_sustain = other.max_sustain;
        self.free_release_level = other.free_release_level;
    }

    /// Starts a new event at `time` peaking at `target`.
    pub fn start(&mut self, time: f64, target: f32) {
        self.start_scaled(time, target, 1.0, 0.0);
    }

    /// Starts a new event with stage durations (except release) multiplied by
    /// `time_scale` and `curve` added to every stage's curve.
    ///
    /// The new event begins from whatever the envelope outputs at `time`, so
    /// retriggering a sounding envelope does not jump.
    pub fn start_scaled(&mut self, time: f64, target: f32, time_scale: f32, curve: f32) {
        let start_blend = self.value(time);
        self.events[self.next_event] = EventInfo {
            start_time: Some(time),
            stop_time: None,
            start_blend,
            stop_blend: None,
            mult: target,
        };
        self.next_event = (self.next_event + 1) % ADSR_EVENT_SLOTS;
        self.time_scale = time_scale;
        self.curve_offset = curve;

        if let Some(hold) = self.max_sustain
            && self.has_sustain_stage
        {
            let last = self.sustain_stage.min(self.num_stages - 1);
            let to_sustain: f64 = (0..=last).map(|i| self.stage_duration(i)).sum();
            self.stop(time + to_sustain + f64::from(hold), false);
        }
    }

    /// Copies the shape of `shape` and starts a new event.
    pub fn start_with(&mut self, time: f64, target: f32, shape: &Adsr, time_scale: f32, curve: f32) {
        self.set_from(shape);
        self.start_scaled(time, target, time_scale, curve);
    }

    /// Releases the event active at `time`.
    ///
    /// A stop for a time with no active event is reported as
    /// [`StopOutcome::NoActiveEvent`] and, when `warn` is set, logged. The
    /// envelope keeps producing defined values either way.
    pub fn stop(&mut self, time: f64, warn: bool) -> StopOutcome {
        let Some(idx) = self.event_index_at(time) else {
            if warn {
                #[cfg(feature = "tracing")]
                tracing::warn!(time, "envelope stop with no active event");
            }
            return StopOutcome::NoActiveEvent;
        };

        let event = self.events[idx];
        let start = event.start_time.unwrap_or(time);
        let mut time = time;
        if time <= start {
            #[cfg(feature = "tracing")]
            tracing::debug!(time, start, "envelope stop at or before start, nudging");
            time = start + STOP_NUDGE_MS;
        }

        let outcome = match event.stop_time {
            Some(existing) if existing <= time => return StopOutcome::AlreadyStopped,
            Some(_) => StopOutcome::Rescheduled,
            None => StopOutcome::Released,
        };

        let stop_blend = self.value_for_event(time, &event);
        let slot = &mut self.events[idx];
        slot.stop_blend = Some(stop_blend);
        slot.stop_time = Some(time);
        outcome
    }

    /// Envelope value at `time`. Returns 0 before any event has started.
    pub fn value(&self, time: f64) -> f32 {
        self.event_index_at(time)
            .map_or(0.0, |idx| self.value_for_event(time, &self.events[idx]))
    }

    /// Envelope value at `time` for a specific event.
    pub fn value_for_event(&self, time: f64, event: &EventInfo) -> f32 {
        let (stage, stage_start) = self.stage_for_event(time, event);
        if stage >= self.num_stages {
            return self.stage_target(self.num_stages - 1) * event.mult;
        }

        let from = match event.stop_blend {
            _ if stage == 0 => event.start_blend,
            Some(blend) if self.has_sustain_stage && stage == self.sustain_stage + 1 => blend,
            _ => self.stage_target(stage - 1) * event.mult,
        };
        let to = self.stage_target(stage) * event.mult;

        let duration = self.stage_duration(stage);
        let elapsed = time - stage_start;
        if duration <= 0.0 || elapsed >= duration {
            // only the held sustain stage can be evaluated past its end
            return to;
        }

        let t = (elapsed / duration).clamp(0.0, 1.0) as f32;
        let curve = self.stages[stage].curve + self.curve_offset;
        let eased = if curve == 0.0 {
            t
        } else {
            curve_ease(t, if from < to { curve } else { -curve })
        };
        lerp(from, to, eased)
    }

    /// True once the event active at `time` has run past its final stage,
    /// or when no event covers `time`.
    pub fn is_done(&self, time: f64) -> bool {
        self.stage_at(time).0 >= self.num_stages
    }

    /// Stage index at `time` and the time that stage began.
    ///
    /// Returns `num_stages()` once the envelope is finished or before any
    /// event exists.
    pub fn stage_at(&self, time: f64) -> (usize, f64) {
        match self.event_index_at(time) {
            Some(idx) => self.stage_for_event(time, &self.events[idx]),
            None => (self.num_stages, 0.0),
        }
    }

    /// Forgets every event. The next value is 0.
    pub fn clear(&mut self) {
        self.events = [EventInfo::CLEARED; ADSR_EVENT_SLOTS];
    }

    /// Start time of the event active at `time`.
    pub fn start_time(&self, time: f64) -> Option<f64> {
        self.event_index_at(time)
            .and_then(|idx| self.events[idx].start_time)
    }

    /// Release time of the event active at `time`, if any.
    pub fn stop_time(&self, time: f64) -> Option<f64> {
        self.event_index_at(time)
            .and_then(|idx| self.events[idx].stop_time)
    }

    /// The event active at `time`.
    pub fn event_at(&self, time: f64) -> Option<&EventInfo> {
        self.event_index_at(time).map(|idx| &self.events[idx])
    }

    /// Stage `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= MAX_ADSR_STAGES`.
    pub fn stage(&self, i: usize) -> &Stage {
        &self.stages[i]
    }

    /// Mutable stage `i`. Changes apply to the next evaluation.
    ///
    /// # Panics
    ///
    /// Panics if `i >= MAX_ADSR_STAGES`.
    pub fn stage_mut(&mut self, i: usize) -> &mut Stage {
        &mut self.stages[i]
    }

    /// Number of stages in use.
    pub fn num_stages(&self) -> usize {
        self.num_stages
    }

    /// Sets the number of stages, clamped to `1..=MAX_ADSR_STAGES`.
    pub fn set_num_stages(&mut self, num: usize) {
        self.num_stages = num.clamp(1, MAX_ADSR_STAGES);
    }

    /// Index of the sustain stage.
    pub fn sustain_stage(&self) -> usize {
        self.sustain_stage
    }

    /// Sets the sustain stage index, clamped to the stage array.
    pub fn set_sustain_stage(&mut self, stage: usize) {
        self.sustain_stage = stage.min(MAX_ADSR_STAGES - 1);
    }

    /// Whether the sustain stage holds until a stop.
    pub fn has_sustain_stage(&self) -> bool {
        self.has_sustain_stage
    }

    /// Enables or disables the sustain hold.
    pub fn set_has_sustain_stage(&mut self, has_sustain: bool) {
        self.has_sustain_stage = has_sustain;
    }

    /// Longest the sustain may hold before a forced release, in ms.
    pub fn max_sustain(&self) -> Option<f32> {
        self.max_sustain
    }

    /// Sets the forced-release hold. `None` holds until stopped.
    pub fn set_max_sustain(&mut self, max_sustain: Option<f32>) {
        self.max_sustain = max_sustain.filter(|h| *h >= 0.0);
    }

    /// Whether the final stage target is honored. When off, the envelope
    /// always releases to 0.
    pub fn free_release_level(&self) -> bool {
        self.free_release_level
    }

    /// Sets [`Adsr::free_release_level`].
    pub fn set_free_release_level(&mut self, free: bool) {
        self.free_release_level = free;
    }

    /// Duration multiplier applied by the last start.
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// True for the three-stage shape produced by [`Adsr::set`].
    pub fn is_standard_adsr(&self) -> bool {
        self.num_stages == 3 && self.sustain_stage == 1
    }

    /// Attack time of a standard envelope.
    pub fn attack(&self) -> f32 {
        self.stages[0].time
    }

    /// Decay time of a standard envelope.
    pub fn decay(&self) -> f32 {
        self.stages[1].time
    }

    /// Sustain level of a standard envelope.
    pub fn sustain(&self) -> f32 {
        self.stages[1].target
    }

    /// Duration of the final stage.
    pub fn release(&self) -> f32 {
        self.stages[self.num_stages - 1].time
    }

    /// Writes the envelope shape and event ring.
    pub fn save_state(&self, out: &mut impl Write) -> state::Result<()> {
        state::write_i32(out, ADSR_STATE_REVISION)?;
        state::write_f32(out, 0.0)?;
        state::write_i32(out, self.sustain_stage as i32)?;
        state::write_f32(out, self.max_sustain.unwrap_or(-1.0))?;
        state::write_i32(out, self.num_stages as i32)?;
        state::write_bool(out, self.has_sustain_stage)?;
        state::write_bool(out, self.free_release_level)?;
        state::write_i32(out, MAX_ADSR_STAGES as i32)?;
        for stage in &self.stages {
            state::write_f32(out, stage.curve)?;
            state::write_f32(out, stage.target)?;
            state::write_f32(out, stage.time)?;
        }
        state::write_f32(out, self.time_scale)?;
        state::write_f32(out, self.curve_offset)?;
        state::write_i32(out, self.next_event as i32)?;
        for event in &self.events {
            state::write_f64(out, event.start_time.unwrap_or(f64::NAN))?;
            state::write_f64(out, event.stop_time.unwrap_or(f64::NAN))?;
            state::write_f32(out, event.start_blend)?;
            state::write_bool(out, event.stop_blend.is_some())?;
            state::write_f32(out, event.stop_blend.unwrap_or(0.0))?;
            state::write_f32(out, event.mult)?;
        }
        Ok(())
    }

    /// Reads state written by [`Adsr::save_state`] at this or an older
    /// revision. On error `self` is left unchanged.
    pub fn load_state(&mut self, input: &mut impl Read) -> state::Result<()> {
        let rev = state::read_i32(input)?;
        if rev > ADSR_STATE_REVISION {
            #[cfg(feature = "tracing")]
            tracing::warn!(rev, supported = ADSR_STATE_REVISION, "envelope state from a newer revision");
            return Err(StateError::UnsupportedRevision {
                found: rev,
                supported: ADSR_STATE_REVISION,
            });
        }
        if rev < 0 {
            return Err(StateError::InvalidValue {
                field: "revision",
                value: f64::from(rev),
            });
        }

        let mut loaded = Adsr::default();
        let _reserved = state::read_f32(input)?;
        let sustain_stage = state::read_i32(input)?;
        let max_sustain = state::read_f32(input)?;
        let num_stages = state::read_i32(input)?;
        loaded.has_sustain_stage = state::read_bool(input)?;
        loaded.free_release_level = state::read_bool(input)?;

        let stored = state::read_i32(input)?;
        if stored < 0 || stored as usize > MAX_ADSR_STAGES {
            return Err(StateError::StageCountMismatch {
                found: stored,
                max: MAX_ADSR_STAGES,
            });
        }
        if num_stages < 1 || num_stages > stored {
            return Err(StateError::InvalidValue {
                field: "num_stages",
                value: f64::from(num_stages),
            });
        }
        if sustain_stage < 0 || sustain_stage as usize >= MAX_ADSR_STAGES {
            return Err(StateError::InvalidValue {
                field: "sustain_stage",
                value: f64::from(sustain_stage),
            });
        }
        for stage in loaded.stages.iter_mut().take(stored as usize) {
            stage.curve = state::read_f32(input)?;
            stage.target = state::read_f32(input)?;
            stage.time = state::read_f32(input)?;
        }
        loaded.sustain_stage = sustain_stage as usize;
        loaded.num_stages = num_stages as usize;
        loaded.max_sustain = (max_sustain >= 0.0).then_some(max_sustain);

        if rev >= 1 {
            loaded.time_scale = state::read_f32(input)?;
        }
        if rev >= 2 {
            loaded.curve_offset = state::read_f32(input)?;
            let next = state::read_i32(input)?;
            if next < 0 || next as usize >= ADSR_EVENT_SLOTS {
                return Err(StateError::InvalidValue {
                    field: "next_event",
                    value: f64::from(next),
                });
            }
            loaded.next_event = next as usize;
            for event in &mut loaded.events {
                let start = state::read_f64(input)?;
                let stop = state::read_f64(input)?;
                event.start_time = (!start.is_nan()).then_some(start);
                event.stop_time = (!stop.is_nan()).then_some(stop);
                event.start_blend = state::read_f32(input)?;
                let has_stop_blend = state::read_bool(input)?;
                let stop_blend = state::read_f32(input)?;
                event.stop_blend = has_stop_blend.then_some(stop_blend);
                event.mult = state::read_f32(input)?;
            }
        }

        *self = loaded;
        Ok(())
    }

    /// Ring slot governing `time`: the most recently started event whose
    /// start is at or before `time`.
    fn event_index_at(&self, time: f64) -> Option<usize> {
        let mut best: Option<(usize, f64, usize)> = None;
        for (idx, event) in self.events.iter().enumerate() {
            let Some(start) = event.start_time else {
                continue;
            };
            if start > time {
                continue;
            }
            // slots written later sit closer behind `next_event`
            let recency = (idx + ADSR_EVENT_SLOTS - self.next_event) % ADSR_EVENT_SLOTS;
            let better = match best {
                None => true,
                Some((_, best_start, best_recency)) => {
                    start > best_start || (start == best_start && recency > best_recency)
                }
            };
            if better {
                best = Some((idx, start, recency));
            }
        }
        best.map(|(idx, _, _)| idx)
    }

    fn stage_for_event(&self, time: f64, event: &EventInfo) -> (usize, f64) {
        let Some(start) = event.start_time else {
            return (self.num_stages, 0.0);
        };
        if time < start {
            return (0, start);
        }

        let mut stage = 0;
        let mut stage_start = start;
        let mut released = false;
        if self.has_sustain_stage
            && let Some(stop) = event.stop_time
            && time >= stop
            && stop > start
        {
            stage = self.sustain_stage + 1;
            stage_start = stop;
            released = true;
        }

        while stage < self.num_stages {
            let end = stage_start + self.stage_duration(stage);
            if time < end {
                break;
            }
            if self.has_sustain_stage && !released && stage == self.sustain_stage {
                break;
            }
            stage_start = end;
            stage += 1;
        }
        (stage.min(self.num_stages), stage_start)
    }

    fn stage_duration(&self, stage: usize) -> f64 {
        let scale = if stage + 1 >= self.num_stages {
            1.0
        } else {
            self.time_scale
        };
        f64::from((self.stages[stage].time * scale).max(0.0))
    }

    fn stage_target(&self, stage: usize) -> f32 {
        if stage + 1 == self.num_stages && !self.free_release_level {
            0.0
        } else {
            self.stages[stage].target
        }
    }
}

impl Default for Adsr {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0, 1.0)
    }
}
