//! Time-addressed linear ramps.
//!
//! A [`Ramp`] answers "what is the value at time `t`?" for a short history of
//! linear segments. Segments live in a fixed ring of [`RAMP_SEGMENTS`] slots,
//! so scheduling a new ramp never allocates and an in-flight segment stays
//! queryable until it is overwritten by later ones.
//!
//! Times are in milliseconds on the caller's transport clock.

/// Number of segments remembered by a [`Ramp`].
pub const RAMP_SEGMENTS: usize = 10;

/// One linear segment of a [`Ramp`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampData {
    /// Time the segment starts (ms).
    pub start_time: f64,
    /// Value at `start_time`.
    pub start_value: f32,
    /// Value at and after `end_time`.
    pub end_value: f32,
    /// Time the segment reaches `end_value` (ms).
    pub end_time: f64,
}

impl RampData {
    /// Value of this segment at `time`, clamped outside `[start_time, end_time]`.
    #[inline]
    pub fn value(&self, time: f64) -> f32 {
        if time <= self.start_time {
            return self.start_value;
        }
        if time >= self.end_time || self.end_time <= self.start_time {
            return self.end_value;
        }
        let t = ((time - self.start_time) / (self.end_time - self.start_time)) as f32;
        crate::lerp(self.start_value, self.end_value, t)
    }
}

/// Linear value-over-time with a small ring of pending segments.
///
/// [`Ramp::value`] is a pure function of time: it picks the most recently
/// started segment whose `start_time <= time` and interpolates inside it.
///
/// # Example
///
/// ```rust
/// use polyvox_core::Ramp;
///
/// let mut ramp = Ramp::new();
/// ramp.set_value(1.0);
/// ramp.start(100.0, 0.0, 500.0);
///
/// assert_eq!(ramp.value(50.0), 1.0);
/// assert!((ramp.value(300.0) - 0.5).abs() < 1e-6);
/// assert_eq!(ramp.value(600.0), 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct Ramp {
    segments: [Option<RampData>; RAMP_SEGMENTS],
    next: usize,
}

impl Ramp {
    /// Creates an empty ramp. Its value is 0 until something is scheduled.
    pub fn new() -> Self {
        Self {
            segments: [None; RAMP_SEGMENTS],
            next: 0,
        }
    }

    /// Forgets every segment and holds `value` for all time.
    pub fn set_value(&mut self, value: f32) {
        self.segments = [None; RAMP_SEGMENTS];
        self.segments[0] = Some(RampData {
            start_time: f64::NEG_INFINITY,
            start_value: value,
            end_value: value,
            end_time: f64::NEG_INFINITY,
        });
        self.next = 1;
    }

    /// Ramps from the current value at `time` to `end_value` at `end_time`.
    pub fn start(&mut self, time: f64, end_value: f32, end_time: f64) {
        let start_value = self.value(time);
        self.start_from(time, start_value, end_value, end_time);
    }

    /// Schedules an explicit segment.
    pub fn start_from(&mut self, start_time: f64, start_value: f32, end_value: f32, end_time: f64) {
        self.segments[self.next] = Some(RampData {
            start_time,
            start_value,
            end_value,
            end_time,
        });
        self.next = (self.next + 1) % RAMP_SEGMENTS;
    }

    /// The segment that governs `time`, if any: the latest start at or
    /// before `time`, with equal starts going to the most recently written.
    pub fn segment_at(&self, time: f64) -> Option<&RampData> {
        let mut best: Option<(&RampData, usize)> = None;
        for (idx, seg) in self.segments.iter().enumerate() {
            let Some(seg) = seg else {
                continue;
            };
            if seg.start_time > time {
                continue;
            }
            // the slot just behind `next` is the newest
            let recency = (idx + RAMP_SEGMENTS - self.next) % RAMP_SEGMENTS;
            let better = best.is_none_or(|(b, b_recency)| {
                seg.start_time > b.start_time || (seg.start_time == b.start_time && recency > b_recency)
            });
            if better {
                best = Some((seg, recency));
            }
        }
        best.map(|(seg, _)| seg)
    }

    /// Value at `time`.
    #[inline]
    pub fn value(&self, time: f64) -> f32 {
        self.segment_at(time).map_or(0.0, |seg| seg.value(time))
    }

    /// The value the governing segment is heading to.
    pub fn target(&self, time: f64) -> f32 {
        self.segment_at(time).map_or(0.0, |seg| seg.end_value)
    }
}

impl Default for Ramp {
    fn default() -> Self {
        Self::new()
    }
}
