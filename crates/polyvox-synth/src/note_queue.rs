//! Note event buffering.
//!
//! All voice scheduling happens on the audio thread. Notes produced on that
//! thread go straight into a [`NoteInputBuffer`]; notes from other threads
//! travel through a bounded [`note_channel`] that the audio thread drains
//! into the same buffer at the start of each block. Either way
//! [`PolyphonyMgr::start`] and [`PolyphonyMgr::stop`] are only ever called
//! from one place, so no lock guards the voice pool.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::context::RenderContext;
use crate::polyphony::{NoteOn, PolyphonyMgr};
use crate::voice::MidiVoice;

/// Default [`NoteInputBuffer`] capacity.
pub const DEFAULT_NOTE_BUFFER_CAPACITY: usize = 64;

/// What a [`NoteEvent`] does.
#[derive(Debug, Clone)]
pub enum NoteKind {
    /// Start a note.
    On(NoteOn),
    /// Release every held slot playing `pitch`.
    Off {
        /// MIDI pitch.
        pitch: i32,
    },
}

/// A timestamped note event.
#[derive(Debug, Clone)]
pub struct NoteEvent {
    /// Transport time in ms.
    pub time: f64,
    /// The event.
    pub kind: NoteKind,
}

impl NoteEvent {
    /// Note-on at `time`.
    pub fn note_on(time: f64, note: NoteOn) -> Self {
        Self {
            time,
            kind: NoteKind::On(note),
        }
    }

    /// Note-off at `time`.
    pub fn note_off(time: f64, pitch: i32) -> Self {
        Self {
            time,
            kind: NoteKind::Off { pitch },
        }
    }

    fn apply<V: MidiVoice, const N: usize>(self, mgr: &mut PolyphonyMgr<V, N>, ctx: &RenderContext<'_>) {
        match self.kind {
            NoteKind::On(note) => {
                mgr.start(self.time, note, ctx);
            }
            NoteKind::Off { pitch } => mgr.stop(self.time, pitch),
        }
    }
}

/// Fixed-capacity event buffer owned by the audio thread.
///
/// # Example
///
/// ```rust
/// use polyvox_core::Tuning;
/// use polyvox_synth::{EngineSetup, NoteEvent, NoteInputBuffer, NoteOn, OscillatorVoice, PolyphonyMgr, RenderContext};
///
/// let setup = EngineSetup::default();
/// let mut mgr: PolyphonyMgr<OscillatorVoice> = PolyphonyMgr::new(&setup, Default::default());
/// let tuning = Tuning::default();
/// let ctx = RenderContext::new(48000.0, &tuning);
///
/// let mut notes: NoteInputBuffer = NoteInputBuffer::new();
/// notes.push(NoteEvent::note_on(20.0, NoteOn::new(60, 1.0))).unwrap();
///
/// // not due yet
/// assert_eq!(notes.flush(10.0, &mut mgr, &ctx), 0);
/// assert_eq!(notes.flush(30.0, &mut mgr, &ctx), 1);
/// assert_eq!(mgr.active_voice_count(), 1);
/// ```
#[derive(Debug)]
pub struct NoteInputBuffer<const CAP: usize = DEFAULT_NOTE_BUFFER_CAPACITY> {
    events: Vec<NoteEvent>,
}

impl<const CAP: usize> NoteInputBuffer<CAP> {
    /// Allocates room for `CAP` events.
    pub fn new() -> Self {
        Self {
            events: Vec::with_capacity(CAP),
        }
    }

    /// Queues `event`, or hands it back if the buffer is full.
    pub fn push(&mut self, event: NoteEvent) -> Result<(), NoteEvent> {
        if self.events.len() >= CAP {
            #[cfg(feature = "tracing")]
            tracing::warn!(capacity = CAP, "note buffer full");
            return Err(event);
        }
        self.events.push(event);
        Ok(())
    }

    /// Applies every event before `block_end` to `mgr`, earliest first.
    /// Events with equal times keep their push order. Later events stay
    /// queued. Returns how many were applied.
    pub fn flush<V: MidiVoice, const N: usize>(
        &mut self,
        block_end: f64,
        mgr: &mut PolyphonyMgr<V, N>,
        ctx: &RenderContext<'_>,
    ) -> usize {
        let mut applied = 0;
        while let Some(idx) = self.next_due(block_end) {
            self.events.remove(idx).apply(mgr, ctx);
            applied += 1;
        }
        applied
    }

    /// Drops every queued event.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Removes and yields every queued event, keeping the allocation.
    pub fn drain(&mut self) -> impl Iterator<Item = NoteEvent> + '_ {
        self.events.drain(..)
    }

    /// Queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// True when another push would be refused.
    pub fn is_full(&self) -> bool {
        self.events.len() >= CAP
    }

    fn next_due(&self, block_end: f64) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (idx, event) in self.events.iter().enumerate() {
            if event.time >= block_end {
                continue;
            }
            if best.is_none_or(|b| event.time < self.events[b].time) {
                best = Some(idx);
            }
        }
        best
    }
}

impl<const CAP: usize> Default for NoteInputBuffer<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

/// Sending half of a [`note_channel`]. Cloneable; usable from any thread.
#[derive(Debug, Clone)]
pub struct NoteSender {
    tx: Sender<NoteEvent>,
}

impl NoteSender {
    /// Queues `event` without blocking. A full or closed channel hands the
    /// event back.
    pub fn try_send(&self, event: NoteEvent) -> Result<(), NoteEvent> {
        self.tx.try_send(event).map_err(|err| match err {
            TrySendError::Full(event) | TrySendError::Disconnected(event) => event,
        })
    }
}

/// Receiving half of a [`note_channel`], owned by the audio thread.
#[derive(Debug)]
pub struct NoteReceiver {
    rx: Receiver<NoteEvent>,
}

impl NoteReceiver {
    /// Moves pending events into `buffer` until the channel is empty or the
    /// buffer is full. Returns how many moved.
    pub fn drain_into<const CAP: usize>(&self, buffer: &mut NoteInputBuffer<CAP>) -> usize {
        let mut moved = 0;
        while !buffer.is_full() {
            let Ok(event) = self.rx.try_recv() else {
                break;
            };
            if buffer.push(event).is_err() {
                break;
            }
            moved += 1;
        }
        moved
    }
}

/// Bounded cross-thread note queue.
pub fn note_channel(capacity: usize) -> (NoteSender, NoteReceiver) {
    let (tx, rx) = bounded(capacity);
    (NoteSender { tx }, NoteReceiver { rx })
}
