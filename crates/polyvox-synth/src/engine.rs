//! Block-driven voice engine.

use polyvox_core::{ChannelBuffer, Tuning};

use crate::context::{EngineSetup, RenderContext};
use crate::note_queue::{NoteEvent, NoteInputBuffer, NoteKind, NoteReceiver};
use crate::modulation::Modulation;
use crate::params::{ParamsHandle, Reclaimer};
use crate::polyphony::{DEFAULT_NUM_VOICES, NoteOn, PolyphonyMgr};
use crate::voice::MidiVoice;

/// A voice pool with its own transport clock and note queue.
///
/// Each [`VoiceEngine::render`] call is one audio block: pending notes from
/// the cross-thread receiver are drained, every note due before the end of
/// the block is applied at its own timestamp, the voices are rendered and
/// the clock advances by the block length.
///
/// # Example
///
/// ```rust
/// use polyvox_core::ChannelBuffer;
/// use polyvox_synth::{EngineSetup, NoteOn, OscillatorVoice, OscillatorVoiceParams, VoiceEngine};
///
/// let setup = EngineSetup::new(48000.0, 256);
/// let mut engine: VoiceEngine<OscillatorVoice> =
///     VoiceEngine::new(&setup, OscillatorVoiceParams::default());
///
/// engine.note_on(0.0, NoteOn::new(69, 1.0)).unwrap();
/// engine.note_off(20.0, 69).unwrap();
///
/// let mut block = ChannelBuffer::with_channels(256, 2);
/// engine.render(&mut block);
/// assert!(block.channel(0).iter().any(|&s| s != 0.0));
/// ```
pub struct VoiceEngine<V: MidiVoice, const N: usize = DEFAULT_NUM_VOICES> {
    mgr: PolyphonyMgr<V, N>,
    notes: NoteInputBuffer,
    receiver: Option<NoteReceiver>,
    tuning: Tuning,
    sample_rate: f32,
    time: f64,
}

impl<V: MidiVoice, const N: usize> VoiceEngine<V, N> {
    /// Builds the engine with the clock at 0.
    pub fn new(setup: &EngineSetup, params: V::Params) -> Self {
        Self {
            mgr: PolyphonyMgr::new(setup, params),
            notes: NoteInputBuffer::new(),
            receiver: None,
            tuning: Tuning::default(),
            sample_rate: setup.sample_rate,
            time: 0.0,
        }
    }

    /// Drains `receiver` at the start of every block.
    pub fn with_receiver(mut self, receiver: NoteReceiver) -> Self {
        self.receiver = Some(receiver);
        self
    }

    /// Replaces the pitch mapping.
    pub fn set_tuning(&mut self, tuning: Tuning) {
        self.tuning = tuning;
    }

    /// Current pitch mapping.
    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// The voice pool.
    pub fn polyphony(&self) -> &PolyphonyMgr<V, N> {
        &self.mgr
    }

    /// Mutable voice pool, for limits and policies.
    pub fn polyphony_mut(&mut self) -> &mut PolyphonyMgr<V, N> {
        &mut self.mgr
    }

    /// Handle for publishing voice parameters.
    pub fn params_handle(&self) -> ParamsHandle<V::Params> {
        self.mgr.params_handle()
    }

    /// Queue of per-note modulation released by the pool.
    pub fn modulation_reclaimer(&self) -> Reclaimer<Modulation> {
        self.mgr.modulation_reclaimer()
    }

    /// Transport time of the next block's first sample, in ms.
    pub fn current_time(&self) -> f64 {
        self.time
    }

    /// Queues a note-on. A full queue hands the event back.
    pub fn note_on(&mut self, time: f64, note: NoteOn) -> Result<(), NoteEvent> {
        self.notes.push(NoteEvent::note_on(time, note))
    }

    /// Queues a note-off. A full queue hands the event back.
    pub fn note_off(&mut self, time: f64, pitch: i32) -> Result<(), NoteEvent> {
        self.notes.push(NoteEvent::note_off(time, pitch))
    }

    /// Releases every held note now and drops queued events.
    pub fn all_notes_off(&mut self) {
        self.drop_queued();
        for idx in 0..N {
            let held = self
                .mgr
                .slot(idx)
                .filter(|slot| slot.is_note_on())
                .and_then(|slot| slot.pitch());
            if let Some(pitch) = held {
                self.mgr.stop(self.time, pitch);
            }
        }
    }

    /// Silences everything immediately and drops queued events.
    pub fn kill_all(&mut self) {
        self.drop_queued();
        self.mgr.kill_all();
    }

    /// Renders one block into `out`, replacing its contents.
    pub fn render(&mut self, out: &mut ChannelBuffer) {
        self.render_block(out, None);
    }

    /// Renders one block with `input` available to voices that process
    /// external audio.
    pub fn render_with_input(&mut self, out: &mut ChannelBuffer, input: &ChannelBuffer) {
        self.render_block(out, Some(input));
    }

    fn drop_queued(&mut self) {
        for event in self.notes.drain() {
            if let NoteKind::On(note) = event.kind {
                self.mgr.retire_modulation(note.modulation);
            }
        }
    }

    fn render_block(&mut self, out: &mut ChannelBuffer, input: Option<&ChannelBuffer>) {
        out.clear();
        if let Some(receiver) = &self.receiver {
            receiver.drain_into(&mut self.notes);
        }

        let mut ctx = RenderContext::new(self.sample_rate, &self.tuning);
        if let Some(input) = input {
            ctx = ctx.with_input(input);
        }

        let block_end = self.time + out.buffer_size() as f64 * ctx.ms_per_sample();
        self.notes.flush(block_end, &mut self.mgr, &ctx);
        self.mgr.process(self.time, out, &ctx);
        self.time = block_end;
    }
}
