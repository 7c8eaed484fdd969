//! Polyvox Synth - Polyphonic voice engine
//!
//! This crate provides the voice-level half of a software instrument:
//! timestamped envelopes, a family of MIDI voices, and the polyphony manager
//! that allocates, steals and fades them.
//!
//! # Core Components
//!
//! ## Envelopes
//!
//! - [`Adsr`] - Multi-stage envelope evaluated at absolute times
//! - [`Stage`] - One segment of an envelope
//! - [`StopOutcome`] - What a release request did
//!
//! Envelopes are queried by time rather than stepped per sample, so a voice
//! can render any block without tracking envelope state itself:
//!
//! ```rust
//! use polyvox_synth::Adsr;
//!
//! let mut env = Adsr::new(10.0, 20.0, 0.5, 30.0);
//! env.start(0.0, 1.0);
//! assert!((env.value(10.0) - 1.0).abs() < 1e-6);
//! assert!((env.value(100.0) - 0.5).abs() < 1e-6);
//!
//! env.stop(100.0, true);
//! assert!(env.is_done(131.0));
//! ```
//!
//! ## Voices
//!
//! Every voice implements [`MidiVoice`]:
//!
//! - [`OscillatorVoice`] - Unison oscillator with a filter envelope
//! - [`FmVoice`] - Three-operator chained FM with envelope-driven indices
//! - [`SampleVoice`] - Pitched sample playback
//! - [`KarplusStrongVoice`] - Plucked string
//! - [`PadSynthVoice`] - Wavetable built from a smeared harmonic spectrum
//!
//! ## Polyphony
//!
//! - [`PolyphonyMgr`] - Round-robin allocation with oldest-voice stealing
//! - [`VoiceEngine`] - Polyphony plus a note queue and transport clock
//! - [`ParamsHandle`] - Lock-free parameter snapshots for the audio thread
//! - [`note_channel`] - Bounded queue for notes from other threads
//!
//! # Example: Playing a Chord
//!
//! ```rust
//! use polyvox_core::ChannelBuffer;
//! use polyvox_synth::{EngineSetup, NoteOn, OscillatorVoice, OscillatorVoiceParams, VoiceEngine, Waveform};
//!
//! let setup = EngineSetup::new(48000.0, 512);
//! let mut engine: VoiceEngine<OscillatorVoice, 8> = VoiceEngine::new(
//!     &setup,
//!     OscillatorVoiceParams {
//!         waveform: Waveform::Saw,
//!         unison: 3,
//!         detune: 0.1,
//!         ..OscillatorVoiceParams::default()
//!     },
//! );
//!
//! for pitch in [60, 64, 67] {
//!     engine.note_on(0.0, NoteOn::new(pitch, 0.8)).unwrap();
//! }
//!
//! let mut block = ChannelBuffer::with_channels(512, 2);
//! engine.render(&mut block);
//! assert_eq!(engine.polyphony().active_voice_count(), 3);
//! ```
//!
//! # Features
//!
//! - `tracing` - diagnostics for dropped events, stolen voices and bad state
//! - `serde` - serialization for the small configuration enums

pub mod context;
pub mod engine;
pub mod envelope;
pub mod modulation;
pub mod note_queue;
pub mod oscillator;
pub mod params;
pub mod polyphony;
pub mod state;
pub mod voice;

pub use context::{ControlHook, EngineSetup, RenderContext};
pub use engine::VoiceEngine;
pub use envelope::{
    ADSR_EVENT_SLOTS, ADSR_STATE_REVISION, Adsr, EventInfo, MAX_ADSR_STAGES, Stage, StopOutcome,
};
pub use modulation::{AtomicModulation, Modulation, ModulationCurve};
pub use note_queue::{
    DEFAULT_NOTE_BUFFER_CAPACITY, NoteEvent, NoteInputBuffer, NoteKind, NoteReceiver, NoteSender,
    note_channel,
};
pub use oscillator::{EnvOscillator, Oscillator, Waveform};
pub use params::{ParamsHandle, Reclaimer};
pub use polyphony::{
    DEFAULT_NUM_VOICES, NoteOn, PolyphonyMgr, RetriggerPolicy, VOICE_FADE_SAMPLES, VoiceInfo,
};
pub use state::StateError;
pub use voice::{
    DEFAULT_ROOT_PITCH, ExciterSource, FmVoice, FmVoiceParams, KarplusStrongVoice,
    KarplusStrongVoiceParams, MAX_PAD_HARMONICS, MAX_PAD_UNDERSAMPLE, MAX_UNISON, MidiVoice,
    OscillatorVoice, OscillatorVoiceParams, PAD_TABLE_SIZE, PadAmplitude, PadSynthVoice,
    PadSynthVoiceParams, SampleVoice, SampleVoiceParams, SyncMode, VoiceState,
    velocity_envelope_curve, velocity_envelope_scale, velocity_volume,
};
