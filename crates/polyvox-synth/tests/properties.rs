//! Property-based tests for polyvox-synth.
//!
//! Tests envelope bounds and completion, allocation limits and state
//! persistence using proptest for randomized input generation.

use polyvox_core::{ChannelBuffer, Tuning};
use polyvox_synth::{
    Adsr, EngineSetup, Modulation, NoteOn, OscillatorVoice, OscillatorVoiceParams, PolyphonyMgr,
    RenderContext,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// A standard envelope never leaves `[0, peak]`.
    #[test]
    fn adsr_stays_within_peak(
        attack in 0.0f32..200.0,
        decay in 0.0f32..200.0,
        sustain in 0.0f32..1.0,
        release in 0.0f32..500.0,
        peak in 0.0f32..1.0,
        hold in 0.0f64..1000.0,
        query in -100.0f64..3000.0,
    ) {
        let mut env = Adsr::new(attack, decay, sustain, release);
        env.start(0.0, peak);
        env.stop(hold, false);
        let v = env.value(query);
        prop_assert!(v >= -1e-5 && v <= peak + 1e-5, "value {} outside [0, {}]", v, peak);
    }

    /// Once released, the envelope is done after the release time and
    /// stays done.
    #[test]
    fn adsr_finishes_after_release(
        attack in 1.0f32..100.0,
        decay in 1.0f32..100.0,
        sustain in 0.0f32..1.0,
        release in 1.0f32..200.0,
        hold in 0.0f64..500.0,
        extra in 0.0f64..1000.0,
    ) {
        let mut env = Adsr::new(attack, decay, sustain, release);
        env.start(0.0, 1.0);
        env.stop(hold, false);
        let end = hold.max(0.01) + f64::from(release) + 0.01;
        prop_assert!(env.is_done(end + extra));
        prop_assert_eq!(env.value(end + extra), 0.0);
    }

    /// Retriggering never makes the envelope jump at the retrigger time.
    #[test]
    fn adsr_retrigger_is_continuous(
        first_stop in 0.0f64..100.0,
        retrigger in 0.0f64..300.0,
    ) {
        let mut env = Adsr::new(20.0, 30.0, 0.4, 60.0);
        env.start(0.0, 1.0);
        env.stop(first_stop, false);
        let before = env.value(retrigger);
        env.start(retrigger, 1.0);
        prop_assert!((env.value(retrigger) - before).abs() < 1e-4);
    }

    /// A saved envelope evaluates identically after loading.
    #[test]
    fn adsr_state_reload_matches(
        starts in prop::collection::vec(0.0f64..100.0, 1..8),
        query in 0.0f64..400.0,
    ) {
        let mut env = Adsr::new(5.0, 10.0, 0.6, 25.0);
        let mut t = 0.0;
        for gap in &starts {
            t += gap;
            env.start(t, 1.0);
            env.stop(t + gap * 0.5, false);
        }
        let mut bytes = Vec::new();
        env.save_state(&mut bytes).unwrap();
        let mut restored = Adsr::default();
        restored.load_state(&mut bytes.as_slice()).unwrap();
        prop_assert_eq!(env.value(query), restored.value(query));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The allocator never occupies more slots than the voice limit, and
    /// every output sample stays finite.
    #[test]
    fn allocation_respects_voice_limit(
        limit in 1usize..8,
        stealing in any::<bool>(),
        notes in prop::collection::vec((0i32..128, 0.0f32..1.0, any::<bool>()), 1..40),
    ) {
        let setup = EngineSetup::new(48000.0, 64);
        let tuning = Tuning::default();
        let ctx = RenderContext::new(48000.0, &tuning);
        let mut mgr: PolyphonyMgr<OscillatorVoice, 8> =
            PolyphonyMgr::new(&setup, OscillatorVoiceParams::default());
        mgr.set_voice_limit(limit);
        mgr.set_allow_stealing(stealing);

        let mut out = ChannelBuffer::with_channels(64, 2);
        let mut time = 0.0;
        for (pitch, amount, release) in notes {
            if release {
                mgr.stop(time, pitch);
            } else if let Some(idx) = mgr.start(time, NoteOn::new(pitch, amount), &ctx) {
                prop_assert!(idx < limit, "slot {} beyond limit {}", idx, limit);
            }
            out.clear();
            mgr.process(time, &mut out, &ctx);
            prop_assert!(out.channel(0).iter().all(|s| s.is_finite()));
            prop_assert!(mgr.active_voice_count() <= limit);
            time += 64.0 / 48.0;
        }
    }
}

/// One step of a scripted session: a note-on with pan, a note-off, or a block.
#[derive(Debug, Clone)]
enum Op {
    On(i32, f32, f32),
    Off(i32),
    Block,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (36i32..84, 0.1f32..1.0, -1.0f32..1.0).prop_map(|(p, a, pan)| Op::On(p, a, pan)),
        (36i32..84).prop_map(Op::Off),
        Just(Op::Block),
    ]
}

fn run_session(ops: &[Op]) -> Vec<u32> {
    let setup = EngineSetup::new(48000.0, 64);
    let tuning = Tuning::default();
    let ctx = RenderContext::new(48000.0, &tuning);
    let params = OscillatorVoiceParams {
        unison: 3,
        detune: 0.2,
        ..OscillatorVoiceParams::default()
    };
    let mut mgr: PolyphonyMgr<OscillatorVoice, 4> = PolyphonyMgr::new(&setup, params);

    let mut out = ChannelBuffer::with_channels(64, 2);
    let mut bits = Vec::new();
    let mut time = 0.0;
    for op in ops {
        match *op {
            Op::On(pitch, amount, pan) => {
                let note = NoteOn {
                    modulation: Modulation::with_pan(pan),
                    ..NoteOn::new(pitch, amount)
                };
                mgr.start(time, note, &ctx);
            }
            Op::Off(pitch) => mgr.stop(time, pitch),
            Op::Block => {
                out.clear();
                mgr.process(time, &mut out, &ctx);
                for ch in 0..2 {
                    bits.extend(out.channel(ch).iter().map(|s| s.to_bits()));
                }
                time += 64.0 / 48.0;
            }
        }
    }
    bits
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Replaying the same sequence of operations gives bit-identical output.
    #[test]
    fn polyphony_is_deterministic(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let first = run_session(&ops);
        let second = run_session(&ops);
        prop_assert_eq!(first, second);
    }
}
