//! Criterion benchmarks for polyvox-synth components
//!
//! Run with: cargo bench -p polyvox-synth
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use polyvox_core::{ChannelBuffer, Tuning};
use polyvox_synth::{
    Adsr, EngineSetup, FmVoice, FmVoiceParams, KarplusStrongVoice, KarplusStrongVoiceParams,
    MidiVoice, NoteOn, OscillatorVoice, OscillatorVoiceParams, PadSynthVoice,
    PadSynthVoiceParams, PolyphonyMgr, RenderContext, Waveform,
};

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];

// ============================================================================
// Envelope benchmarks
// ============================================================================

fn bench_envelope_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("Adsr");
    let ms_per_sample = 1000.0 / f64::from(SAMPLE_RATE);

    for &block_size in BLOCK_SIZES {
        let mut env = Adsr::new(10.0, 100.0, 0.7, 200.0);
        env.start(0.0, 1.0);
        env.stop(150.0, false);

        group.bench_with_input(BenchmarkId::new("value", block_size), &block_size, |b, &n| {
            b.iter(|| {
                for i in 0..n {
                    black_box(env.value(black_box(i as f64 * ms_per_sample * 8.0)));
                }
            });
        });
    }
    group.finish();
}

fn bench_envelope_retrigger(c: &mut Criterion) {
    let mut group = c.benchmark_group("Adsr");
    group.bench_function("start_stop_cycle", |b| {
        let mut env = Adsr::new(5.0, 20.0, 0.5, 50.0);
        let mut t = 0.0;
        b.iter(|| {
            env.start(t, 1.0);
            env.stop(t + 10.0, false);
            t += 20.0;
            black_box(env.value(t));
        });
    });
    group.finish();
}

// ============================================================================
// Polyphony benchmarks
// ============================================================================

fn start_chord<V: MidiVoice, const N: usize>(mgr: &mut PolyphonyMgr<V, N>, pitches: &[i32]) {
    let tuning = Tuning::default();
    let ctx = RenderContext::new(SAMPLE_RATE, &tuning);
    for &pitch in pitches {
        mgr.start(0.0, NoteOn::new(pitch, 0.8), &ctx);
    }
}

fn bench_poly<V: MidiVoice, const N: usize>(
    c: &mut Criterion,
    name: &str,
    params: V::Params,
    voices: usize,
) where
    V::Params: Clone,
{
    let mut group = c.benchmark_group(name);
    let tuning = Tuning::default();
    let pitches: Vec<i32> = (0..voices as i32).map(|i| 48 + i * 3).collect();

    for &block_size in BLOCK_SIZES {
        let setup = EngineSetup::new(SAMPLE_RATE, block_size);
        let mut mgr: PolyphonyMgr<V, N> = PolyphonyMgr::new(&setup, params.clone());
        start_chord(&mut mgr, &pitches);
        let mut out = ChannelBuffer::with_channels(block_size, 2);
        let block_ms = block_size as f64 * 1000.0 / f64::from(SAMPLE_RATE);

        group.bench_with_input(
            BenchmarkId::new(format!("{voices}_voices"), block_size),
            &block_size,
            |b, _| {
                let ctx = RenderContext::new(SAMPLE_RATE, &tuning);
                let mut time = 0.0;
                b.iter(|| {
                    out.clear();
                    mgr.process(time, &mut out, &ctx);
                    time += block_ms;
                    black_box(out.channel(0)[0]);
                });
            },
        );
    }
    group.finish();
}

fn bench_oscillator_voices(c: &mut Criterion) {
    let params = OscillatorVoiceParams {
        waveform: Waveform::Saw,
        unison: 3,
        detune: 0.1,
        filter_cutoff_max: Some(4000.0),
        ..OscillatorVoiceParams::default()
    };
    bench_poly::<OscillatorVoice, 16>(c, "OscillatorVoice", params.clone(), 4);
    bench_poly::<OscillatorVoice, 16>(c, "OscillatorVoice", params, 16);
}

fn bench_fm_voices(c: &mut Criterion) {
    let params = FmVoiceParams {
        harm_ratio: 2.0,
        mod_index: 2.0,
        ..FmVoiceParams::default()
    };
    bench_poly::<FmVoice, 16>(c, "FmVoice", params, 8);
}

fn bench_karplus_strong_voices(c: &mut Criterion) {
    bench_poly::<KarplusStrongVoice, 16>(
        c,
        "KarplusStrongVoice",
        KarplusStrongVoiceParams::default(),
        8,
    );
}

fn bench_pad_synth_voices(c: &mut Criterion) {
    bench_poly::<PadSynthVoice, 16>(c, "PadSynthVoice", PadSynthVoiceParams::default(), 4);
}

fn bench_voice_stealing(c: &mut Criterion) {
    let mut group = c.benchmark_group("PolyphonyMgr");
    group.bench_function("steal_8_voice", |b| {
        let setup = EngineSetup::new(SAMPLE_RATE, 256);
        let tuning = Tuning::default();
        let ctx = RenderContext::new(SAMPLE_RATE, &tuning);
        let mut mgr: PolyphonyMgr<OscillatorVoice, 8> =
            PolyphonyMgr::new(&setup, OscillatorVoiceParams::default());
        let mut time = 0.0;
        let mut pitch = 36;
        b.iter(|| {
            black_box(mgr.start(time, NoteOn::new(pitch, 1.0), &ctx));
            pitch = 36 + (pitch - 35) % 48;
            time += 1.0;
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_envelope_value,
    bench_envelope_retrigger,
    bench_oscillator_voices,
    bench_fm_voices,
    bench_karplus_strong_voices,
    bench_pad_synth_voices,
    bench_voice_stealing,
);
criterion_main!(benches);
