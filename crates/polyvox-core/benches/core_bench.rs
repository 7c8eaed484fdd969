//! Criterion benchmarks for polyvox-core primitives
//!
//! Run with: cargo bench -p polyvox-core
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use polyvox_core::{Biquad, ChannelBuffer, DelayLine, Ramp, curve_ease};

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];

fn bench_ramp(c: &mut Criterion) {
    let mut group = c.benchmark_group("Ramp");
    let mut ramp = Ramp::new();
    ramp.set_value(0.0);
    for i in 0..9 {
        let t = f64::from(i) * 10.0;
        ramp.start(t, i as f32, t + 10.0);
    }

    for &block_size in BLOCK_SIZES {
        group.bench_with_input(BenchmarkId::new("value", block_size), &block_size, |b, &n| {
            b.iter(|| {
                for i in 0..n {
                    black_box(ramp.value(black_box(i as f64 * 0.02)));
                }
            });
        });
    }
    group.finish();
}

fn bench_biquad(c: &mut Criterion) {
    let mut group = c.benchmark_group("Biquad");
    for &block_size in BLOCK_SIZES {
        group.bench_with_input(BenchmarkId::new("lowpass", block_size), &block_size, |b, &n| {
            let mut biquad = Biquad::new();
            biquad.set_lowpass(1000.0, 0.707, SAMPLE_RATE);
            b.iter(|| {
                for i in 0..n {
                    black_box(biquad.process(black_box((i % 7) as f32 * 0.1)));
                }
            });
        });
    }
    group.finish();
}

fn bench_delay(c: &mut Criterion) {
    let mut group = c.benchmark_group("DelayLine");
    for &block_size in BLOCK_SIZES {
        group.bench_with_input(BenchmarkId::new("feedback", block_size), &block_size, |b, &n| {
            let mut delay = DelayLine::new(SAMPLE_RATE as usize);
            b.iter(|| {
                for _ in 0..n {
                    let s = delay.read_interpolated(black_box(109.1)) * 0.99;
                    delay.write(s + 0.001);
                }
            });
        });
    }
    group.finish();
}

fn bench_buffers(c: &mut Criterion) {
    let mut group = c.benchmark_group("ChannelBuffer");
    group.bench_function("downsample_4x_512", |b| {
        let mut os = ChannelBuffer::with_channels(2048, 2);
        let mut out = ChannelBuffer::with_channels(512, 2);
        b.iter(|| {
            os.channel_mut(0).fill(0.5);
            os.downsample_add_into(&mut out, 4);
            black_box(out.channel(0)[0]);
        });
    });
    group.bench_function("curve_ease", |b| {
        b.iter(|| black_box(curve_ease(black_box(0.37), black_box(-0.5))));
    });
    group.finish();
}

criterion_group!(benches, bench_ramp, bench_biquad, bench_delay, bench_buffers);
criterion_main!(benches);
