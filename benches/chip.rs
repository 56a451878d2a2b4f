//! Benchmarks for the YM3438 pipeline hot path
//!
//! Run with: cargo bench --bench chip

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use ym3438::Ym3438;

/// Program a sounding carrier so the pipeline does real work.
fn setup_chip() -> Ym3438 {
    let mut chip = Ym3438::new();
    for (address, data) in [
        (0xb0, 0x07), // algorithm 7
        (0x30, 0x01), // MUL=1
        (0x40, 0x00), // TL=0
        (0x50, 0x1f), // AR=31
        (0x80, 0x0f), // SL=0, RR=15
        (0xa4, 0x22),
        (0xa0, 0x69),
        (0x28, 0xf0), // key on all operators of channel 1
    ] {
        chip.write_buffered(0, address);
        chip.write_buffered(1, data);
    }
    // Flush the queued writes through.
    for _ in 0..64 {
        chip.generate();
    }
    chip
}

fn bench_clock(c: &mut Criterion) {
    let mut group = c.benchmark_group("clock");
    let mut chip = setup_chip();

    for iterations in [24, 2400, 24000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(iterations),
            iterations,
            |b, &iterations| {
                b.iter(|| {
                    for _ in 0..iterations {
                        black_box(chip.clock());
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    let mut chip = setup_chip();

    for sample_count in [441, 4410, 44100].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(sample_count),
            sample_count,
            |b, &sample_count| {
                b.iter(|| {
                    for _ in 0..sample_count {
                        black_box(chip.generate());
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_clock, bench_generate);
criterion_main!(benches);
