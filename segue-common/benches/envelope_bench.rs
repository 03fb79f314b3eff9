//! Envelope evaluation benchmark
//!
//! The ramp loop evaluates two envelopes per tick; this measures how cheap
//! a dense sweep over every curve is.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use segue_common::EnvelopeCurve;

fn bench_envelope_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope");
    let steps = 10_000usize;

    for curve in EnvelopeCurve::all_variants() {
        group.bench_with_input(
            BenchmarkId::new("fade_in_out", curve.as_config_str()),
            curve,
            |b, curve| {
                b.iter(|| {
                    for i in 0..=steps {
                        let t = i as f32 / steps as f32;
                        black_box(curve.fade_in(t));
                        black_box(curve.fade_out(t));
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_envelope_sweep);
criterion_main!(benches);
