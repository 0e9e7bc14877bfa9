//! Criterion benchmarks for the post-acquisition analysis hot paths.
//!
//! A one-minute run at 1 kHz yields 60k samples; these benchmarks keep an eye
//! on how long the user waits for the report after acquisition stops.
//!
//! Run with: cargo bench --bench welch

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ntc_daq::analysis::spectral::{analyze_spectrum, WelchEstimator};
use ntc_daq::analysis::stability::{allan_deviation, log_spaced};
use ntc_daq::config::AnalysisConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FS: f64 = 1000.0;

fn noisy_series(len: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(0);
    (0..len)
        .map(|i| 25.0 + 0.01 * i as f64 / FS + rng.gen_range(-0.2..0.2))
        .collect()
}

/// Welch estimate alone, for the segment lengths the analyzer can pick.
fn welch_segment_lengths(c: &mut Criterion) {
    let mut group = c.benchmark_group("welch_estimate");
    let data = noisy_series(60_000);

    for segment_len in [256usize, 1024, 2048] {
        let estimator = WelchEstimator::new(segment_len, segment_len / 2);
        group.throughput(Throughput::Elements(data.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(segment_len),
            &segment_len,
            |b, _| b.iter(|| estimator.estimate(black_box(&data), FS)),
        );
    }

    group.finish();
}

/// Full spectral stage (detrend, Welch, NETD) for growing run lengths.
fn spectral_stage(c: &mut Criterion) {
    let mut group = c.benchmark_group("spectral_stage");
    let config = AnalysisConfig::default();

    for seconds in [10usize, 60, 300] {
        let data = noisy_series(seconds * FS as usize);
        group.throughput(Throughput::Elements(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("run_s", seconds), &data, |b, data| {
            b.iter(|| analyze_spectrum(black_box(data), FS, &config))
        });
    }

    group.finish();
}

fn allan_curve(c: &mut Criterion) {
    let data = noisy_series(60_000);
    let taus = log_spaced(1.0 / FS, 20.0, 50);
    c.bench_function("allan_deviation_60s", |b| {
        b.iter(|| allan_deviation(black_box(&data), FS, &taus))
    });
}

criterion_group!(benches, welch_segment_lengths, spectral_stage, allan_curve);
criterion_main!(benches);
