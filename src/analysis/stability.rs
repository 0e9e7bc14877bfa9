//! Allan deviation of the temperature series.
//!
//! Temperatures are treated like fractional-frequency data: they are
//! integrated into a phase record and the classic non-overlapping Allan
//! deviation is evaluated at log-spaced averaging times,
//!
//! ```text
//! σ(τ) = sqrt( Σ (x[i+2m] - 2·x[i+m] + x[i])² / (2N) ) / τ,   i = 0, m, 2m, …
//! ```
//!
//! with `τ = m / fs`. Averaging times are capped at a third of the run so every
//! estimate rests on a handful of intervals at least.
//!
//! The estimator itself is compiled only with the `stability` feature. Without
//! it the stage always reports [`SkipReason::CapabilityMissing`].

use super::{SkipReason, StageOutcome};
use crate::capabilities::Capabilities;
use crate::config::AnalysisConfig;
use serde::Serialize;
#[cfg(feature = "stability")]
use tracing::info;

/// Allan deviation curve.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StabilityResult {
    /// Averaging times actually evaluated, in seconds.
    pub taus: Vec<f64>,
    /// °C
    pub adev: Vec<f64>,
    pub adev_err: Vec<f64>,
    /// Number of second differences behind each estimate.
    pub n: Vec<usize>,
    pub best: Option<BestStability>,
}

/// The averaging time with the lowest deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BestStability {
    pub tau_s: f64,
    pub adev: f64,
}

/// `count` points spaced evenly in log10 between `start` and `stop`, inclusive.
pub fn log_spaced(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let (lo, hi) = (start.log10(), stop.log10());
            let step = (hi - lo) / (count - 1) as f64;
            (0..count)
                .map(|i| 10f64.powf(lo + step * i as f64))
                .collect()
        }
    }
}

/// Integrates frequency-like data into phase: mean removed, cumulative sum
/// scaled by `1/fs`, with a leading zero.
#[cfg(feature = "stability")]
pub fn frequency_to_phase(data: &[f64], fs: f64) -> Vec<f64> {
    let tau0 = 1.0 / fs;
    let mean = data.iter().sum::<f64>() / data.len().max(1) as f64;
    let mut phase = Vec::with_capacity(data.len() + 1);
    phase.push(0.0);
    let mut acc = 0.0;
    for &y in data {
        acc += (y - mean) * tau0;
        phase.push(acc);
    }
    phase
}

/// Converts requested averaging times into distinct stride lengths.
///
/// Taus outside `(0, len/fs)` are dropped, the rest are floored to whole
/// samples, zero strides dropped, and duplicates merged. The result is sorted.
#[cfg(feature = "stability")]
fn strides(taus: &[f64], fs: f64, len: usize) -> Vec<usize> {
    let limit = len as f64 / fs;
    let mut m: Vec<usize> = taus
        .iter()
        .filter(|&&tau| tau > 0.0 && tau < limit)
        // Absorb rounding in tau0 * fs so the shortest tau keeps its stride of 1.
        .map(|&tau| (tau * fs + 1e-9).floor() as usize)
        .filter(|&m| m > 0)
        .collect();
    m.sort_unstable();
    m.dedup();
    m
}

/// Non-overlapping Allan deviation of frequency-like `data` at `taus`.
///
/// Averaging times that cannot be evaluated, or rest on a single interval,
/// are left out of the result.
#[cfg(feature = "stability")]
pub fn allan_deviation(data: &[f64], fs: f64, taus: &[f64]) -> StabilityResult {
    let phase = frequency_to_phase(data, fs);
    let mut result = StabilityResult::default();

    for m in strides(taus, fs, phase.len()) {
        let n = ((phase.len() - 1) / m).saturating_sub(1);
        if n <= 1 {
            continue;
        }
        let sum: f64 = (0..n)
            .map(|i| {
                let k = i * m;
                let v = phase[k + 2 * m] - 2.0 * phase[k + m] + phase[k];
                v * v
            })
            .sum();
        let dev = (sum / (2.0 * n as f64)).sqrt() / m as f64 * fs;

        result.taus.push(m as f64 / fs);
        result.adev.push(dev);
        result.adev_err.push(dev / (n as f64).sqrt());
        result.n.push(n);
    }

    result.best = result
        .adev
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, &adev)| BestStability {
            tau_s: result.taus[i],
            adev,
        });
    result
}

/// Runs the stability stage.
///
/// `elapsed_s` is the span of the series; the longest averaging time is a
/// third of it.
pub fn analyze_stability(
    temperatures: &[f64],
    elapsed_s: f64,
    fs: f64,
    capabilities: &Capabilities,
    config: &AnalysisConfig,
) -> StageOutcome<StabilityResult> {
    if !capabilities.allan_deviation {
        return StageOutcome::Skipped(SkipReason::CapabilityMissing("stability"));
    }
    if fs.is_nan() || fs <= 0.0 {
        return StageOutcome::Skipped(SkipReason::UnknownSamplingRate);
    }
    if temperatures.len() <= config.allan_min_samples {
        return StageOutcome::Skipped(SkipReason::TooFewSamples {
            have: temperatures.len(),
            need: config.allan_min_samples + 1,
        });
    }

    let tau0 = 1.0 / fs;
    let max_tau = elapsed_s / 3.0;
    if max_tau <= tau0 {
        return StageOutcome::Skipped(SkipReason::RunTooShort { max_tau, tau0 });
    }

    evaluate(temperatures, fs, log_spaced(tau0, max_tau, config.allan_points))
}

#[cfg(feature = "stability")]
fn evaluate(temperatures: &[f64], fs: f64, taus: Vec<f64>) -> StageOutcome<StabilityResult> {
    let result = allan_deviation(temperatures, fs, &taus);
    match result.best {
        Some(best) => info!(
            "Best stability (min ADEV): {:.4e} °C at τ = {:.2} s",
            best.adev, best.tau_s
        ),
        None => return StageOutcome::Skipped(SkipReason::NoValidTaus),
    }
    StageOutcome::Completed(result)
}

#[cfg(not(feature = "stability"))]
fn evaluate(_temperatures: &[f64], _fs: f64, _taus: Vec<f64>) -> StageOutcome<StabilityResult> {
    StageOutcome::Skipped(SkipReason::CapabilityMissing("stability"))
}

#[cfg(all(test, feature = "stability"))]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn white_noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    #[test]
    fn log_spacing_hits_both_ends() {
        let taus = log_spaced(0.01, 100.0, 5);
        let expected = [0.01, 0.1, 1.0, 10.0, 100.0];
        for (t, e) in taus.iter().zip(expected) {
            assert!((t / e - 1.0).abs() < 1e-12, "{t} vs {e}");
        }
    }

    #[test]
    fn phase_has_leading_zero_and_returns_to_zero() {
        let phase = frequency_to_phase(&[1.0, 2.0, 3.0], 2.0);
        assert_eq!(phase.len(), 4);
        assert_eq!(phase[0], 0.0);
        assert!(phase[3].abs() < 1e-12);
    }

    #[test]
    fn strides_are_floored_unique_and_bounded() {
        assert_eq!(strides(&[0.1, 0.15, 0.25, 0.3, 5.0, -1.0], 10.0, 20), vec![1, 2, 3]);
    }

    #[test]
    fn constant_input_is_perfectly_stable() {
        let result = allan_deviation(&[21.5; 500], 10.0, &[0.1, 1.0, 5.0]);
        assert_eq!(result.taus.len(), 3);
        assert!(result.adev.iter().all(|&d| d.abs() < 1e-12));
    }

    #[test]
    fn unit_stride_matches_direct_formula() {
        let data = [1.0, 3.0, 2.0, 5.0, 4.0];
        let result = allan_deviation(&data, 1.0, &[1.0]);
        // For m = 1 the second difference of phase is the first difference of data.
        let diffs: Vec<f64> = data.windows(2).map(|w| w[1] - w[0]).collect();
        let expected = (diffs.iter().map(|d| d * d).sum::<f64>() / (2.0 * diffs.len() as f64)).sqrt();
        assert_eq!(result.n, vec![4]);
        assert!((result.adev[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn white_noise_averages_down() {
        let fs = 10.0;
        let data = white_noise(10_000, 7);
        let result = allan_deviation(&data, fs, &[0.1, 1.0, 10.0]);
        assert_eq!(result.taus.len(), 3);
        assert!(result.adev[0] > result.adev[1]);
        assert!(result.adev[1] > result.adev[2]);

        // White frequency noise falls as tau^-1/2: a decade costs ~sqrt(10).
        let ratio = result.adev[0] / result.adev[1];
        assert!(ratio > 2.5 && ratio < 4.0, "ratio {ratio}");
    }

    #[test]
    fn analysis_reports_minimum_as_best() {
        let fs = 10.0;
        let data = white_noise(3000, 11);
        let elapsed = (data.len() - 1) as f64 / fs;
        let caps = Capabilities {
            allan_deviation: true,
        };
        let StageOutcome::Completed(result) =
            analyze_stability(&data, elapsed, fs, &caps, &AnalysisConfig::default())
        else {
            panic!("expected a stability curve");
        };
        let best = result.best.unwrap();
        let min = result.adev.iter().cloned().fold(f64::INFINITY, f64::min);
        assert_eq!(best.adev, min);
        assert!(result.taus.windows(2).all(|w| w[0] < w[1]));
        assert!(*result.taus.last().unwrap() <= elapsed / 3.0 + 1e-9);
    }

    #[test]
    fn each_precondition_has_its_own_reason() {
        let data = white_noise(500, 3);
        let cfg = AnalysisConfig::default();
        let on = Capabilities {
            allan_deviation: true,
        };
        let off = Capabilities {
            allan_deviation: false,
        };

        assert!(matches!(
            analyze_stability(&data, 50.0, 10.0, &off, &cfg),
            StageOutcome::Skipped(SkipReason::CapabilityMissing(_))
        ));
        assert!(matches!(
            analyze_stability(&data, 50.0, 0.0, &on, &cfg),
            StageOutcome::Skipped(SkipReason::UnknownSamplingRate)
        ));
        assert!(matches!(
            analyze_stability(&data[..100], 50.0, 10.0, &on, &cfg),
            StageOutcome::Skipped(SkipReason::TooFewSamples { have: 100, need: 101 })
        ));
        assert!(matches!(
            analyze_stability(&data, 0.2, 10.0, &on, &cfg),
            StageOutcome::Skipped(SkipReason::RunTooShort { .. })
        ));
    }

    #[test]
    fn single_interval_taus_are_dropped() {
        // Two samples: stride 1 leaves one second difference, stride 2 none.
        let result = allan_deviation(&[1.0, 2.0], 1.0, &[1.0, 2.0]);
        assert!(result.taus.is_empty());
        assert!(result.best.is_none());
    }

    #[test]
    fn stage_without_any_valid_tau_is_skipped() {
        let cfg = AnalysisConfig {
            allan_min_samples: 1,
            ..AnalysisConfig::default()
        };
        let on = Capabilities {
            allan_deviation: true,
        };
        assert!(matches!(
            analyze_stability(&[1.0, 2.0], 10.0, 1.0, &on, &cfg),
            StageOutcome::Skipped(SkipReason::NoValidTaus)
        ));
    }
}

#[cfg(all(test, not(feature = "stability")))]
mod compiled_out_tests {
    use super::*;

    #[test]
    fn stage_skips_even_when_capability_claimed() {
        let data: Vec<f64> = (0..1000).map(|i| (i % 7) as f64).collect();
        let caps = Capabilities {
            allan_deviation: true,
        };
        assert!(matches!(
            analyze_stability(&data, 99.9, 10.0, &caps, &AnalysisConfig::default()),
            StageOutcome::Skipped(SkipReason::CapabilityMissing("stability"))
        ));
    }
}
