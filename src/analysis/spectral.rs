//! Power and amplitude spectral density of the temperature series.
//!
//! The series is linearly detrended as a whole, then fed to a Welch estimator:
//! overlapping segments, each mean-removed and Hann-windowed, transformed with
//! `rustfft`, scaled to a one-sided density in °C²/Hz and averaged.

use super::{SkipReason, StageOutcome};
use crate::config::AnalysisConfig;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::Serialize;
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lower edge of the NETD band never goes below this frequency.
const NETD_MIN_HZ: f64 = 1.0;
/// Upper edge of the NETD band never exceeds this frequency.
const NETD_MAX_HZ: f64 = 1000.0;

/// Spectral densities with the 0 Hz bin removed.
#[derive(Debug, Clone, Serialize)]
pub struct SpectralResult {
    pub frequencies: Vec<f64>,
    /// °C²/Hz
    pub psd: Vec<f64>,
    /// °C/√Hz
    pub asd: Vec<f64>,
    pub segment_len: usize,
    pub segments: usize,
    /// Mean ASD over the NETD band.
    pub netd: StageOutcome<BandNoise>,
}

/// Mean amplitude spectral density over a frequency band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandNoise {
    pub low_hz: f64,
    pub high_hz: f64,
    /// °C/√Hz
    pub mean_asd: f64,
}

/// Subtracts the least-squares line through `(i, data[i])`.
pub fn detrend_linear(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = data.iter().sum::<f64>() / n as f64;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, &y) in data.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;

    data.iter()
        .enumerate()
        .map(|(i, &y)| y - (y_mean + slope * (i as f64 - x_mean)))
        .collect()
}

/// Welch power spectral density estimator for a fixed segment length.
#[derive(Clone)]
pub struct WelchEstimator {
    segment_len: usize,
    overlap: usize,
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    window_power: f64,
}

impl WelchEstimator {
    /// Creates an estimator with a periodic Hann window.
    ///
    /// # Arguments
    ///
    /// * `segment_len` - Samples per segment; must be at least 2.
    /// * `overlap` - Samples shared by consecutive segments; must be less than `segment_len`.
    pub fn new(segment_len: usize, overlap: usize) -> Self {
        assert!(segment_len >= 2, "Segment length must be at least 2");
        assert!(overlap < segment_len, "Overlap must be less than segment length");

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(segment_len);

        let window: Vec<f64> = (0..segment_len)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / segment_len as f64).cos())
            .collect();
        let window_power = window.iter().map(|w| w * w).sum();

        Self {
            segment_len,
            overlap,
            fft,
            window,
            window_power,
        }
    }

    /// Number of whole segments that fit into `len` samples.
    pub fn segment_count(&self, len: usize) -> usize {
        if len < self.segment_len {
            return 0;
        }
        let step = self.segment_len - self.overlap;
        (len - self.overlap) / step
    }

    /// Returns `(frequencies, psd)` including the 0 Hz bin, or `None` if
    /// `data` is shorter than one segment.
    pub fn estimate(&self, data: &[f64], fs: f64) -> Option<(Vec<f64>, Vec<f64>)> {
        let segments = self.segment_count(data.len());
        if segments == 0 {
            return None;
        }

        let n = self.segment_len;
        let bins = n / 2 + 1;
        let step = n - self.overlap;
        let scale = 1.0 / (fs * self.window_power);

        let mut psd = vec![0.0; bins];
        let mut buffer = vec![Complex::new(0.0, 0.0); n];

        for k in 0..segments {
            let segment = &data[k * step..k * step + n];
            let mean = segment.iter().sum::<f64>() / n as f64;
            for ((slot, &x), &w) in buffer.iter_mut().zip(segment).zip(&self.window) {
                *slot = Complex::new((x - mean) * w, 0.0);
            }
            self.fft.process(&mut buffer);
            for (acc, value) in psd.iter_mut().zip(&buffer) {
                *acc += value.norm_sqr() * scale;
            }
        }

        // One-sided: fold negative frequencies in, except DC and (even n) Nyquist.
        let last_doubled = if n % 2 == 0 { bins - 1 } else { bins };
        for (i, value) in psd.iter_mut().enumerate() {
            *value /= segments as f64;
            if i > 0 && i < last_doubled {
                *value *= 2.0;
            }
        }

        let frequencies = (0..bins).map(|i| i as f64 * fs / n as f64).collect();
        debug!(segments, segment_len = n, "Welch estimate complete");
        Some((frequencies, psd))
    }
}

/// Mean ASD over `[max(1, 1.1 * f_min), min(fs / 2.1, 1000)]`.
pub fn band_noise(frequencies: &[f64], asd: &[f64], fs: f64) -> StageOutcome<BandNoise> {
    let Some(&f_min) = frequencies.first() else {
        return StageOutcome::Skipped(SkipReason::NoPositiveFrequencies);
    };
    let low_hz = NETD_MIN_HZ.max(f_min * 1.1);
    let high_hz = (fs / 2.1).min(NETD_MAX_HZ);
    if low_hz >= high_hz {
        return StageOutcome::Skipped(SkipReason::InvalidBand { low_hz, high_hz });
    }

    let in_band: Vec<f64> = frequencies
        .iter()
        .zip(asd)
        .filter(|(&f, _)| f >= low_hz && f <= high_hz)
        .map(|(_, &a)| a)
        .collect();
    if in_band.is_empty() {
        return StageOutcome::Skipped(SkipReason::EmptyBand { low_hz, high_hz });
    }

    StageOutcome::Completed(BandNoise {
        low_hz,
        high_hz,
        mean_asd: in_band.iter().sum::<f64>() / in_band.len() as f64,
    })
}

/// Runs the full spectral stage on a temperature series sampled at `fs`.
pub fn analyze_spectrum(
    temperatures: &[f64],
    fs: f64,
    config: &AnalysisConfig,
) -> StageOutcome<SpectralResult> {
    if fs.is_nan() || fs <= 0.0 {
        return StageOutcome::Skipped(SkipReason::UnknownSamplingRate);
    }
    if temperatures.len() < 2 {
        return StageOutcome::Skipped(SkipReason::TooFewSamples {
            have: temperatures.len(),
            need: 2,
        });
    }

    let detrended = detrend_linear(temperatures);
    let segment_len = detrended.len().min(config.max_segment_len);
    if segment_len < config.min_segment_len {
        warn!(
            samples = detrended.len(),
            min = config.min_segment_len,
            "Not enough data points for a robust Welch estimate"
        );
        return StageOutcome::Skipped(SkipReason::SegmentTooShort {
            len: segment_len,
            min: config.min_segment_len,
        });
    }

    let estimator = WelchEstimator::new(segment_len, segment_len / 2);
    let Some((frequencies, psd)) = estimator.estimate(&detrended, fs) else {
        return StageOutcome::Skipped(SkipReason::SegmentTooShort {
            len: detrended.len(),
            min: segment_len,
        });
    };

    let (frequencies, psd): (Vec<f64>, Vec<f64>) = frequencies
        .into_iter()
        .zip(psd)
        .filter(|&(f, _)| f > 0.0)
        .unzip();
    if frequencies.is_empty() {
        return StageOutcome::Skipped(SkipReason::NoPositiveFrequencies);
    }
    let asd: Vec<f64> = psd.iter().map(|p| p.sqrt()).collect();

    let netd = band_noise(&frequencies, &asd, fs);
    match &netd {
        StageOutcome::Completed(band) => info!(
            "Mean NETD ({:.1}-{:.1} Hz): {:.4e} °C/sqrt(Hz)",
            band.low_hz, band.high_hz, band.mean_asd
        ),
        StageOutcome::Skipped(reason) => info!(%reason, "Mean NETD not computed"),
    }

    StageOutcome::Completed(SpectralResult {
        segments: estimator.segment_count(detrended.len()),
        segment_len,
        frequencies,
        psd,
        asd,
        netd,
    })
}
