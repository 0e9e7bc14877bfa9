//! Post-acquisition analysis.
//!
//! Three stages run on the finished [`Series`](crate::series::Series):
//!
//! - [`binning`]: 1 s mean/std bins of temperature and voltage,
//! - [`spectral`]: Welch PSD/ASD and mean NETD,
//! - [`stability`]: Allan deviation.
//!
//! Stages are independent. A stage whose preconditions are not met yields
//! [`StageOutcome::Skipped`] with a reason and the others still run.

pub mod binning;
pub mod report;
pub mod spectral;
pub mod stability;

pub use report::AnalysisReport;

use crate::acquisition::AcquisitionRun;
use crate::capabilities::Capabilities;
use crate::config::AnalysisConfig;
use crate::timing::RateUnavailable;
use chrono::Utc;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::{info, info_span, warn};

/// Result of one analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum StageOutcome<T> {
    Completed(T),
    Skipped(SkipReason),
}

impl<T> StageOutcome<T> {
    pub fn completed(&self) -> Option<&T> {
        match self {
            StageOutcome::Completed(value) => Some(value),
            StageOutcome::Skipped(_) => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            StageOutcome::Completed(_) => None,
            StageOutcome::Skipped(reason) => Some(reason),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed(_))
    }
}

/// Why a stage produced no result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("no samples were acquired")]
    NoData,

    #[error("sampling rate unknown or not positive")]
    UnknownSamplingRate,

    #[error("sampling rate unavailable: {0}")]
    RateUnavailable(#[from] RateUnavailable),

    #[error("not enough samples ({have}, need at least {need})")]
    TooFewSamples { have: usize, need: usize },

    #[error("segment length {len} below minimum {min}")]
    SegmentTooShort { len: usize, min: usize },

    #[error("no positive frequencies in the spectrum")]
    NoPositiveFrequencies,

    #[error("invalid frequency band {low_hz:.2}-{high_hz:.2} Hz")]
    InvalidBand { low_hz: f64, high_hz: f64 },

    #[error("no spectral bins in {low_hz:.2}-{high_hz:.2} Hz")]
    EmptyBand { low_hz: f64, high_hz: f64 },

    #[error("'{0}' support is not compiled in")]
    CapabilityMissing(&'static str),

    #[error("run too short (max tau {max_tau:.3} s <= tau0 {tau0:.3} s)")]
    RunTooShort { max_tau: f64, tau0: f64 },

    #[error("no averaging time had more than one interval")]
    NoValidTaus,
}

impl Serialize for SkipReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Runs every stage on a finished acquisition.
pub fn analyze(
    run: &AcquisitionRun,
    capabilities: &Capabilities,
    config: &AnalysisConfig,
) -> AnalysisReport {
    let span = info_span!("analysis", samples = run.series.len());
    let _enter = span.enter();

    let series = &run.series;
    let bins = binning::aggregate(series, config.bin_width_s);

    let rate = run.ledger.average_rate();
    match &rate {
        Ok(fs) => info!("Effective sampling rate: {fs:.2} Hz"),
        Err(reason) => warn!(%reason, "Could not determine sampling rate"),
    }

    let (spectral, stability) = if series.is_empty() {
        warn!("No data collected, skipping analysis");
        (
            StageOutcome::Skipped(SkipReason::NoData),
            StageOutcome::Skipped(SkipReason::NoData),
        )
    } else {
        match rate {
            Ok(fs) => (
                spectral::analyze_spectrum(series.temperatures(), fs, config),
                stability::analyze_stability(
                    series.temperatures(),
                    series.elapsed_s(),
                    fs,
                    capabilities,
                    config,
                ),
            ),
            Err(reason) => (
                StageOutcome::Skipped(reason.into()),
                StageOutcome::Skipped(reason.into()),
            ),
        }
    };

    if let Some(reason) = spectral.skip_reason() {
        warn!(%reason, "Spectral analysis skipped");
    }
    if let Some(reason) = stability.skip_reason() {
        warn!(%reason, "Allan deviation skipped");
    }

    AnalysisReport {
        generated_at: Utc::now(),
        stop_reason: run.stop_reason,
        decoder: run.decoder,
        blocks: run.ledger.len(),
        samples: series.len(),
        rejected_samples: series.rejected(),
        sampling_rate_hz: rate.ok(),
        elapsed_s: series.elapsed_s(),
        wall_time_s: run.wall_time_s,
        bins,
        spectral,
        stability,
    }
}
