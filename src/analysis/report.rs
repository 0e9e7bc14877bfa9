//! The serialisable outcome of a run.

use super::binning::Bin;
use super::spectral::SpectralResult;
use super::stability::StabilityResult;
use super::StageOutcome;
use crate::acquisition::StopReason;
use crate::error::{AppResult, DaqError};
use crate::protocol::DecoderStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Run metadata plus every analysis stage.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub stop_reason: StopReason,
    pub decoder: DecoderStats,
    pub blocks: usize,
    pub samples: usize,
    /// Samples dropped for a non-finite temperature or invalid voltage.
    pub rejected_samples: usize,
    pub sampling_rate_hz: Option<f64>,
    /// Span from first to last sample.
    pub elapsed_s: f64,
    pub wall_time_s: f64,
    pub bins: Vec<Bin>,
    pub spectral: StageOutcome<SpectralResult>,
    pub stability: StageOutcome<StabilityResult>,
}

impl AnalysisReport {
    /// Writes the report as pretty-printed JSON.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| DaqError::Processing(format!("failed to serialize report: {e}")))?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        info!(path = %path.display(), "Analysis report written");
        Ok(())
    }

    /// Emits the human-readable summary.
    pub fn log_summary(&self) {
        info!(
            stop_reason = ?self.stop_reason,
            blocks = self.blocks,
            samples = self.samples,
            rejected = self.rejected_samples,
            header_incomplete = self.decoder.header_incomplete,
            frame_corrupt = self.decoder.frame_corrupt,
            "Run summary"
        );
        if let Some(fs) = self.sampling_rate_hz {
            info!(
                "Collected {} samples over {:.2} s ({:.2} Hz)",
                self.samples, self.elapsed_s, fs
            );
        }
        if let (Some(first), Some(last)) = (self.bins.first(), self.bins.last()) {
            info!(
                bins = self.bins.len(),
                "Temperature {:.3} °C at {:.1} s, {:.3} °C at {:.1} s",
                first.temp_mean,
                first.center_time_s,
                last.temp_mean,
                last.center_time_s
            );
        }
        match &self.spectral {
            StageOutcome::Completed(spectrum) => match spectrum.netd.completed() {
                Some(band) => info!(
                    "Mean NETD ({:.1}-{:.1} Hz): {:.4e} °C/sqrt(Hz)",
                    band.low_hz, band.high_hz, band.mean_asd
                ),
                None => info!(segments = spectrum.segments, "Spectrum computed without NETD band"),
            },
            StageOutcome::Skipped(reason) => info!(%reason, "No spectrum"),
        }
        match &self.stability {
            StageOutcome::Completed(curve) => {
                if let Some(best) = curve.best {
                    info!(
                        "Best stability (min ADEV): {:.4e} °C at τ = {:.2} s",
                        best.adev, best.tau_s
                    );
                }
            }
            StageOutcome::Skipped(reason) => info!(%reason, "No Allan deviation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SkipReason;
    use tempfile::tempdir;

    fn report() -> AnalysisReport {
        AnalysisReport {
            generated_at: Utc::now(),
            stop_reason: StopReason::StaleLink,
            decoder: DecoderStats::default(),
            blocks: 0,
            samples: 0,
            rejected_samples: 2,
            sampling_rate_hz: None,
            elapsed_s: 0.0,
            wall_time_s: 5.0,
            bins: Vec::new(),
            spectral: StageOutcome::Skipped(SkipReason::NoData),
            stability: StageOutcome::Skipped(SkipReason::NoData),
        }
    }

    #[test]
    fn json_report_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        report().write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["stop_reason"], "stale_link");
        assert_eq!(value["rejected_samples"], 2);
        assert!(value["sampling_rate_hz"].is_null());
        assert_eq!(value["spectral"]["status"], "skipped");
        assert!(value["generated_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn writing_into_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let err = report()
            .write_json(dir.path().join("missing").join("report.json"))
            .unwrap_err();
        assert!(matches!(err, DaqError::Io(_)));
    }
}
