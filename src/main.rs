//! CLI Entry Point for ntc_daq
//!
//! Provides command-line interface for:
//! - Acquiring from the thermistor board and analysing the run
//! - Replaying a recorded raw capture through the same pipeline
//! - Writing synthetic captures for testing without hardware
//!
//! # Usage
//!
//! Acquire for two minutes, keep the raw bytes and a JSON report:
//! ```bash
//! ntc_daq acquire --port /dev/ttyACM0 --duration 120 --capture run.bin --report run.json
//! ```
//!
//! Re-analyse the capture later:
//! ```bash
//! ntc_daq replay run.bin --report replay.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ntc_daq::acquisition::{AcquisitionRun, StopReason};
use ntc_daq::analysis::analyze;
use ntc_daq::capabilities::Capabilities;
use ntc_daq::config::Settings;
use ntc_daq::error::{AppResult, DaqError};
use ntc_daq::hardware::ReplaySource;
use ntc_daq::logging;
use ntc_daq::replay::replay;
use ntc_daq::simulate::SyntheticCapture;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ntc_daq")]
#[command(about = "NTC thermistor acquisition with noise and stability analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire from the board, then analyse the run
    Acquire {
        /// Configuration file (defaults to config/ntc_daq.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Serial port, overrides serial.port
        #[arg(long)]
        port: Option<String>,

        /// Run duration in seconds, overrides acquisition.duration_s
        #[arg(long)]
        duration: Option<f64>,

        /// Record the raw byte stream for later replay
        #[arg(long)]
        capture: Option<PathBuf>,

        /// Write the analysis report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Analyse a recorded capture
    Replay {
        /// Raw capture written by `acquire --capture` or `simulate`
        capture: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Write a synthetic capture (sine plus noise around 25 °C)
    Simulate {
        output: PathBuf,

        #[arg(long, default_value = "200")]
        blocks: usize,

        #[arg(long, default_value = "100")]
        samples_per_block: u16,

        /// Sample rate in Hz
        #[arg(long, default_value = "1000")]
        rate: f64,

        #[arg(long, default_value = "0")]
        seed: u64,

        /// Break the terminator of every n-th frame (0 = never)
        #[arg(long, default_value = "0")]
        corrupt_every: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Acquire {
            config,
            port,
            duration,
            capture,
            report,
        } => {
            let mut settings = load_settings(config.as_deref())?;
            if let Some(port) = port {
                settings.serial.port = port;
            }
            if let Some(duration) = duration {
                settings.acquisition.duration_s = duration;
            }
            start(&settings)?;
            acquire(settings, capture, report).await
        }
        Commands::Replay {
            capture,
            config,
            report,
        } => {
            let settings = load_settings(config.as_deref())?;
            start(&settings)?;
            replay_capture(settings, capture, report).await
        }
        Commands::Simulate {
            output,
            blocks,
            samples_per_block,
            rate,
            seed,
            corrupt_every,
        } => {
            let settings = load_settings(None)?;
            start(&settings)?;
            let generator = SyntheticCapture {
                blocks,
                samples_per_block,
                sample_rate_hz: rate,
                seed,
                corrupt_every,
                model: settings.thermistor,
                ..Default::default()
            };
            generator
                .write_to(&output)
                .with_context(|| format!("Failed to write capture {}", output.display()))?;
            Ok(())
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Settings::load().context("Failed to load configuration")?,
    };
    Ok(settings)
}

/// Validates the final settings and brings up logging.
fn start(settings: &Settings) -> Result<()> {
    settings.validate().context("Invalid configuration")?;
    logging::init_from_settings(settings).map_err(anyhow::Error::msg)?;
    info!(version = env!("CARGO_PKG_VERSION"), "ntc_daq starting");
    Ok(())
}

async fn acquire(settings: Settings, capture: Option<PathBuf>, report: Option<PathBuf>) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let on_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping acquisition");
            on_signal.store(true, Ordering::SeqCst);
        }
    });

    let capabilities = Capabilities::detect();
    let loop_settings = settings.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        live::acquire(&loop_settings, capture.as_deref(), stop)
    })
    .await
    .context("Acquisition task failed")?;

    let run = match outcome {
        Ok(run) => run,
        Err(DaqError::Interrupted(during)) => {
            warn!("Stopped while {during}, nothing to analyse");
            return Ok(());
        }
        Err(e) if e.is_link_failure() => {
            return Err(anyhow::Error::new(e).context("Serial link failed, run discarded"));
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Acquisition aborted")),
    };

    if run.stop_reason == StopReason::Interrupted && run.series.is_empty() {
        warn!("Interrupted before any samples arrived, nothing to analyse");
        return Ok(());
    }
    finish(&run, &settings, &capabilities, report.as_deref())
}

async fn replay_capture(settings: Settings, capture: PathBuf, report: Option<PathBuf>) -> Result<()> {
    info!(path = %capture.display(), "Replaying capture");
    let file = File::open(&capture)
        .with_context(|| format!("Failed to open capture {}", capture.display()))?;

    let model = settings.thermistor;
    let read_timeout = settings.serial.read_timeout();
    let run = tokio::task::spawn_blocking(move || {
        replay(&mut ReplaySource::new(file), &model, read_timeout)
    })
    .await
    .context("Replay task failed")??;

    finish(&run, &settings, &Capabilities::detect(), report.as_deref())
}

fn finish(
    run: &AcquisitionRun,
    settings: &Settings,
    capabilities: &Capabilities,
    report_path: Option<&Path>,
) -> Result<()> {
    let report = analyze(run, capabilities, &settings.analysis);
    report.log_summary();
    if let Some(path) = report_path {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }
    Ok(())
}

#[cfg(feature = "instrument_serial")]
mod live {
    use super::*;
    use ntc_daq::acquisition::{AcquisitionLoop, AcquisitionOptions};
    use ntc_daq::hardware::{await_ready, RecordingSource, SerialLinkBuilder};
    use ntc_daq::timing::MonotonicClock;
    use std::io::BufWriter;

    /// Opens the link, waits for the board, and runs the loop. The port is
    /// closed when this returns, whatever the outcome.
    pub fn acquire(
        settings: &Settings,
        capture: Option<&Path>,
        stop: Arc<AtomicBool>,
    ) -> AppResult<AcquisitionRun> {
        let options = AcquisitionOptions::try_from(settings)?;
        let mut link = SerialLinkBuilder::from_config(&settings.serial)
            .with_stop_flag(stop.clone())
            .open()?;
        await_ready(&mut link, &settings.handshake, &stop)?;
        info!(port = %link.port_name(), "Link established, starting acquisition");

        let clock = MonotonicClock::new();
        let acquisition =
            AcquisitionLoop::new(options, settings.thermistor, &clock).with_stop_flag(stop);

        match capture {
            Some(path) => {
                let sink = BufWriter::new(File::create(path)?);
                let mut recorder = RecordingSource::new(link, sink);
                let run = acquisition.run(&mut recorder)?;
                recorder.finish()?;
                info!(path = %path.display(), "Raw capture saved");
                Ok(run)
            }
            None => acquisition.run(&mut link),
        }
    }
}

#[cfg(not(feature = "instrument_serial"))]
mod live {
    use super::*;

    pub fn acquire(
        _settings: &Settings,
        _capture: Option<&Path>,
        _stop: Arc<AtomicBool>,
    ) -> AppResult<AcquisitionRun> {
        Err(DaqError::FeatureNotEnabled("instrument_serial".into()))
    }
}
