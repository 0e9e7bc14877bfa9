//! The acquisition loop.
//!
//! A single thread polls the byte source cooperatively: when bytes are waiting
//! it hands one frame (or one noise byte) to the decoder, otherwise it sleeps
//! for the idle interval. Reads inside a frame block for at most the read
//! timeout, never indefinitely.
//!
//! The loop ends when
//! - the configured duration has elapsed,
//! - no valid block arrived within the stale-link timeout,
//! - the stop flag is raised (user interrupt), or
//! - the link fails, which is returned as [`DaqError::LinkLost`].
//!
//! Only the last case discards the data; the others hand back an
//! [`AcquisitionRun`] for analysis.

use crate::config::Settings;
use crate::conversion::ThermistorModel;
use crate::error::{AppResult, DaqError};
use crate::hardware::ByteSource;
use crate::protocol::{DecodeOutcome, DecoderStats, FrameDecoder};
use crate::series::Series;
use crate::timing::{BlockLedger, Clock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn};

/// Why acquisition ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured run duration elapsed.
    DurationReached,
    /// No valid block within the stale-link timeout.
    StaleLink,
    /// The stop flag was raised.
    Interrupted,
    /// A replayed capture was fully consumed.
    EndOfCapture,
}

/// Everything collected during one run.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionRun {
    pub series: Series,
    pub ledger: BlockLedger,
    pub decoder: DecoderStats,
    pub stop_reason: StopReason,
    /// Wall time spent in the loop.
    pub wall_time_s: f64,
}

/// Timing limits of the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionOptions {
    pub duration: Duration,
    pub stale_link_timeout: Duration,
    pub idle_poll: Duration,
    pub read_timeout: Duration,
}

impl TryFrom<&Settings> for AcquisitionOptions {
    type Error = DaqError;

    fn try_from(settings: &Settings) -> AppResult<Self> {
        let duration_s = settings.acquisition.duration_s;
        let duration = Duration::try_from_secs_f64(duration_s).map_err(|e| {
            DaqError::Configuration(format!("acquisition.duration_s {duration_s} is not a valid run length: {e}"))
        })?;
        Ok(Self {
            duration,
            stale_link_timeout: Duration::from_millis(settings.acquisition.stale_link_timeout_ms),
            idle_poll: Duration::from_millis(settings.acquisition.idle_poll_ms),
            read_timeout: settings.serial.read_timeout(),
        })
    }
}

/// One configured acquisition, ready to run against a byte source.
pub struct AcquisitionLoop<'a, C: Clock + ?Sized> {
    options: AcquisitionOptions,
    model: ThermistorModel,
    clock: &'a C,
    stop: Arc<AtomicBool>,
}

impl<'a, C: Clock + ?Sized> AcquisitionLoop<'a, C> {
    pub fn new(options: AcquisitionOptions, model: ThermistorModel, clock: &'a C) -> Self {
        Self {
            options,
            model,
            clock,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares a stop flag with the caller; raising it ends the run as
    /// [`StopReason::Interrupted`].
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn run<S: ByteSource + ?Sized>(self, source: &mut S) -> AppResult<AcquisitionRun> {
        let span = info_span!("acquisition", duration_s = self.options.duration.as_secs_f64());
        let _enter = span.enter();

        let mut decoder = FrameDecoder::new(self.options.read_timeout);
        let mut series = Series::new();
        let mut ledger = BlockLedger::new();

        let duration = self.options.duration.as_secs_f64();
        let stale_after = self.options.stale_link_timeout.as_secs_f64();
        let start = self.clock.now_s();
        let mut last_block = start;

        info!("Starting data acquisition");

        let stop_reason = loop {
            if self.stop.load(Ordering::SeqCst) {
                warn!("Measurement aborted by user");
                break StopReason::Interrupted;
            }
            if self.clock.now_s() - start >= duration {
                break StopReason::DurationReached;
            }

            let waiting = source.bytes_available().map_err(DaqError::LinkLost)?;
            if waiting > 0 {
                if let Some(DecodeOutcome::Block(block)) =
                    decoder.poll(source).map_err(DaqError::LinkLost)?
                {
                    let arrival = self.clock.now_s();
                    ledger.record(&block);
                    series.ingest_block(&block, arrival, &self.model);
                    last_block = arrival;
                }
            } else {
                self.clock.sleep(self.options.idle_poll);
            }

            if self.clock.now_s() - last_block > stale_after {
                warn!(
                    timeout_s = stale_after,
                    "No data received from board, aborting acquisition"
                );
                break StopReason::StaleLink;
            }
        };

        let wall_time_s = self.clock.now_s() - start;
        let decoder = decoder.stats();
        info!(
            ?stop_reason,
            blocks = decoder.blocks,
            samples = series.len(),
            rejected = series.rejected(),
            "Data acquisition finished"
        );

        Ok(AcquisitionRun {
            series,
            ledger,
            decoder,
            stop_reason,
            wall_time_s,
        })
    }
}
