//! Offline analysis of recorded captures.
//!
//! A capture is the raw byte stream of a live run (see
//! [`RecordingSource`](crate::hardware::RecordingSource)). Arrival times are not
//! part of the stream, so replay assumes blocks were acquired back to back:
//! each block arrives exactly one block duration after the previous one.

use crate::acquisition::{AcquisitionRun, StopReason};
use crate::conversion::ThermistorModel;
use crate::error::{AppResult, DaqError};
use crate::hardware::ByteSource;
use crate::protocol::{DecodeOutcome, FrameDecoder};
use crate::series::Series;
use crate::timing::BlockLedger;
use std::time::Duration;
use tracing::info;

/// Decodes every frame in `source` until it runs dry.
pub fn replay<S: ByteSource + ?Sized>(
    source: &mut S,
    model: &ThermistorModel,
    read_timeout: Duration,
) -> AppResult<AcquisitionRun> {
    let mut decoder = FrameDecoder::new(read_timeout);
    let mut series = Series::new();
    let mut ledger = BlockLedger::new();
    let mut clock_s = 0.0;

    while source.bytes_available().map_err(DaqError::Io)? > 0 {
        if let Some(DecodeOutcome::Block(block)) = decoder.poll(source)? {
            clock_s += block.duration_s();
            ledger.record(&block);
            series.ingest_block(&block, clock_s, model);
        }
    }

    let decoder = decoder.stats();
    info!(
        blocks = decoder.blocks,
        samples = series.len(),
        corrupt = decoder.frame_corrupt + decoder.header_incomplete,
        "Capture replayed"
    );

    Ok(AcquisitionRun {
        series,
        ledger,
        decoder,
        stop_reason: StopReason::EndOfCapture,
        wall_time_s: clock_s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::ReplaySource;
    use crate::protocol::{encode_block, Block};

    #[test]
    fn blocks_are_laid_end_to_end() {
        let mut capture = Vec::new();
        for _ in 0..3 {
            capture.extend(encode_block(&Block::new(100_000, vec![512; 10]).unwrap()));
            capture.extend_from_slice(b"\x00\xff");
        }
        let mut source = ReplaySource::new(capture.as_slice());

        let run = replay(&mut source, &ThermistorModel::default(), Duration::from_millis(10)).unwrap();
        assert_eq!(run.stop_reason, StopReason::EndOfCapture);
        assert_eq!(run.series.len(), 30);
        assert_eq!(run.decoder.noise_bytes, 6);
        assert!((run.wall_time_s - 0.3).abs() < 1e-12);

        let t = run.series.timestamps();
        assert!(t.windows(2).all(|w| w[1] > w[0]));
        assert!(t[0].abs() < 1e-12);
        assert!((t[29] - 0.29).abs() < 1e-9);
    }

    #[test]
    fn truncated_tail_is_counted_not_fatal() {
        let mut capture = encode_block(&Block::new(10_000, vec![512; 4]).unwrap());
        let partial = encode_block(&Block::new(10_000, vec![512; 4]).unwrap());
        capture.extend_from_slice(&partial[..5]);

        let run = replay(
            &mut ReplaySource::new(capture.as_slice()),
            &ThermistorModel::default(),
            Duration::from_millis(10),
        )
        .unwrap();
        assert_eq!(run.decoder.blocks, 1);
        assert_eq!(run.decoder.header_incomplete, 1);
    }
}
