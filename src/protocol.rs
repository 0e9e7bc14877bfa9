//! Block framing used by the thermistor firmware.
//!
//! Every block travels as one little-endian frame:
//!
//! ```text
//! byte    'S'                     sync
//! uint16  sample_count
//! uint32  duration_micros
//! uint16[sample_count]  raw ADC values
//! byte    'E'                     terminator
//! ```
//!
//! The decoder tolerates arbitrary noise between frames. A malformed frame is
//! never an error: it comes back as [`DecodeOutcome::HeaderIncomplete`] or
//! [`DecodeOutcome::FrameCorrupt`], the receive buffer is flushed, and the next
//! sync byte starts over. Only genuine I/O failures surface as `Err`.

use crate::hardware::source::{read_with_deadline, ByteSource};
use serde::Serialize;
use std::io;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Frame start marker.
pub const SYNC_BYTE: u8 = b'S';
/// Frame end marker.
pub const END_BYTE: u8 = b'E';
/// `sample_count` (2 bytes) plus `duration_micros` (4 bytes).
pub const HEADER_LEN: usize = 6;

/// One framed burst of ADC samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub sample_count: u16,
    pub duration_micros: u32,
    pub raw_samples: Vec<u16>,
}

impl Block {
    /// Builds a block whose declared count matches `raw_samples`.
    ///
    /// Returns `None` for an empty or oversized sample list.
    pub fn new(duration_micros: u32, raw_samples: Vec<u16>) -> Option<Self> {
        let sample_count = u16::try_from(raw_samples.len()).ok().filter(|&n| n > 0)?;
        Some(Self {
            sample_count,
            duration_micros,
            raw_samples,
        })
    }

    pub fn duration_s(&self) -> f64 {
        f64::from(self.duration_micros) / 1_000_000.0
    }
}

/// Why a frame that started with a sync byte was thrown away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFault {
    /// The header declared zero samples.
    ZeroLength,
    /// Fewer data bytes arrived than the header promised.
    ShortData { expected: usize, received: usize },
    /// The byte after the data was not `'E'` (`None` if it never arrived).
    BadTerminator { found: Option<u8> },
}

/// Result of decoding one frame after a sync byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Block(Block),
    HeaderIncomplete { received: usize },
    FrameCorrupt(FrameFault),
}

/// Running totals kept by the decoder.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    pub blocks: u64,
    pub header_incomplete: u64,
    pub frame_corrupt: u64,
    /// Bytes skipped while hunting for a sync byte.
    pub noise_bytes: u64,
}

/// Stateful frame decoder.
///
/// Each call to [`poll`](Self::poll) consumes at most one byte of noise or one
/// complete frame, so the caller keeps control of timing between calls.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    read_timeout: Duration,
    stats: DecoderStats,
}

impl FrameDecoder {
    /// `read_timeout` bounds each of the header, data and terminator reads.
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            read_timeout,
            stats: DecoderStats::default(),
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Reads one byte and, if it is a sync byte, the rest of the frame.
    ///
    /// Returns `Ok(None)` when nothing was waiting or the byte was noise.
    pub fn poll<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> io::Result<Option<DecodeOutcome>> {
        let mut first = [0u8; 1];
        if source.read(&mut first)? == 0 {
            return Ok(None);
        }
        if first[0] != SYNC_BYTE {
            self.stats.noise_bytes += 1;
            trace!(byte = first[0], "Skipping non-sync byte");
            return Ok(None);
        }

        let outcome = self.read_frame_body(source)?;
        match &outcome {
            DecodeOutcome::Block(block) => {
                self.stats.blocks += 1;
                debug!(
                    samples = block.sample_count,
                    duration_us = block.duration_micros,
                    "Block received ({:.2} ms)",
                    block.duration_s() * 1000.0
                );
            }
            DecodeOutcome::HeaderIncomplete { received } => {
                self.stats.header_incomplete += 1;
                warn!(received, expected = HEADER_LEN, "Header not received completely, resynchronizing");
                source.discard_input()?;
            }
            DecodeOutcome::FrameCorrupt(fault) => {
                self.stats.frame_corrupt += 1;
                warn!(?fault, "Corrupt frame discarded, resynchronizing");
                source.discard_input()?;
            }
        }
        Ok(Some(outcome))
    }

    fn read_frame_body<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> io::Result<DecodeOutcome> {
        let mut header = [0u8; HEADER_LEN];
        let received = read_with_deadline(source, &mut header, self.read_timeout)?;
        if received < HEADER_LEN {
            return Ok(DecodeOutcome::HeaderIncomplete { received });
        }

        let sample_count = u16::from_le_bytes([header[0], header[1]]);
        let duration_micros = u32::from_le_bytes([header[2], header[3], header[4], header[5]]);

        let expected = usize::from(sample_count) * 2;
        let mut data = vec![0u8; expected];
        let received = read_with_deadline(source, &mut data, self.read_timeout)?;

        let mut end = [0u8; 1];
        let terminator = (read_with_deadline(source, &mut end, self.read_timeout)? == 1).then_some(end[0]);

        if received < expected {
            return Ok(DecodeOutcome::FrameCorrupt(FrameFault::ShortData { expected, received }));
        }
        if terminator != Some(END_BYTE) {
            return Ok(DecodeOutcome::FrameCorrupt(FrameFault::BadTerminator { found: terminator }));
        }
        if sample_count == 0 {
            return Ok(DecodeOutcome::FrameCorrupt(FrameFault::ZeroLength));
        }

        let raw_samples = data
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(DecodeOutcome::Block(Block {
            sample_count,
            duration_micros,
            raw_samples,
        }))
    }
}

/// Encodes a block in wire format, trusting `sample_count` as declared.
pub fn encode_block(block: &Block) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + 2 + block.raw_samples.len() * 2);
    frame.push(SYNC_BYTE);
    frame.extend_from_slice(&block.sample_count.to_le_bytes());
    frame.extend_from_slice(&block.duration_micros.to_le_bytes());
    for sample in &block.raw_samples {
        frame.extend_from_slice(&sample.to_le_bytes());
    }
    frame.push(END_BYTE);
    frame
}
