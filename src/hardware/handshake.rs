//! Startup handshake: wait for the board to announce itself.

use crate::config::HandshakeConfig;
use crate::error::{AppResult, DaqError};
use crate::hardware::source::{read_line, ByteSource};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Reads up to `config.max_lines` lines looking for `config.ready_marker`.
///
/// Every non-empty line is logged as device output. Lines that time out count
/// toward the limit. Fails with [`DaqError::HandshakeTimeout`] if the marker
/// never shows up, [`DaqError::LinkLost`] if the link fails while reading, or
/// [`DaqError::Interrupted`] if `stop` is raised between two lines.
pub fn await_ready<S: ByteSource + ?Sized>(
    source: &mut S,
    config: &HandshakeConfig,
    stop: &AtomicBool,
) -> AppResult<()> {
    info!(marker = %config.ready_marker, "Waiting for start message from board");

    for attempt in 1..=config.max_lines {
        if stop.load(Ordering::SeqCst) {
            warn!(attempt, "Handshake aborted by user");
            return Err(DaqError::Interrupted("waiting for the board"));
        }
        let line = read_line(source, config.line_timeout()).map_err(DaqError::LinkLost)?;
        match line {
            Some(line) if line.contains(&config.ready_marker) => {
                info!(device = %line, "Board ready");
                return Ok(());
            }
            Some(line) if !line.is_empty() => info!(device = %line, attempt, "Device output"),
            Some(_) => {}
            None => warn!(attempt, "Timed out waiting for a line from the board"),
        }
    }

    Err(DaqError::HandshakeTimeout {
        marker: config.ready_marker.clone(),
        attempts: config.max_lines,
    })
}
