//! Serial link to the thermistor board.
//!
//! Wraps a `serialport` handle as a [`ByteSource`]. The port is closed when the
//! link is dropped, so every exit path of an acquisition (normal end, stale
//! link, error, interrupt) releases it.

use crate::config::SerialConfig;
use crate::error::{AppResult, DaqError};
use crate::hardware::source::ByteSource;
use crate::timing::{sleep_unless_stopped, MonotonicClock};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Builder for constructing a [`SerialLink`] with custom settings
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use ntc_daq::hardware::SerialLinkBuilder;
///
/// let link = SerialLinkBuilder::new("/dev/ttyACM0".to_string(), 115_200)
///     .with_timeout(Duration::from_millis(500))
///     .open()?;
/// # Ok::<(), ntc_daq::error::DaqError>(())
/// ```
pub struct SerialLinkBuilder {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    reset_delay: Duration,
    stop: Arc<AtomicBool>,
}

impl SerialLinkBuilder {
    /// Default configuration:
    /// * timeout: 2 seconds
    /// * reset_delay: 2 seconds
    pub fn new(port_name: String, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            timeout: Duration::from_secs(2),
            reset_delay: Duration::from_secs(2),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &SerialConfig) -> Self {
        Self::new(config.port.clone(), config.baud_rate)
            .with_timeout(config.read_timeout())
            .with_reset_delay(config.reset_delay())
    }

    /// Set the per-read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Opening the port toggles DTR, which resets most Arduino-style boards.
    /// The link waits this long before the first read.
    pub fn with_reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = delay;
        self
    }

    /// Raising this flag during the reset delay abandons the connection.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn open(self) -> AppResult<SerialLink> {
        info!(
            port = %self.port_name,
            baud = self.baud_rate,
            "Connecting to board"
        );
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|e| DaqError::LinkUnavailable {
                port: self.port_name.clone(),
                reason: e.to_string(),
            })?;

        if !sleep_unless_stopped(&MonotonicClock::new(), self.reset_delay, &self.stop) {
            return Err(DaqError::Interrupted("waiting for the board to reset"));
        }

        Ok(SerialLink {
            port_name: self.port_name,
            port,
        })
    }
}

/// An open serial connection.
pub struct SerialLink {
    port_name: String,
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl ByteSource for SerialLink {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        debug!(port = %self.port_name, "Serial connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_takes_timeouts_from_config() {
        let config = SerialConfig {
            port: "/dev/ttyUSB9".to_string(),
            baud_rate: 9600,
            read_timeout_ms: 250,
            reset_delay_ms: 0,
        };
        let builder = SerialLinkBuilder::from_config(&config);
        assert_eq!(builder.port_name, "/dev/ttyUSB9");
        assert_eq!(builder.baud_rate, 9600);
        assert_eq!(builder.timeout, Duration::from_millis(250));
        assert_eq!(builder.reset_delay, Duration::ZERO);
    }

    #[test]
    fn opening_a_missing_port_is_link_unavailable() {
        let result = SerialLinkBuilder::new("/dev/ntc-daq-no-such-port".to_string(), 115_200)
            .with_reset_delay(Duration::ZERO)
            .open();
        match result {
            Err(DaqError::LinkUnavailable { port, .. }) => {
                assert_eq!(port, "/dev/ntc-daq-no-such-port");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opened a port that does not exist"),
        }
    }
}
