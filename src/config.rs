//! Configuration System using Figment
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Built-in defaults (the fixed constants of the bench setup)
//! 2. A TOML file (default `config/ntc_daq.toml`, missing file is fine)
//! 3. Environment variables prefixed with `NTC_DAQ_`, using `__` between
//!    section and key, e.g. `NTC_DAQ_SERIAL__PORT=/dev/ttyUSB0`
//!
//! # Example
//! ```no_run
//! use ntc_daq::config::Settings;
//!
//! let settings = Settings::load()?;
//! settings.validate()?;
//! println!("Port: {}", settings.serial.port);
//! # Ok::<(), ntc_daq::error::DaqError>(())
//! ```

use crate::conversion::ThermistorModel;
use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/ntc_daq.toml";

/// Longest accepted run, 31 days.
pub const MAX_DURATION_S: f64 = 31.0 * 24.0 * 3600.0;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationConfig,
    /// Serial port settings
    pub serial: SerialConfig,
    /// Ready-message handshake
    pub handshake: HandshakeConfig,
    /// Acquisition loop limits
    pub acquisition: AcquisitionConfig,
    /// Thermistor divider constants
    pub thermistor: ThermistorModel,
    /// Post-acquisition analysis parameters
    pub analysis: AnalysisConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port path (e.g., "/dev/ttyACM0", "COM6")
    pub port: String,
    pub baud_rate: u32,
    /// Bound on each header/data/terminator read
    pub read_timeout_ms: u64,
    /// Wait after opening the port while the board resets
    pub reset_delay_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 2000,
            reset_delay_ms: 2000,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }
}

/// Startup handshake configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Substring that marks the board as ready
    pub ready_marker: String,
    /// Lines to read before giving up
    pub max_lines: usize,
    pub line_timeout_ms: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            ready_marker: "Arduino ready".to_string(),
            max_lines: 5,
            line_timeout_ms: 5000,
        }
    }
}

impl HandshakeConfig {
    pub fn line_timeout(&self) -> Duration {
        Duration::from_millis(self.line_timeout_ms)
    }
}

/// Acquisition loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Run length in seconds
    pub duration_s: f64,
    /// Stop when no valid block arrived for this long
    pub stale_link_timeout_ms: u64,
    /// Sleep between polls while no bytes are waiting
    pub idle_poll_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            duration_s: 60.0,
            stale_link_timeout_ms: 5000,
            idle_poll_ms: 1,
        }
    }
}

/// Analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Width of the display aggregation bins
    pub bin_width_s: f64,
    /// Upper bound on the Welch segment length
    pub max_segment_len: usize,
    /// Spectral analysis is skipped below this segment length
    pub min_segment_len: usize,
    /// Number of log-spaced averaging intervals
    pub allan_points: usize,
    /// Allan deviation needs strictly more samples than this
    pub allan_min_samples: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bin_width_s: 1.0,
            max_segment_len: 2048,
            min_segment_len: 64,
            allan_points: 50,
            allan_min_samples: 100,
        }
    }
}

impl Settings {
    /// Load configuration from the default file and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::figment(path.as_ref()).extract().map_err(DaqError::from)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("NTC_DAQ_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(DaqError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        if self.serial.port.trim().is_empty() {
            return invalid("serial.port must not be empty".to_string());
        }
        if self.serial.baud_rate == 0 {
            return invalid("serial.baud_rate must be positive".to_string());
        }
        if self.serial.read_timeout_ms == 0 {
            return invalid("serial.read_timeout_ms must be positive".to_string());
        }

        if self.handshake.max_lines == 0 {
            return invalid("handshake.max_lines must be at least 1".to_string());
        }
        if self.handshake.ready_marker.is_empty() {
            return invalid("handshake.ready_marker must not be empty".to_string());
        }

        let duration = self.acquisition.duration_s;
        if !(duration.is_finite() && duration > 0.0) {
            return invalid(format!(
                "acquisition.duration_s must be positive and finite, got {duration}"
            ));
        }
        if duration > MAX_DURATION_S {
            return invalid(format!(
                "acquisition.duration_s must not exceed {MAX_DURATION_S} s, got {duration}"
            ));
        }
        if self.acquisition.stale_link_timeout_ms == 0 {
            return invalid("acquisition.stale_link_timeout_ms must be positive".to_string());
        }

        self.thermistor.validate().map_err(DaqError::Configuration)?;

        let analysis = &self.analysis;
        if !(analysis.bin_width_s.is_finite() && analysis.bin_width_s > 0.0) {
            return invalid(format!(
                "analysis.bin_width_s must be positive and finite, got {}",
                analysis.bin_width_s
            ));
        }
        if analysis.min_segment_len < 2 || analysis.min_segment_len > analysis.max_segment_len {
            return invalid(format!(
                "analysis segment lengths must satisfy 2 <= min ({}) <= max ({})",
                analysis.min_segment_len, analysis.max_segment_len
            ));
        }
        if analysis.allan_points < 2 {
            return invalid("analysis.allan_points must be at least 2".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_bench_setup() {
        let settings = Settings::default();
        assert_eq!(settings.serial.baud_rate, 115_200);
        assert_eq!(settings.handshake.ready_marker, "Arduino ready");
        assert_eq!(settings.handshake.max_lines, 5);
        assert_eq!(settings.acquisition.duration_s, 60.0);
        assert_eq!(settings.analysis.max_segment_len, 2048);
        assert_eq!(settings.thermistor, ThermistorModel::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn file_overrides_only_named_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[serial]
port = "/dev/ttyUSB3"

[thermistor]
beta = 3950.0

[acquisition]
duration_s = 5.5
"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.serial.port, "/dev/ttyUSB3");
        assert_eq!(settings.serial.baud_rate, 115_200);
        assert_eq!(settings.thermistor.beta, 3950.0);
        assert_eq!(settings.thermistor.r0_ohms, 10_000.0);
        assert_eq!(settings.acquisition.duration_s, 5.5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.serial, SerialConfig::default());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[serial]\nbaud_rate = \"fast\"").unwrap();
        match Settings::load_from(file.path()) {
            Err(DaqError::Config(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_log_level() {
        let mut settings = Settings::default();
        settings.application.log_level = "loud".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_inverted_segment_lengths() {
        let mut settings = Settings::default();
        settings.analysis.min_segment_len = 4096;
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("segment lengths"));
    }
}
