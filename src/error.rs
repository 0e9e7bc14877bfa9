//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized way to report the
//! failures that abort a run: configuration problems, an unusable serial link,
//! or a board that never announced itself.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically parse or type errors in the
//!   TOML file or in `NTC_DAQ_` environment overrides.
//! - **`Configuration`**: Semantic errors caught by `Settings::validate`, such as a
//!   non-positive Beta coefficient.
//! - **`Io`**: Plain `std::io::Error` from files (capture recordings, reports).
//! - **`LinkUnavailable`** / **`LinkLost`**: The serial connection could not be opened
//!   or failed while acquiring. Both are fatal for the run.
//! - **`HandshakeTimeout`**: The ready marker never arrived.
//! - **`Interrupted`**: The user stopped the program before acquisition began,
//!   so there is nothing to analyse.
//! - **`FeatureNotEnabled`**: Functionality that was compiled out via feature flags.
//!
//! Malformed frames, saturated samples and analysis stages that lack data are not
//! errors at all; they are reported as values (`DecodeOutcome`, dropped samples,
//! `StageOutcome::Skipped`).

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial link '{port}' unavailable: {reason}")]
    LinkUnavailable { port: String, reason: String },

    #[error("Serial link lost during acquisition: {0}")]
    LinkLost(std::io::Error),

    #[error("Ready marker '{marker}' not received after {attempts} line reads")]
    HandshakeTimeout { marker: String, attempts: usize },

    #[error("Interrupted by user while {0}")]
    Interrupted(&'static str),

    #[error("Data processing error: {0}")]
    Processing(String),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl DaqError {
    /// Whether the failure concerns the serial link itself (as opposed to
    /// configuration or local files).
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            DaqError::LinkUnavailable { .. } | DaqError::LinkLost(_) | DaqError::HandshakeTimeout { .. }
        )
    }
}
