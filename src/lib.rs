//! # NTC DAQ Core Library
//!
//! Acquisition and analysis of NTC thermistor readings streamed by a
//! microcontroller over a serial link. The board samples its ADC in bursts and
//! sends each burst as a framed block; this crate decodes the frames, converts
//! raw counts to temperature and voltage, reconstructs per-sample timestamps
//! and, once the run is over, characterises the noise and long-term stability
//! of the measurement.
//!
//! ## Crate Structure
//!
//! - **`protocol`**: the `'S' | count | duration | data | 'E'` frame decoder and encoder.
//! - **`conversion`**: Beta-equation thermistor model (ADC count to °C and V).
//! - **`timing`**: per-sample timestamps, the block ledger behind the sampling
//!   rate, and the `Clock` abstraction.
//! - **`series`**: the accepted samples of one run.
//! - **`hardware`**: byte sources (serial link, memory, replay, recording) and
//!   the startup handshake.
//! - **`acquisition`**: the cooperative polling loop and its stop conditions.
//! - **`replay`**: decoding recorded captures offline.
//! - **`analysis`**: binning, Welch spectra with NETD, and Allan deviation,
//!   collected into an `AnalysisReport`.
//! - **`capabilities`**: optional analyzers compiled into this build.
//! - **`simulate`**: synthetic captures for running without a board.
//! - **`config`**, **`logging`**, **`error`**: the ambient plumbing.

pub mod acquisition;
pub mod analysis;
pub mod capabilities;
pub mod config;
pub mod conversion;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod protocol;
pub mod replay;
pub mod series;
pub mod simulate;
pub mod timing;
