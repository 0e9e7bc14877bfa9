//! Hardware Adapters
//!
//! Low-level communication with the thermistor board: the [`ByteSource`]
//! abstraction the decoder polls, the serial link implementing it, and the
//! startup handshake.

pub mod handshake;
#[cfg(feature = "instrument_serial")]
pub mod serial;
pub mod source;

pub use handshake::await_ready;
#[cfg(feature = "instrument_serial")]
pub use serial::{SerialLink, SerialLinkBuilder};
pub use source::{ByteSource, MemorySource, RecordingSource, ReplaySource};
