//! Optional analysis support resolved once at startup.

use serde::Serialize;

/// Which optional analyzers this build provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Allan deviation, behind the `stability` feature.
    pub allan_deviation: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        let caps = Self {
            allan_deviation: cfg!(feature = "stability"),
        };
        if !caps.allan_deviation {
            tracing::warn!("Built without the 'stability' feature, Allan deviation is disabled");
        }
        caps
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}
