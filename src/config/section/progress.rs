//! `[progress]` section configuration.
//!
//! ```toml
//! [progress]
//! grace_ms = 300    # silence before the first progress marker
//! tick_ms = 300     # interval between markers
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Progress reporter timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub grace_ms: u64,
    pub tick_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            grace_ms: 300,
            tick_ms: 300,
        }
    }
}

impl ProgressConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}
