//! Correlator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Correlator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    /// How long a resolved token stays unreusable, in milliseconds
    #[serde(rename = "quarantine-ms", default = "default_quarantine_ms")]
    pub quarantine_ms: u64,

    /// Channel buffer size for correlator requests
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

fn default_quarantine_ms() -> u64 {
    debug!("default_quarantine_ms: called");
    60_000
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    1024
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        debug!("CorrelatorConfig::default: called");
        Self {
            quarantine_ms: default_quarantine_ms(),
            channel_buffer: default_channel_buffer(),
        }
    }
}

impl CorrelatorConfig {
    /// Quarantine window as a Duration
    pub fn quarantine(&self) -> Duration {
        Duration::from_millis(self.quarantine_ms)
    }

    /// Channel buffer, never zero (tokio panics on a zero-capacity channel)
    pub fn channel_capacity(&self) -> usize {
        self.channel_buffer.max(1)
    }
}
