//! Engine tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing configuration for one engine instance.
///
/// Defaults mirror the production values: a ~900 ms coalescing window and
/// a fixed 10 s feed reconnect delay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Coalescing window W in milliseconds: triggers inside the window
    /// collapse into one refresh at `last_run + W`.
    pub coalesce_window_ms: u64,
    /// Fixed delay before re-subscribing after feed transport loss.
    pub reconnect_delay_ms: u64,
    /// Granularity of shutdown checks in background loops.
    pub poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            coalesce_window_ms: default_coalesce_window_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

const fn default_coalesce_window_ms() -> u64 {
    900
}

const fn default_reconnect_delay_ms() -> u64 {
    10_000
}

const fn default_poll_interval_ms() -> u64 {
    250
}

impl EngineConfig {
    #[must_use]
    pub const fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_values() {
        let config = EngineConfig::default();
        assert_eq!(config.coalesce_window(), Duration::from_millis(900));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(10));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"coalesce_window_ms": 100}"#).expect("decode");
        assert_eq!(config.coalesce_window_ms, 100);
        assert_eq!(config.reconnect_delay_ms, 10_000);
    }
}
