//! Configuration for the simulation engine

use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of patterns (revenue + expense) per run
    pub max_patterns: usize,

    /// Soft wall-clock budget per run (warning threshold, not a failure)
    pub soft_deadline_ms: u64,

    /// Heartbeat interval for progress subscribers, in milliseconds
    pub heartbeat_interval_ms: u64,

    /// Per-subscriber progress channel capacity
    ///
    /// A subscriber that falls further behind than this loses intermediate
    /// snapshots; the terminal event is always delivered.
    pub subscriber_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_patterns: 100,          // hard input limit
            soft_deadline_ms: 200,      // performance target per run
            heartbeat_interval_ms: 30_000,
            subscriber_buffer: 32,
        }
    }
}

impl EngineConfig {
    /// Load defaults with environment variable overrides
    pub fn from_env() -> Self {
        let mut config = EngineConfig::default();

        if let Some(v) = env_parse("SIM_MAX_PATTERNS") {
            config.max_patterns = v;
        }
        if let Some(v) = env_parse("SIM_SOFT_DEADLINE_MS") {
            config.soft_deadline_ms = v;
        }
        if let Some(v) = env_parse("SIM_HEARTBEAT_INTERVAL_MS") {
            config.heartbeat_interval_ms = v;
        }
        if let Some(v) = env_parse("SIM_SUBSCRIBER_BUFFER") {
            config.subscriber_buffer = v;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_patterns, 100);
        assert_eq!(config.soft_deadline_ms, 200);
        assert_eq!(config.heartbeat_interval_ms, 30_000);
    }
}
