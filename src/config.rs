//! Master-clock configuration.
//!
//! Mirrors the shape of `config::app_config::AppConfig` in the teacher
//! crate: a `serde`-derived struct with per-field defaults, plus TOML
//! round-trip helpers. There is no CLI here (spec.md §6: "CLI/environment:
//! none at the core level"), so unlike `AppConfig::load`/`save` there is no
//! default on-disk path resolved via `dirs` — an embedding application
//! decides where its config file lives and hands us the string.

use crate::clock::TimingPolicy;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_pool_size() -> usize {
    200
}

fn default_timing_policy() -> TimingPolicy {
    TimingPolicy::Relative
}

fn default_use_precise_timing() -> bool {
    true
}

fn default_busy_wait_threshold_micros() -> u64 {
    500
}

fn default_starting_rate() -> f64 {
    1.0
}

/// Configuration used to construct a master [`Clock`](crate::clock::Clock).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Capacity of the master's worker pool (spec.md §4.4 default: 200).
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Whether `wait_in_parent` counts from the last completed wait
    /// (`relative`) or from the clock's start time (`absolute`).
    #[serde(default = "default_timing_policy")]
    pub timing_policy: TimingPolicy,

    /// Enable the busy-wait tail in `PrecisionSleep` for sub-millisecond
    /// accuracy. Disabling it falls back to a single coarse sleep.
    #[serde(default = "default_use_precise_timing")]
    pub use_precise_timing: bool,

    /// Threshold below which `PrecisionSleep` stops sleeping and busy-waits.
    #[serde(default = "default_busy_wait_threshold_micros")]
    pub busy_wait_threshold_micros: u64,

    /// Starting rate (beats per parent-second) of the master's tempo map.
    #[serde(default = "default_starting_rate")]
    pub starting_rate: f64,
}

impl ClockConfig {
    pub fn busy_wait_threshold(&self) -> Duration {
        Duration::from_micros(self.busy_wait_threshold_micros)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            timing_policy: default_timing_policy(),
            use_precise_timing: default_use_precise_timing(),
            busy_wait_threshold_micros: default_busy_wait_threshold_micros(),
            starting_rate: default_starting_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_spec() {
        let config = ClockConfig::default();
        assert_eq!(config.pool_size, 200);
        assert_eq!(config.timing_policy, TimingPolicy::Relative);
        assert!(config.use_precise_timing);
        assert_eq!(config.busy_wait_threshold(), Duration::from_micros(500));
    }

    #[test]
    fn toml_round_trip() {
        let mut config = ClockConfig::default();
        config.pool_size = 16;
        config.timing_policy = TimingPolicy::Absolute;
        let toml_str = config.to_toml_string().unwrap();
        let parsed = ClockConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let parsed = ClockConfig::from_toml_str("pool_size = 8\n").unwrap();
        assert_eq!(parsed.pool_size, 8);
        assert_eq!(parsed.timing_policy, TimingPolicy::Relative);
    }

    #[test]
    fn round_trips_through_a_file_on_disk() {
        use std::io::Write;

        let mut config = ClockConfig::default();
        config.pool_size = 32;
        config.starting_rate = 2.0;

        let dir = tempdir().unwrap();
        let path = dir.path().join("clock.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes()).unwrap();
        drop(file);

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed = ClockConfig::from_toml_str(&contents).unwrap();
        assert_eq!(config, parsed);
    }
}
