//! Simulation run configuration.

use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a simulation run.
///
/// Loadable from JSON; any missing field takes its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Virtual time each scenario runs for, in milliseconds
    pub duration_millis: u64,

    /// Control-loop period, in milliseconds
    pub tick_millis: u64,

    /// Number of behaviors in arbitration scenarios
    pub behaviors: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            duration_millis: 2_000,
            tick_millis: 20,
            behaviors: 4,
        }
    }
}

impl SimConfig {
    /// Reads a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.tick_millis == 0 {
            return Err(SimError::config("tick_millis must be greater than zero"));
        }
        if self.duration_millis < self.tick_millis {
            return Err(SimError::config("duration_millis must cover at least one tick"));
        }
        if self.behaviors == 0 {
            return Err(SimError::config("behaviors must be at least 1"));
        }
        Ok(())
    }

    /// Number of whole ticks in the run.
    pub fn ticks(&self) -> u64 {
        self.duration_millis / self.tick_millis.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SimConfig = serde_json::from_str(r#"{ "seed": 7, "behaviors": 2 }"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.behaviors, 2);
        assert_eq!(config.tick_millis, SimConfig::default().tick_millis);
    }

    #[test]
    fn test_validate_rejects_zero_tick() {
        let config = SimConfig {
            tick_millis: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SimError::Config(_))));
    }

    #[test]
    fn test_ticks() {
        let config = SimConfig {
            duration_millis: 1_000,
            tick_millis: 20,
            ..Default::default()
        };
        assert_eq!(config.ticks(), 50);
    }

    #[test]
    fn test_from_file_round_trip() {
        let path = std::env::temp_dir().join(format!("ccre_sim_config_{}.json", std::process::id()));
        let config = SimConfig {
            seed: 99,
            ..Default::default()
        };
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        let loaded = SimConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
