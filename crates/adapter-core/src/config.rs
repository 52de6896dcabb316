//! Configuration loading.
//!
//! Settings structs carry their defaults; `load_config` layers an optional
//! TOML file and `PITLINK_`-prefixed environment variables on top, so a
//! bare deployment runs with no file at all.

use ::config::{Config, ConfigError, Environment, File};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Lifecycle policy knobs shared by every adapter kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Retry automatically after an unexpected disconnection.
    pub auto_reconnect: bool,
    /// Delay between reconnect attempts.
    pub reconnect_interval_ms: u64,
    /// Broadcast buffer size per adapter; slow subscribers past this lag
    /// start dropping the oldest events.
    pub event_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: false,
            reconnect_interval_ms: 5000,
            event_capacity: 256,
        }
    }
}

/// Load a settings struct from an optional TOML file plus environment
/// overrides (`PITLINK_FOO__BAR` maps to `foo.bar`).
pub fn load_config<T: DeserializeOwned>(path: Option<&str>) -> Result<T, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::with_name(path).required(false));
    }
    builder
        .add_source(Environment::with_prefix("PITLINK").separator("__"))
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::config::FileFormat;

    #[test]
    fn test_defaults_without_any_source() {
        let cfg: SupervisorConfig = load_config(None).unwrap();
        assert!(!cfg.auto_reconnect);
        assert_eq!(cfg.reconnect_interval_ms, 5000);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let cfg: SupervisorConfig = Config::builder()
            .add_source(File::from_str(
                "auto_reconnect = true\nreconnect_interval_ms = 2500",
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert!(cfg.auto_reconnect);
        assert_eq!(cfg.reconnect_interval_ms, 2500);
        assert_eq!(cfg.event_capacity, 256);
    }
}
