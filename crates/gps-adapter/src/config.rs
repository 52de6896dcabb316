//! BLE GPS adapter settings.

use std::time::Duration;

use adapter_core::SupervisorConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpsAdapterConfig {
    /// How long a discovery scan listens for advertisements.
    pub scan_duration_ms: u64,
    pub supervisor: SupervisorConfig,
}

impl Default for GpsAdapterConfig {
    fn default() -> Self {
        Self {
            scan_duration_ms: 3000,
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl GpsAdapterConfig {
    pub fn scan_duration(&self) -> Duration {
        Duration::from_millis(self.scan_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = GpsAdapterConfig::default();
        assert_eq!(cfg.scan_duration(), Duration::from_millis(3000));
        assert_eq!(cfg.supervisor.reconnect_interval_ms, 5000);
    }
}
