//! Serial OBD adapter settings.

use std::time::Duration;

use adapter_core::SupervisorConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObdAdapterConfig {
    /// Serial baud rate. ELM327-compatible adapters speak 38400 8N1.
    pub baud_rate: u32,
    /// Per-command response deadline.
    pub command_timeout_ms: u64,
    /// PID sweep cadence.
    pub poll_interval_ms: u64,
    pub supervisor: SupervisorConfig,
}

impl Default for ObdAdapterConfig {
    fn default() -> Self {
        Self {
            baud_rate: obd_protocol::SERIAL_BAUD,
            command_timeout_ms: 5000,
            poll_interval_ms: 100,
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl ObdAdapterConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_the_wire_protocol() {
        let cfg = ObdAdapterConfig::default();
        assert_eq!(cfg.baud_rate, 38_400);
        assert_eq!(cfg.command_timeout(), Duration::from_millis(5000));
        assert_eq!(cfg.poll_interval(), Duration::from_millis(100));
        assert!(!cfg.supervisor.auto_reconnect);
    }
}
