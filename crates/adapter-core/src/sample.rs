//! Telemetry sample types emitted to subscribers.
//!
//! Samples are immutable once emitted; a subscriber never sees a sample
//! change under it.

use serde::{Deserialize, Serialize};

/// One full cycle of vehicle measurements from the OBD PID sweep.
/// Fields the cycle could not read are left at 0.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleSample {
    /// Unix timestamp (ms) when the cycle completed.
    pub timestamp_ms: u64,
    pub speed_kmh: f64,
    pub rpm: f64,
    pub engine_temp_c: f64,
    pub throttle_pct: f64,
    pub fuel_pct: f64,
    pub battery_v: f64,
    pub oil_pressure_kpa: f64,
    pub boost_pressure_kpa: f64,
}

impl VehicleSample {
    /// Create an empty frame for the given timestamp.
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            ..Default::default()
        }
    }
}

/// One position/velocity fix decoded from the GPS NMEA stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsSample {
    /// Unix timestamp (ms) when the sentence was received.
    pub timestamp_ms: u64,
    /// Decimal degrees, south negative.
    pub latitude: f64,
    /// Decimal degrees, west negative.
    pub longitude: f64,
    pub altitude_m: f64,
    pub speed_kmh: f64,
    pub heading_deg: f64,
    /// GGA fix quality indicator (0 = no fix).
    pub fix_quality: u8,
    pub satellites: u8,
    pub hdop: f64,
    /// Estimated horizontal accuracy in meters.
    pub accuracy_m: f64,
}

/// A decoded measurement from either adapter kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetrySample {
    Vehicle(VehicleSample),
    Gps(GpsSample),
}

impl TelemetrySample {
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            TelemetrySample::Vehicle(s) => s.timestamp_ms,
            TelemetrySample::Gps(s) => s.timestamp_ms,
        }
    }
}

/// Current Unix time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_sample_defaults_to_zeroed_fields() {
        let sample = VehicleSample::new(1234);
        assert_eq!(sample.timestamp_ms, 1234);
        assert_eq!(sample.rpm, 0.0);
        assert_eq!(sample.battery_v, 0.0);
    }

    #[test]
    fn test_sample_serialization_is_tagged() {
        let sample = TelemetrySample::Vehicle(VehicleSample::new(1));
        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("\"kind\":\"vehicle\""));
    }
}
