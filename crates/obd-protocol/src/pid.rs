//! OBD-II PID table and decode formulas.
//!
//! Decoding operates on the full cleaned payload, which still carries the
//! two-byte mode+PID echo (`41 0D ...`). Anything shorter than three bytes
//! decodes to the defined no-value of 0.0 so one bad answer can never abort
//! a poll cycle.

use serde::{Deserialize, Serialize};

use crate::elm::{clean_response, parse_payload};

/// Mode-01 PIDs swept by the vehicle poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Throttle position (0x11)
    ThrottlePosition = 0x11,
    /// Fuel tank level (0x2F)
    FuelLevel = 0x2F,
    /// Control module voltage (0x42)
    BatteryVoltage = 0x42,
    /// Fuel rail pressure, reported as oil pressure on the dash (0x0A)
    FuelPressure = 0x0A,
    /// Intake manifold absolute pressure, the dash's boost gauge (0x0B)
    ManifoldPressure = 0x0B,
}

impl Pid {
    /// One full poll cycle, in sweep order.
    pub const POLL_CYCLE: [Pid; 8] = [
        Pid::Speed,
        Pid::Rpm,
        Pid::CoolantTemp,
        Pid::ThrottlePosition,
        Pid::FuelLevel,
        Pid::BatteryVoltage,
        Pid::FuelPressure,
        Pid::ManifoldPressure,
    ];

    pub fn as_hex(self) -> u8 {
        self as u8
    }

    /// Mode-01 request as sent on the wire (`010D`).
    pub fn request(self) -> String {
        format!("01{:02X}", self as u8)
    }

    pub fn unit(self) -> &'static str {
        match self {
            Pid::Speed => "km/h",
            Pid::Rpm => "rpm",
            Pid::CoolantTemp => "°C",
            Pid::ThrottlePosition | Pid::FuelLevel => "%",
            Pid::BatteryVoltage => "V",
            Pid::FuelPressure | Pid::ManifoldPressure => "kPa",
        }
    }

    /// Decode a parsed payload (mode echo, PID echo, data bytes).
    pub fn decode(self, payload: &[u8]) -> f64 {
        if payload.len() < 3 {
            return 0.0;
        }
        let data = &payload[2..];
        match self {
            Pid::Speed => data[0] as f64,
            Pid::Rpm => {
                if data.len() < 2 {
                    return 0.0;
                }
                (data[0] as f64 * 256.0 + data[1] as f64) / 4.0
            }
            Pid::CoolantTemp => data[0] as f64 - 40.0,
            Pid::ThrottlePosition => data[0] as f64 * 100.0 / 255.0,
            Pid::FuelLevel => data[0] as f64 * 100.0 / 255.0,
            Pid::BatteryVoltage => {
                if data.len() < 2 {
                    return 0.0;
                }
                (data[0] as f64 * 256.0 + data[1] as f64) / 1000.0
            }
            Pid::FuelPressure => data[0] as f64 * 3.0,
            Pid::ManifoldPressure => data[0] as f64,
        }
    }

    /// Clean, parse, and decode a raw adapter response in one step.
    pub fn decode_response(self, raw: &str) -> f64 {
        self.decode(&parse_payload(&clean_response(raw)))
    }
}
