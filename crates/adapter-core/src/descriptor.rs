//! Discovered device descriptors.

use serde::{Deserialize, Serialize};

/// Physical transport a device is reachable over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Serial,
    Ble,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Serial => "serial",
            TransportKind::Ble => "ble",
        }
    }
}

/// Radio signal details reported at discovery time (BLE only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMetadata {
    pub rssi_dbm: Option<i16>,
}

/// A device returned by a discovery scan. Immutable once produced;
/// passed back verbatim to initiate a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Stable identifier within one process run (port path or peripheral id).
    pub id: String,
    /// Human-readable name for the device picker.
    pub label: String,
    pub transport: TransportKind,
    /// Serial: device path. BLE: peripheral id string.
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<SignalMetadata>,
}

impl DeviceDescriptor {
    /// Descriptor for a serial port.
    pub fn serial(path: impl Into<String>, label: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id: path.clone(),
            label: label.into(),
            transport: TransportKind::Serial,
            address: path,
            signal: None,
        }
    }

    /// Descriptor for a BLE peripheral.
    pub fn ble(id: impl Into<String>, label: impl Into<String>, rssi_dbm: Option<i16>) -> Self {
        let id = id.into();
        Self {
            id: id.clone(),
            label: label.into(),
            transport: TransportKind::Ble,
            address: id,
            signal: Some(SignalMetadata { rssi_dbm }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_descriptor_uses_path_as_id_and_address() {
        let desc = DeviceDescriptor::serial("/dev/ttyUSB0", "OBDLink SX");
        assert_eq!(desc.id, "/dev/ttyUSB0");
        assert_eq!(desc.address, "/dev/ttyUSB0");
        assert_eq!(desc.transport, TransportKind::Serial);
        assert!(desc.signal.is_none());
    }

    #[test]
    fn test_ble_descriptor_carries_rssi() {
        let desc = DeviceDescriptor::ble("aa:bb:cc", "RaceBox Mini", Some(-61));
        assert_eq!(desc.transport, TransportKind::Ble);
        assert_eq!(desc.signal.unwrap().rssi_dbm, Some(-61));
    }
}
