//! Time-boxed BLE scan for GPS/lap-timer devices.

use std::collections::HashSet;
use std::time::Duration;

use adapter_core::{AdapterError, DeviceDescriptor};
use btleplug::api::{Central, Peripheral as _, ScanFilter};
use btleplug::platform::Adapter;
use tracing::debug;

use crate::ble::{BleGpsFactory, GPS_SERVICE_UUID};

fn scan_failed(reason: impl std::fmt::Display) -> AdapterError {
    AdapterError::TransportOpenFailed {
        transport: "ble",
        address: String::new(),
        reason: reason.to_string(),
    }
}

/// Scan for peripherals advertising the NMEA service and return them as
/// descriptors. A pure read: nothing here touches connection state.
pub async fn scan(
    factory: &BleGpsFactory,
    duration: Duration,
) -> Result<Vec<DeviceDescriptor>, AdapterError> {
    scan_with(factory.adapter(), duration).await
}

async fn scan_with(
    adapter: &Adapter,
    duration: Duration,
) -> Result<Vec<DeviceDescriptor>, AdapterError> {
    // Unfiltered scan; CoreBluetooth does not reliably match 128-bit UUIDs
    // in scan response data, so filtering happens on our side.
    adapter
        .start_scan(ScanFilter::default())
        .await
        .map_err(scan_failed)?;
    tokio::time::sleep(duration).await;

    let peripherals = adapter.peripherals().await.map_err(scan_failed)?;
    let _ = adapter.stop_scan().await;

    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for peripheral in peripherals {
        let id = peripheral.id().to_string();
        if !seen.insert(id.clone()) {
            continue;
        }
        let props = match peripheral.properties().await.ok().flatten() {
            Some(props) => props,
            None => continue,
        };
        let advertises = props.services.contains(&GPS_SERVICE_UUID)
            || props.service_data.contains_key(&GPS_SERVICE_UUID);
        if !advertises {
            continue;
        }
        let label = props.local_name.clone().unwrap_or_else(|| id.clone());
        debug!(device = %label, rssi = ?props.rssi, "GPS candidate");
        found.push(DeviceDescriptor::ble(id, label, props.rssi));
    }
    Ok(found)
}
