//! BLE GPS Adapter
//!
//! Owns a RaceBox-class GPS/lap-timer over Bluetooth LE: finds the
//! peripheral, verifies its NMEA GATT service, subscribes to the
//! notification characteristic, and feeds every inbound chunk through the
//! NMEA codec, publishing a [`GpsSample`] per decoded fix. Lifecycle comes
//! from [`adapter_core::ConnectionSupervisor`].
//!
//! [`GpsSample`]: adapter_core::GpsSample

mod ble;
mod config;
mod discovery;
mod listener;

pub use ble::{BleGpsFactory, BleGpsLink, GPS_CHARACTERISTIC_UUID, GPS_SERVICE_UUID};
pub use config::GpsAdapterConfig;
pub use discovery::scan;

use adapter_core::{AdapterError, ConnectionSupervisor};

/// Supervisor specialization for the BLE GPS transport.
pub type GpsAdapter = ConnectionSupervisor<BleGpsFactory>;

/// Build a GPS adapter on the host's first BLE adapter.
pub async fn gps_adapter(config: GpsAdapterConfig) -> Result<GpsAdapter, AdapterError> {
    let factory = BleGpsFactory::new().await?;
    Ok(GpsAdapter::new(factory, config.supervisor.clone()))
}
