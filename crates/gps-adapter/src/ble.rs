//! btleplug transport: peripheral lookup, GATT verification, notifications.

use adapter_core::{
    AbortFlag, AdapterError, DeviceDescriptor, EventBus, TransportFactory, TransportKind,
    TransportLink,
};
use async_trait::async_trait;
use btleplug::api::{Central, Manager as _, Peripheral as _};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::listener;

/// NMEA GATT service advertised by RaceBox-class devices.
pub const GPS_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);

/// Notification characteristic carrying newline-delimited NMEA text.
pub const GPS_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);

fn open_failed(address: &str, reason: impl std::fmt::Display) -> AdapterError {
    AdapterError::TransportOpenFailed {
        transport: "ble",
        address: address.to_string(),
        reason: reason.to_string(),
    }
}

/// Opens BLE GPS peripherals through one host Bluetooth adapter.
pub struct BleGpsFactory {
    adapter: Adapter,
}

impl BleGpsFactory {
    /// Acquire the host's first BLE adapter.
    pub async fn new() -> Result<Self, AdapterError> {
        let manager = Manager::new()
            .await
            .map_err(|e| open_failed("", format!("BLE manager init failed: {e}")))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| open_failed("", format!("failed to list BLE adapters: {e}")))?
            .into_iter()
            .next()
            .ok_or_else(|| open_failed("", "no BLE adapter found"))?;
        Ok(Self { adapter })
    }

    /// Build on a specific host adapter (multi-radio machines).
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    pub(crate) fn adapter(&self) -> &Adapter {
        &self.adapter
    }
}

#[async_trait]
impl TransportFactory for BleGpsFactory {
    type Link = BleGpsLink;

    async fn open(&self, target: &DeviceDescriptor) -> Result<Self::Link, AdapterError> {
        if target.transport != TransportKind::Ble {
            return Err(open_failed(&target.address, "descriptor is not a BLE device"));
        }
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| open_failed(&target.address, e))?;
        let peripheral = peripherals
            .into_iter()
            .find(|p| p.id().to_string() == target.address)
            .ok_or_else(|| open_failed(&target.address, "peripheral not seen in the last scan"))?;

        peripheral
            .connect()
            .await
            .map_err(|e| open_failed(&target.address, e))?;
        info!(device = %target.label, "BLE peripheral connected");
        Ok(BleGpsLink { peripheral })
    }
}

/// One connected GPS peripheral.
pub struct BleGpsLink {
    peripheral: Peripheral,
}

#[async_trait]
impl TransportLink for BleGpsLink {
    /// The BLE handshake is GATT discovery: the NMEA service must exist
    /// and the notification characteristic must accept a subscription.
    async fn handshake(&mut self, abort: &AbortFlag) -> Result<(), AdapterError> {
        let discovery = tokio::select! {
            result = self.peripheral.discover_services() => result,
            _ = abort.triggered() => return Err(AdapterError::AbortedByUser),
        };
        discovery.map_err(|e| AdapterError::HandshakeFailed(format!("service discovery: {e}")))?;

        let has_service = self
            .peripheral
            .services()
            .iter()
            .any(|s| s.uuid == GPS_SERVICE_UUID);
        if !has_service {
            return Err(AdapterError::HandshakeFailed(
                "device does not expose the NMEA service".to_string(),
            ));
        }

        let characteristic = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == GPS_CHARACTERISTIC_UUID)
            .ok_or_else(|| {
                AdapterError::HandshakeFailed("NMEA characteristic missing".to_string())
            })?;

        let subscribe = tokio::select! {
            result = self.peripheral.subscribe(&characteristic) => result,
            _ = abort.triggered() => return Err(AdapterError::AbortedByUser),
        };
        subscribe.map_err(|e| AdapterError::HandshakeFailed(format!("subscribe: {e}")))?;
        debug!("subscribed to NMEA notifications");
        Ok(())
    }

    async fn run(
        &mut self,
        bus: EventBus,
        stop: watch::Receiver<bool>,
    ) -> Result<(), AdapterError> {
        let notifications = self.peripheral.notifications().await.map_err(|e| {
            AdapterError::DisconnectedUnexpectedly(format!("notification stream: {e}"))
        })?;
        // The stream is multiplexed across all subscribed characteristics.
        let chunks = notifications.filter_map(|n| {
            futures::future::ready((n.uuid == GPS_CHARACTERISTIC_UUID).then_some(n.value))
        });
        listener::pump(chunks, bus, stop).await
    }

    async fn close(&mut self) {
        let _ = self.peripheral.disconnect().await;
    }
}
