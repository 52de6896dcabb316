//! Serial port discovery for the device picker.

use adapter_core::DeviceDescriptor;
use tokio_serial::{SerialPortInfo, SerialPortType};
use tracing::warn;

/// Enumerate serial ports that could host an OBD adapter. A pure read with
/// no effect on connection state; enumeration failure reports an empty
/// list rather than an error, since a machine with no ports looks the same.
pub fn list_candidates() -> Vec<DeviceDescriptor> {
    match tokio_serial::available_ports() {
        Ok(ports) => ports.into_iter().map(describe).collect(),
        Err(err) => {
            warn!(error = %err, "serial port enumeration failed");
            Vec::new()
        }
    }
}

fn describe(port: SerialPortInfo) -> DeviceDescriptor {
    let label = match &port.port_type {
        SerialPortType::UsbPort(usb) => usb
            .product
            .clone()
            .unwrap_or_else(|| port.port_name.clone()),
        _ => port.port_name.clone(),
    };
    DeviceDescriptor::serial(port.port_name, label)
}
