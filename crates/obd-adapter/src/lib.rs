//! Serial OBD-II Adapter
//!
//! Owns an ELM327-compatible adapter on a serial port: opens the transport
//! at 38400 8N1, runs the AT initialization handshake, then sweeps the PID
//! list at a fixed cadence and publishes one [`VehicleSample`] per cycle.
//! Lifecycle (connect, abort, disconnect, reconnect) comes from
//! [`adapter_core::ConnectionSupervisor`].
//!
//! [`VehicleSample`]: adapter_core::VehicleSample

mod channel;
mod config;
mod discovery;
mod link;

pub use channel::{CommandChannel, SharedCommandChannel};
pub use config::ObdAdapterConfig;
pub use discovery::list_candidates;
pub use link::{ObdLink, SerialObdFactory};

use adapter_core::ConnectionSupervisor;

/// Supervisor specialization for the serial OBD transport.
pub type ObdAdapter = ConnectionSupervisor<SerialObdFactory>;

/// Build an OBD adapter from its settings.
pub fn obd_adapter(config: ObdAdapterConfig) -> ObdAdapter {
    let supervisor = config.supervisor.clone();
    ObdAdapter::new(SerialObdFactory::new(config), supervisor)
}
