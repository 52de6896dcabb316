//! Hardware Adapter Lifecycle Engine
//!
//! Shared connection machinery for PitLink hardware adapters (serial OBD-II,
//! BLE GPS). Each adapter plugs a transport-specific factory and link into
//! the [`ConnectionSupervisor`], which owns the connection state machine,
//! abort handling, teardown, and the auto-reconnect policy, and publishes
//! typed events to any number of subscribers.

mod config;
mod descriptor;
mod error;
mod events;
mod sample;
mod state;
mod supervisor;

pub use config::{load_config, SupervisorConfig};
pub use descriptor::{DeviceDescriptor, SignalMetadata, TransportKind};
pub use error::{AdapterError, ErrorKind};
pub use events::{AdapterEvent, EventBus, Subscription};
pub use sample::{now_ms, GpsSample, TelemetrySample, VehicleSample};
pub use state::{next_state, ConnectionState, LifecycleEvent};
pub use supervisor::{AbortFlag, ConnectionSupervisor, TransportFactory, TransportLink};
