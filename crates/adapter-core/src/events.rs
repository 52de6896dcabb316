//! Typed event bus between one adapter and its consumers.
//!
//! Consumers (socket broadcaster, data logger) subscribe independently and
//! only ever see decoded samples and state changes, never the transport.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::{AdapterError, ErrorKind};
use crate::sample::TelemetrySample;
use crate::state::ConnectionState;

/// Event published by an adapter.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdapterEvent {
    StateChanged { state: ConnectionState },
    Sample { sample: TelemetrySample },
    Error { kind: ErrorKind, message: String },
}

/// Broadcast fan-out for [`AdapterEvent`]s. Cheap to clone; all clones
/// publish to the same subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AdapterEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: AdapterEvent) {
        let _ = self.tx.send(event);
    }

    pub fn state_changed(&self, state: ConnectionState) {
        self.emit(AdapterEvent::StateChanged { state });
    }

    pub fn sample(&self, sample: TelemetrySample) {
        self.emit(AdapterEvent::Sample { sample });
    }

    pub fn error(&self, err: &AdapterError) {
        self.emit(AdapterEvent::Error {
            kind: err.kind(),
            message: err.to_string(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// One consumer's registration for adapter events. Ends on drop or when
/// the adapter is torn down.
pub struct Subscription {
    rx: broadcast::Receiver<AdapterEvent>,
}

impl Subscription {
    /// Receive the next event. A slow consumer that falls behind skips the
    /// overwritten events and keeps going. Returns `None` once the adapter
    /// is gone.
    pub async fn recv(&mut self) -> Option<AdapterEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagging, dropping oldest events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
