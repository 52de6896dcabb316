//! Connection lifecycle state machine.
//!
//! Transitions are expressed as a pure function over (state, event) so the
//! machine can be tested without any transport attached. The supervisor is
//! the only writer of [`ConnectionState`]; everything else observes it
//! through events.

use serde::Serialize;

/// Lifecycle state of one adapter connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    Idle,
    /// Transport open in progress.
    Connecting,
    /// Transport open, handshake sequence running.
    Handshaking,
    /// Handshake done, data is flowing.
    Connected,
    /// Teardown in progress after an explicit disconnect.
    Disconnecting,
    /// Attempt cancelled by the user; resolves to Idle.
    Aborted,
    /// Attempt or connection failed; resolves to Idle or back to Connecting.
    Error,
}

impl ConnectionState {
    /// The externally observable `connected` flag. Nothing else implies
    /// connectivity.
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// True while a connect attempt can still be aborted.
    pub fn can_abort(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Handshaking)
    }
}

/// Events that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    ConnectRequested,
    TransportOpened,
    HandshakeCompleted,
    AbortRequested,
    AttemptFailed,
    TransportLost,
    DisconnectRequested,
    TeardownComplete,
}

/// Pure transition function. Returns `None` for transitions the machine
/// does not allow; callers treat those as a rejected operation, never as a
/// silent state change.
pub fn next_state(state: ConnectionState, event: LifecycleEvent) -> Option<ConnectionState> {
    use ConnectionState::*;
    use LifecycleEvent::*;

    match (state, event) {
        (Idle | Error, ConnectRequested) => Some(Connecting),
        (Connecting, TransportOpened) => Some(Handshaking),
        (Handshaking, HandshakeCompleted) => Some(Connected),
        (Connecting | Handshaking, AbortRequested) => Some(Aborted),
        (Connecting | Handshaking, AttemptFailed) => Some(Error),
        (Connected, TransportLost) => Some(Error),
        // Disconnect is accepted from any state; from Idle it is a no-op.
        (Idle, DisconnectRequested) => Some(Idle),
        (_, DisconnectRequested) => Some(Disconnecting),
        (Disconnecting | Aborted | Error, TeardownComplete) => Some(Idle),
        _ => None,
    }
}
