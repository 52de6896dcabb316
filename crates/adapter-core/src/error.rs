//! Adapter Error Types

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur across the adapter lifecycle and wire protocols.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The physical transport could not be opened.
    #[error("failed to open {transport} transport at {address}: {reason}")]
    TransportOpenFailed {
        transport: &'static str,
        address: String,
        reason: String,
    },

    /// The post-open handshake failed, including "adapter not responding".
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// No complete response arrived before the command deadline.
    #[error("command {command:?} timed out after {timeout_ms}ms")]
    CommandTimeout { command: String, timeout_ms: u64 },

    /// The in-flight connect attempt was cancelled by the user.
    #[error("connect attempt aborted by user")]
    AbortedByUser,

    /// A connect attempt is already in flight for this adapter.
    #[error("a connect attempt is already in flight")]
    AlreadyConnecting,

    /// The command channel already has a request in flight.
    #[error("command channel busy with another request")]
    ChannelBusy,

    /// A wire payload could not be decoded. Always recovered locally by
    /// degrading to a zero or absent field, never fatal to a connection.
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// The transport dropped without an explicit disconnect.
    #[error("connection lost unexpectedly: {0}")]
    DisconnectedUnexpectedly(String),

    /// The command was cut off by an explicit disconnect.
    #[error("command cancelled by disconnect")]
    Cancelled,
}

/// Fieldless error discriminant carried on [`AdapterEvent::Error`] payloads
/// so consumers can match without parsing the message string.
///
/// [`AdapterEvent::Error`]: crate::AdapterEvent::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransportOpenFailed,
    HandshakeFailed,
    CommandTimeout,
    AbortedByUser,
    AlreadyConnecting,
    ChannelBusy,
    DecodeFailure,
    DisconnectedUnexpectedly,
    Cancelled,
}

impl AdapterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::TransportOpenFailed { .. } => ErrorKind::TransportOpenFailed,
            AdapterError::HandshakeFailed(_) => ErrorKind::HandshakeFailed,
            AdapterError::CommandTimeout { .. } => ErrorKind::CommandTimeout,
            AdapterError::AbortedByUser => ErrorKind::AbortedByUser,
            AdapterError::AlreadyConnecting => ErrorKind::AlreadyConnecting,
            AdapterError::ChannelBusy => ErrorKind::ChannelBusy,
            AdapterError::DecodeFailure(_) => ErrorKind::DecodeFailure,
            AdapterError::DisconnectedUnexpectedly(_) => ErrorKind::DisconnectedUnexpectedly,
            AdapterError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True when the error ends the connection rather than one command.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AdapterError::TransportOpenFailed { .. }
                | AdapterError::HandshakeFailed(_)
                | AdapterError::DisconnectedUnexpectedly(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        let err = AdapterError::CommandTimeout {
            command: "010C".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(err.kind(), ErrorKind::CommandTimeout);
        assert!(err.to_string().contains("010C"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AdapterError::HandshakeFailed("NO DATA".into()).is_fatal());
        assert!(!AdapterError::ChannelBusy.is_fatal());
        assert!(!AdapterError::DecodeFailure("short payload".into()).is_fatal());
    }
}
