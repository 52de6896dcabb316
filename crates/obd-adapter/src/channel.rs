//! Request/response correlation over the adapter's byte stream.

use std::sync::Arc;
use std::time::Duration;

use adapter_core::AdapterError;
use obd_protocol::{COMMAND_TERMINATOR, PROMPT};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::trace;

/// Responses longer than this are garbage; the buffer resets rather than
/// growing without bound.
const MAX_RESPONSE_LEN: usize = 4096;

/// Matches exactly one outstanding command to its `>`-terminated response,
/// accumulating partial reads until the prompt arrives.
pub struct CommandChannel<T> {
    io: T,
    buf: Vec<u8>,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> CommandChannel<T> {
    pub fn new(io: T) -> Self {
        Self {
            io,
            buf: Vec::with_capacity(256),
        }
    }

    /// Send one command and await its complete response. Bytes left over
    /// from a previous timed-out exchange are discarded before writing, so
    /// a late response can never be delivered to a later caller.
    pub async fn send(&mut self, command: &str, timeout: Duration) -> Result<String, AdapterError> {
        self.buf.clear();

        let mut wire = String::with_capacity(command.len() + 1);
        wire.push_str(command);
        wire.push_str(COMMAND_TERMINATOR);
        trace!(command, "sending");

        self.io
            .write_all(wire.as_bytes())
            .await
            .map_err(|e| AdapterError::DisconnectedUnexpectedly(format!("write failed: {e}")))?;
        self.io
            .flush()
            .await
            .map_err(|e| AdapterError::DisconnectedUnexpectedly(format!("flush failed: {e}")))?;

        match tokio::time::timeout(timeout, self.read_until_prompt()).await {
            Ok(result) => result,
            Err(_) => {
                self.buf.clear();
                Err(AdapterError::CommandTimeout {
                    command: command.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn read_until_prompt(&mut self) -> Result<String, AdapterError> {
        let mut chunk = [0u8; 256];
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == PROMPT as u8) {
                let response = String::from_utf8_lossy(&self.buf[..pos]).into_owned();
                self.buf.drain(..=pos);
                return Ok(response);
            }
            if self.buf.len() > MAX_RESPONSE_LEN {
                trace!("oversized response, resetting buffer");
                self.buf.clear();
            }
            let n = self
                .io
                .read(&mut chunk)
                .await
                .map_err(|e| AdapterError::DisconnectedUnexpectedly(format!("read failed: {e}")))?;
            if n == 0 {
                return Err(AdapterError::DisconnectedUnexpectedly(
                    "transport closed".to_string(),
                ));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Shared handle enforcing the single-flight policy: a `send` while
/// another request is in flight fails fast with
/// [`AdapterError::ChannelBusy`] instead of queueing. The poller is
/// strictly sequential, so contention here signals a logic error, not
/// load, and queueing would only hide it behind growing latency.
pub struct SharedCommandChannel<T> {
    inner: Arc<Mutex<CommandChannel<T>>>,
}

impl<T> Clone for SharedCommandChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SharedCommandChannel<T> {
    pub fn new(io: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CommandChannel::new(io))),
        }
    }

    pub async fn send(&self, command: &str, timeout: Duration) -> Result<String, AdapterError> {
        let mut channel = self
            .inner
            .try_lock()
            .map_err(|_| AdapterError::ChannelBusy)?;
        channel.send(command, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;

    /// Minimal scripted responder: reads CR-terminated commands, answers
    /// from a fixed table, optionally in two chunks.
    async fn run_responder(mut io: DuplexStream, split_responses: bool) {
        let mut command = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            let n = match io.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            for &byte in &chunk[..n] {
                if byte != b'\r' {
                    command.push(byte);
                    continue;
                }
                let cmd = String::from_utf8_lossy(&command).trim().to_string();
                command.clear();
                let response: &[u8] = match cmd.as_str() {
                    "010D" => b"41 0D 32\r\r>",
                    "SLOW" => {
                        // Never answers; used for timeout tests.
                        continue;
                    }
                    _ => b"OK\r\r>",
                };
                if split_responses {
                    let mid = response.len() / 2;
                    if io.write_all(&response[..mid]).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    if io.write_all(&response[mid..]).await.is_err() {
                        return;
                    }
                } else if io.write_all(response).await.is_err() {
                    return;
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_accumulates_partial_reads() {
        let (ours, theirs) = tokio::io::duplex(256);
        tokio::spawn(run_responder(theirs, true));

        let mut channel = CommandChannel::new(ours);
        let response = channel
            .send("010D", Duration::from_millis(5000))
            .await
            .unwrap();
        assert_eq!(response.trim(), "41 0D 32");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_channel_reusable() {
        let (ours, theirs) = tokio::io::duplex(256);
        tokio::spawn(run_responder(theirs, false));

        let mut channel = CommandChannel::new(ours);
        let err = channel
            .send("SLOW", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::CommandTimeout { .. }));

        // The next exchange must work and must not see stale bytes.
        let response = channel
            .send("010D", Duration::from_millis(5000))
            .await
            .unwrap();
        assert_eq!(response.trim(), "41 0D 32");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_send_fails_fast_with_channel_busy() {
        let (ours, theirs) = tokio::io::duplex(256);
        tokio::spawn(run_responder(theirs, false));

        let channel = SharedCommandChannel::new(ours);
        let blocker = channel.clone();
        let first =
            tokio::spawn(async move { blocker.send("SLOW", Duration::from_millis(500)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = channel.send("010D", Duration::from_millis(500)).await;
        assert!(matches!(second, Err(AdapterError::ChannelBusy)));

        let first = first.await.unwrap();
        assert!(matches!(first, Err(AdapterError::CommandTimeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_transport_reports_disconnect() {
        let (ours, theirs) = tokio::io::duplex(256);
        drop(theirs);

        let mut channel = CommandChannel::new(ours);
        let err = channel
            .send("010D", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::DisconnectedUnexpectedly(_)));
    }
}
