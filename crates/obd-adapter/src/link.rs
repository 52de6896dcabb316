//! Serial ELM327 transport link: handshake runner and PID poller.

use std::time::Duration;

use adapter_core::{
    now_ms, AbortFlag, AdapterError, DeviceDescriptor, EventBus, TelemetrySample, TransportFactory,
    TransportKind, TransportLink, VehicleSample,
};
use async_trait::async_trait;
use obd_protocol::{is_alive, Pid, INIT_SEQUENCE, LIVENESS_PROBE};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, warn};

use crate::channel::SharedCommandChannel;
use crate::config::ObdAdapterConfig;

/// Opens ELM327 adapters on serial ports at the fixed 8N1 framing.
pub struct SerialObdFactory {
    config: ObdAdapterConfig,
}

impl SerialObdFactory {
    pub fn new(config: ObdAdapterConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TransportFactory for SerialObdFactory {
    type Link = ObdLink<tokio_serial::SerialStream>;

    async fn open(&self, target: &DeviceDescriptor) -> Result<Self::Link, AdapterError> {
        if target.transport != TransportKind::Serial {
            return Err(AdapterError::TransportOpenFailed {
                transport: "serial",
                address: target.address.clone(),
                reason: "descriptor is not a serial device".to_string(),
            });
        }
        let stream = tokio_serial::new(&target.address, self.config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .open_native_async()
            .map_err(|e| AdapterError::TransportOpenFailed {
                transport: "serial",
                address: target.address.clone(),
                reason: e.to_string(),
            })?;
        Ok(ObdLink::new(stream, self.config.clone()))
    }
}

/// One opened ELM327 connection. Generic over the byte stream so tests can
/// drive it over an in-memory pipe.
pub struct ObdLink<T> {
    channel: SharedCommandChannel<T>,
    config: ObdAdapterConfig,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> ObdLink<T> {
    pub fn new(io: T, config: ObdAdapterConfig) -> Self {
        Self {
            channel: SharedCommandChannel::new(io),
            config,
        }
    }
}

fn apply_pid(sample: &mut VehicleSample, pid: Pid, value: f64) {
    match pid {
        Pid::Speed => sample.speed_kmh = value,
        Pid::Rpm => sample.rpm = value,
        Pid::CoolantTemp => sample.engine_temp_c = value,
        Pid::ThrottlePosition => sample.throttle_pct = value,
        Pid::FuelLevel => sample.fuel_pct = value,
        Pid::BatteryVoltage => sample.battery_v = value,
        Pid::FuelPressure => sample.oil_pressure_kpa = value,
        Pid::ManifoldPressure => sample.boost_pressure_kpa = value,
    }
}

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> TransportLink for ObdLink<T> {
    /// Fixed init sequence, then the `0100` liveness probe. Each step must
    /// succeed or the whole handshake fails; the abort flag is checked
    /// around every await point.
    async fn handshake(&mut self, abort: &AbortFlag) -> Result<(), AdapterError> {
        let timeout = self.config.command_timeout();

        for step in INIT_SEQUENCE {
            if abort.is_set() {
                return Err(AdapterError::AbortedByUser);
            }
            let response = tokio::select! {
                result = self.channel.send(step.command, timeout) => result
                    .map_err(|e| AdapterError::HandshakeFailed(format!("{}: {e}", step.command)))?,
                _ = abort.triggered() => return Err(AdapterError::AbortedByUser),
            };
            debug!(command = step.command, response = %response.trim(), "init step");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(step.settle_ms)) => {}
                _ = abort.triggered() => return Err(AdapterError::AbortedByUser),
            }
        }

        let probe = tokio::select! {
            result = self.channel.send(LIVENESS_PROBE, timeout) => result
                .map_err(|e| AdapterError::HandshakeFailed(format!("{LIVENESS_PROBE}: {e}")))?,
            _ = abort.triggered() => return Err(AdapterError::AbortedByUser),
        };
        if !is_alive(&probe) {
            return Err(AdapterError::HandshakeFailed(
                "adapter not responding (NO DATA)".to_string(),
            ));
        }
        debug!("handshake complete");
        Ok(())
    }

    /// Cyclic PID sweep. Every cycle attempts the full list; a failed PID
    /// logs and leaves its field at 0, and only transport loss ends the
    /// loop. One sample is emitted per completed cycle.
    async fn run(
        &mut self,
        bus: EventBus,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), AdapterError> {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let timeout = self.config.command_timeout();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.wait_for(|s| *s) => return Ok(()),
            }

            let mut sample = VehicleSample::new(0);
            for pid in Pid::POLL_CYCLE {
                let request = pid.request();
                let value = tokio::select! {
                    result = self.channel.send(&request, timeout) => match result {
                        Ok(raw) => pid.decode_response(&raw),
                        Err(err @ AdapterError::DisconnectedUnexpectedly(_)) => return Err(err),
                        Err(err) => {
                            warn!(pid = ?pid, error = %err, "PID query failed, field defaults to 0");
                            0.0
                        }
                    },
                    // Disconnect mid-cycle: the in-flight command is dropped
                    // quietly, never surfaced.
                    _ = stop.wait_for(|s| *s) => {
                        debug!(error = %AdapterError::Cancelled, "poll cycle interrupted");
                        return Ok(());
                    }
                };
                apply_pid(&mut sample, pid, value);
            }
            sample.timestamp_ms = now_ms();
            bus.sample(TelemetrySample::Vehicle(sample));
        }
    }

    async fn close(&mut self) {
        // The serial handle closes when the link drops; nothing to flush.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapter_core::{AdapterEvent, ConnectionState, ConnectionSupervisor, SupervisorConfig};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    /// In-memory ELM327 clone, answering the command table the handshake
    /// and poller exercise.
    async fn run_elm(mut io: DuplexStream, probe_response: &'static str) {
        let mut command = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            let n = match io.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            for &byte in &chunk[..n] {
                if byte == b'\n' {
                    continue;
                }
                if byte != b'\r' {
                    command.push(byte);
                    continue;
                }
                let cmd = String::from_utf8_lossy(&command).trim().to_uppercase();
                command.clear();
                let response = match cmd.as_str() {
                    "ATZ" => "\r\rELM327 v1.5\r\r>".to_string(),
                    "ATE0" | "ATL0" | "ATS0" | "ATH0" => "OK\r\r>".to_string(),
                    "0100" => format!("{probe_response}\r\r>"),
                    "010D" => "41 0D 32\r\r>".to_string(),
                    "010C" => "41 0C 1A F8\r\r>".to_string(),
                    "0105" => "41 05 73\r\r>".to_string(),
                    "0111" => "41 11 45\r\r>".to_string(),
                    "012F" => "41 2F 80\r\r>".to_string(),
                    "0142" => "41 42 33 5A\r\r>".to_string(),
                    "010A" => "41 0A 64\r\r>".to_string(),
                    "010B" => "41 0B 64\r\r>".to_string(),
                    _ => "?\r\r>".to_string(),
                };
                if io.write_all(response.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    }

    struct ScriptedFactory {
        probe_response: &'static str,
    }

    #[async_trait]
    impl TransportFactory for ScriptedFactory {
        type Link = ObdLink<DuplexStream>;

        async fn open(&self, _target: &DeviceDescriptor) -> Result<Self::Link, AdapterError> {
            let (ours, theirs) = tokio::io::duplex(1024);
            tokio::spawn(run_elm(theirs, self.probe_response));
            Ok(ObdLink::new(ours, ObdAdapterConfig::default()))
        }
    }

    fn target() -> DeviceDescriptor {
        DeviceDescriptor::serial("/dev/ttyUSB0", "scripted ELM327")
    }

    async fn next_vehicle_sample(
        sub: &mut adapter_core::Subscription,
    ) -> adapter_core::VehicleSample {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(30), sub.recv())
                .await
                .expect("timed out waiting for sample")
                .expect("bus closed");
            if let AdapterEvent::Sample {
                sample: TelemetrySample::Vehicle(sample),
            } = event
            {
                return sample;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_session_connects_and_emits_samples() {
        let sup = ConnectionSupervisor::new(
            ScriptedFactory {
                probe_response: "41 00 BE 1F A8 13",
            },
            SupervisorConfig::default(),
        );
        let mut sub = sup.subscribe();

        sup.connect(target()).await.unwrap();
        assert!(sup.is_connected());

        let sample = next_vehicle_sample(&mut sub).await;
        assert_eq!(sample.speed_kmh, 50.0);
        assert_eq!(sample.rpm, 1734.0);
        assert_eq!(sample.engine_temp_c, 75.0);
        assert!((sample.throttle_pct - 27.058).abs() < 0.01);
        assert!((sample.fuel_pct - 50.196).abs() < 0.01);
        assert!((sample.battery_v - 13.146).abs() < 0.001);
        assert_eq!(sample.oil_pressure_kpa, 300.0);
        assert_eq!(sample.boost_pressure_kpa, 100.0);

        // The poller keeps emitting on its cadence.
        let start = tokio::time::Instant::now();
        next_vehicle_sample(&mut sub).await;
        next_vehicle_sample(&mut sub).await;
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert!(start.elapsed() <= Duration::from_millis(1000));

        sup.disconnect().await;
        assert_eq!(sup.state(), ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_data_probe_fails_the_handshake() {
        let sup = ConnectionSupervisor::new(
            ScriptedFactory {
                probe_response: "NO DATA",
            },
            SupervisorConfig::default(),
        );
        let mut sub = sup.subscribe();

        let result = sup.connect(target()).await;
        assert!(matches!(result, Err(AdapterError::HandshakeFailed(_))));
        assert!(!sup.is_connected());

        // State walks Error then settles Idle.
        let mut saw_error = false;
        loop {
            match tokio::time::timeout(Duration::from_secs(5), sub.recv())
                .await
                .expect("timed out")
                .expect("bus closed")
            {
                AdapterEvent::StateChanged {
                    state: ConnectionState::Error,
                } => saw_error = true,
                AdapterEvent::StateChanged {
                    state: ConnectionState::Idle,
                } => break,
                _ => {}
            }
        }
        assert!(saw_error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_pid_answer_defaults_field_to_zero() {
        // A clone that answers '?' to the battery PID: the cycle continues
        // and only that field stays 0.
        async fn run_flaky_elm(mut io: DuplexStream) {
            let mut command = Vec::new();
            let mut chunk = [0u8; 64];
            loop {
                let n = match io.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                for &byte in &chunk[..n] {
                    if byte == b'\n' {
                        continue;
                    }
                    if byte != b'\r' {
                        command.push(byte);
                        continue;
                    }
                    let cmd = String::from_utf8_lossy(&command).trim().to_uppercase();
                    command.clear();
                    let response = match cmd.as_str() {
                        "ATZ" => "\r\rELM327 v1.5\r\r>".to_string(),
                        "0100" => "41 00 BE 1F A8 13\r\r>".to_string(),
                        "0142" => "?\r\r>".to_string(),
                        "010D" => "41 0D 32\r\r>".to_string(),
                        _ if cmd.starts_with("AT") => "OK\r\r>".to_string(),
                        _ => "41 00 00\r\r>".to_string(),
                    };
                    if io.write_all(response.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
        }

        struct FlakyFactory;

        #[async_trait]
        impl TransportFactory for FlakyFactory {
            type Link = ObdLink<DuplexStream>;

            async fn open(&self, _target: &DeviceDescriptor) -> Result<Self::Link, AdapterError> {
                let (ours, theirs) = tokio::io::duplex(1024);
                tokio::spawn(run_flaky_elm(theirs));
                Ok(ObdLink::new(ours, ObdAdapterConfig::default()))
            }
        }

        let sup = ConnectionSupervisor::new(FlakyFactory, SupervisorConfig::default());
        let mut sub = sup.subscribe();
        sup.connect(target()).await.unwrap();

        let sample = next_vehicle_sample(&mut sub).await;
        assert_eq!(sample.speed_kmh, 50.0);
        assert_eq!(sample.battery_v, 0.0);
        assert!(sup.is_connected());
    }
}
