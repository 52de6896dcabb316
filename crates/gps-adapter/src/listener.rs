//! Passive stream listener: chunks in, samples out.

use adapter_core::{now_ms, AdapterError, EventBus, GpsSample, TelemetrySample};
use futures::{Stream, StreamExt};
use nmea_protocol::{FixAccumulator, GpsFix, LineSplitter};
use tokio::sync::watch;
use tracing::trace;

fn to_sample(fix: GpsFix) -> GpsSample {
    GpsSample {
        timestamp_ms: now_ms(),
        latitude: fix.latitude,
        longitude: fix.longitude,
        altitude_m: fix.altitude_m,
        speed_kmh: fix.speed_kmh,
        heading_deg: fix.heading_deg,
        fix_quality: fix.fix_quality,
        satellites: fix.satellites,
        hdop: fix.hdop,
        accuracy_m: fix.accuracy_m,
    }
}

/// Decode notification chunks as they arrive and emit every completed fix
/// immediately; one chunk may yield zero or several samples. Returns `Ok`
/// when `stop` flips, and reports an ended stream as an unexpected
/// disconnection.
pub async fn pump<S>(
    mut chunks: S,
    bus: EventBus,
    mut stop: watch::Receiver<bool>,
) -> Result<(), AdapterError>
where
    S: Stream<Item = Vec<u8>> + Unpin + Send,
{
    let mut splitter = LineSplitter::new();
    let mut fixes = FixAccumulator::new();

    loop {
        let chunk = tokio::select! {
            chunk = chunks.next() => chunk,
            _ = stop.wait_for(|s| *s) => return Ok(()),
        };
        let Some(chunk) = chunk else {
            return Err(AdapterError::DisconnectedUnexpectedly(
                "notification stream ended".to_string(),
            ));
        };
        trace!(len = chunk.len(), "notification chunk");
        for line in splitter.feed(&chunk) {
            if let Some(fix) = fixes.feed(&line) {
                bus.sample(TelemetrySample::Gps(to_sample(fix)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapter_core::AdapterEvent;
    use futures::stream;
    use std::time::Duration;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n";

    fn chunks_of(payload: &str, size: usize) -> Vec<Vec<u8>> {
        payload
            .as_bytes()
            .chunks(size)
            .map(|c| c.to_vec())
            .collect()
    }

    async fn collect_gps_samples(sub: &mut adapter_core::Subscription, n: usize) -> Vec<GpsSample> {
        let mut samples = Vec::new();
        while samples.len() < n {
            let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
                .await
                .expect("timed out waiting for sample")
                .expect("bus closed");
            if let AdapterEvent::Sample {
                sample: TelemetrySample::Gps(sample),
            } = event
            {
                samples.push(sample);
            }
        }
        samples
    }

    #[tokio::test]
    async fn test_sentences_split_across_chunks_still_decode() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        let (_stop_tx, stop_rx) = watch::channel(false);

        // 7-byte chunks slice both sentences mid-field.
        let mut data = chunks_of(GGA, 7);
        data.extend(chunks_of(RMC, 7));
        let feed = stream::iter(data).chain(stream::pending());

        let pump_bus = bus.clone();
        let task = tokio::spawn(async move { pump(Box::pin(feed), pump_bus, stop_rx).await });

        let samples = collect_gps_samples(&mut sub, 2).await;
        assert!((samples[0].latitude - 48.1173).abs() < 1e-6);
        assert!((samples[0].longitude - 11.516_666_666).abs() < 1e-6);
        assert_eq!(samples[0].accuracy_m, 1.0);
        // The RMC fix carries the merged ground speed.
        assert!((samples[1].speed_kmh - 22.4 * nmea_protocol::KNOTS_TO_KMH).abs() < 1e-9);

        task.abort();
    }

    #[tokio::test]
    async fn test_garbage_chunks_yield_no_samples_and_no_panic() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        let (_stop_tx, stop_rx) = watch::channel(false);

        let data = vec![
            b"\xff\xfe\x00binary noise\r\n".to_vec(),
            b"$GPGGA,too,short\r\n".to_vec(),
            GGA.as_bytes().to_vec(),
        ];
        let feed = stream::iter(data).chain(stream::pending());
        let pump_bus = bus.clone();
        let task = tokio::spawn(async move { pump(Box::pin(feed), pump_bus, stop_rx).await });

        // Only the valid sentence produces a sample.
        let samples = collect_gps_samples(&mut sub, 1).await;
        assert_eq!(samples[0].satellites, 8);

        task.abort();
    }

    #[tokio::test]
    async fn test_stream_end_is_an_unexpected_disconnect() {
        let bus = EventBus::default();
        let (_stop_tx, stop_rx) = watch::channel(false);

        let feed = stream::iter(vec![GGA.as_bytes().to_vec()]);
        let result = pump(Box::pin(feed), bus, stop_rx).await;
        assert!(matches!(
            result,
            Err(AdapterError::DisconnectedUnexpectedly(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_ends_the_pump_cleanly() {
        let bus = EventBus::default();
        let (stop_tx, stop_rx) = watch::channel(false);

        let feed = stream::pending::<Vec<u8>>();
        let task = tokio::spawn(async move { pump(Box::pin(feed), bus, stop_rx).await });

        stop_tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("pump did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
