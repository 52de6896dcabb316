//! Chunk reassembly and fix accumulation.
//!
//! BLE notifications carry newline-delimited NMEA text but split it at
//! arbitrary byte boundaries, so sentences are rebuilt byte-by-byte before
//! parsing. Individual sentences each carry only part of a fix; the
//! accumulator merges them and decides when a complete position is worth
//! emitting.

use serde::Serialize;

use crate::sentence::{accuracy_m, parse_sentence, Sentence};

/// Longest sentence the splitter will buffer before assuming the stream is
/// garbage and resynchronizing on the next terminator.
const MAX_SENTENCE_LEN: usize = 128;

/// Rebuilds complete text lines from arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: String,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every line the chunk completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            match byte {
                b'\r' | b'\n' => {
                    if !self.buf.is_empty() {
                        lines.push(std::mem::take(&mut self.buf));
                    }
                }
                _ if byte.is_ascii() && !byte.is_ascii_control() => {
                    self.buf.push(byte as char);
                    if self.buf.len() > MAX_SENTENCE_LEN {
                        tracing::debug!("oversized sentence, resynchronizing");
                        self.buf.clear();
                    }
                }
                // Non-ASCII noise between sentences is dropped.
                _ => {}
            }
        }
        lines
    }
}

/// One merged position fix, ready to be stamped into a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub speed_kmh: f64,
    pub heading_deg: f64,
    pub fix_quality: u8,
    pub satellites: u8,
    pub hdop: f64,
    pub accuracy_m: f64,
}

/// Merges GGA/RMC/VTG sentences into a running fix.
///
/// GGA and RMC sentences that carry coordinates emit a fix; VTG only
/// refreshes heading and speed for the next emission; GGA without
/// coordinates (no fix yet) refreshes the fix metadata silently.
#[derive(Debug, Default)]
pub struct FixAccumulator {
    latitude: Option<f64>,
    longitude: Option<f64>,
    altitude_m: f64,
    speed_kmh: f64,
    heading_deg: f64,
    fix_quality: u8,
    satellites: u8,
    hdop: Option<f64>,
}

impl FixAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns a fix when a positional sentence completes
    /// one. Unrecognized or malformed lines are ignored.
    pub fn feed(&mut self, line: &str) -> Option<GpsFix> {
        match parse_sentence(line)? {
            Sentence::Gga(gga) => {
                self.fix_quality = gga.fix_quality;
                self.satellites = gga.satellites;
                self.hdop = gga.hdop;
                if let Some(altitude) = gga.altitude_m {
                    self.altitude_m = altitude;
                }
                match (gga.latitude, gga.longitude) {
                    (Some(lat), Some(lon)) => {
                        self.latitude = Some(lat);
                        self.longitude = Some(lon);
                        self.complete()
                    }
                    _ => None,
                }
            }
            Sentence::Rmc(rmc) => {
                if !rmc.valid {
                    return None;
                }
                if let Some(speed) = rmc.speed_kmh {
                    self.speed_kmh = speed;
                }
                if let Some(heading) = rmc.heading_deg {
                    self.heading_deg = heading;
                }
                if let (Some(lat), Some(lon)) = (rmc.latitude, rmc.longitude) {
                    self.latitude = Some(lat);
                    self.longitude = Some(lon);
                }
                self.complete()
            }
            Sentence::Vtg(vtg) => {
                if let Some(heading) = vtg.heading_true_deg {
                    self.heading_deg = heading;
                }
                if let Some(speed) = vtg.speed_kmh {
                    self.speed_kmh = speed;
                }
                None
            }
        }
    }

    fn complete(&self) -> Option<GpsFix> {
        let (latitude, longitude) = (self.latitude?, self.longitude?);
        Some(GpsFix {
            latitude,
            longitude,
            altitude_m: self.altitude_m,
            speed_kmh: self.speed_kmh,
            heading_deg: self.heading_deg,
            fix_quality: self.fix_quality,
            satellites: self.satellites,
            hdop: self.hdop.unwrap_or(0.0),
            accuracy_m: accuracy_m(self.satellites, self.hdop),
        })
    }
}
