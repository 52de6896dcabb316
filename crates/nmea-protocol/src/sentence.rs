//! NMEA 0183 sentence parsing.
//!
//! Malformed input (wrong talker, too few fields, unparsable numbers)
//! yields `None` or an absent field, never an error. A lap timer feeding
//! garbage over BLE must not be able to take the bridge down.

use serde::Serialize;

/// Nautical miles per hour to km/h.
pub const KNOTS_TO_KMH: f64 = 1.852;

/// `$GPGGA`: fix data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GgaData {
    pub fix_quality: u8,
    pub satellites: u8,
    pub hdop: Option<f64>,
    pub altitude_m: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// `$GPRMC`: recommended minimum position/velocity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RmcData {
    /// Status field `A` (active). `V` means the receiver has no fix yet.
    pub valid: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub heading_deg: Option<f64>,
    /// Date as reported, `ddmmyy`.
    pub date: Option<String>,
}

/// `$GPVTG`: track and ground speed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VtgData {
    pub heading_true_deg: Option<f64>,
    pub heading_magnetic_deg: Option<f64>,
    pub speed_knots: Option<f64>,
    pub speed_kmh: Option<f64>,
}

/// One recognized sentence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Sentence {
    Gga(GgaData),
    Rmc(RmcData),
    Vtg(VtgData),
}

/// Parse one line. The checksum suffix is stripped but not verified; the
/// lenient devices this targets routinely truncate sentences mid-flight
/// and the field parsing already degrades per-field.
pub fn parse_sentence(line: &str) -> Option<Sentence> {
    let line = line.trim();
    let body = line.strip_prefix('$')?;
    let body = body.split('*').next().unwrap_or(body);
    let fields: Vec<&str> = body.split(',').collect();

    match *fields.first()? {
        "GPGGA" => parse_gga(&fields),
        "GPRMC" => parse_rmc(&fields),
        "GPVTG" => parse_vtg(&fields),
        _ => None,
    }
}

/// Convert a `DDMM.mmmm` / hemisphere pair to signed decimal degrees.
/// South and west are negative. Empty fields (receiver without a fix)
/// and unknown hemispheres yield `None`.
pub fn parse_coordinate(value: &str, hemisphere: &str) -> Option<f64> {
    let raw: f64 = value.parse().ok().filter(|v: &f64| v.is_finite())?;
    let degrees = (raw / 100.0).floor();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    match hemisphere {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

/// Horizontal accuracy estimate in meters from satellite count and HDOP.
pub fn accuracy_m(satellites: u8, hdop: Option<f64>) -> f64 {
    if satellites < 4 {
        return 100.0;
    }
    match hdop {
        Some(h) if h < 1.0 => 1.0,
        Some(h) if h < 2.0 => 2.0,
        Some(h) if h < 5.0 => 5.0,
        _ => 10.0,
    }
}

fn parse_f64(field: &str) -> Option<f64> {
    field.parse().ok().filter(|v: &f64| v.is_finite())
}

fn parse_gga(fields: &[&str]) -> Option<Sentence> {
    // $GPGGA,time,lat,N/S,lon,E/W,quality,sats,hdop,alt,M,...
    if fields.len() < 10 {
        tracing::trace!(len = fields.len(), "dropping short GGA sentence");
        return None;
    }
    Some(Sentence::Gga(GgaData {
        fix_quality: fields[6].parse().unwrap_or(0),
        satellites: fields[7].parse().unwrap_or(0),
        hdop: parse_f64(fields[8]),
        altitude_m: parse_f64(fields[9]),
        latitude: parse_coordinate(fields[2], fields[3]),
        longitude: parse_coordinate(fields[4], fields[5]),
    }))
}

fn parse_rmc(fields: &[&str]) -> Option<Sentence> {
    // $GPRMC,time,status,lat,N/S,lon,E/W,knots,track,date,...
    if fields.len() < 10 {
        tracing::trace!(len = fields.len(), "dropping short RMC sentence");
        return None;
    }
    Some(Sentence::Rmc(RmcData {
        valid: fields[2] == "A",
        latitude: parse_coordinate(fields[3], fields[4]),
        longitude: parse_coordinate(fields[5], fields[6]),
        speed_kmh: parse_f64(fields[7]).map(|knots| knots * KNOTS_TO_KMH),
        heading_deg: parse_f64(fields[8]),
        date: if fields[9].is_empty() {
            None
        } else {
            Some(fields[9].to_string())
        },
    }))
}

fn parse_vtg(fields: &[&str]) -> Option<Sentence> {
    // $GPVTG,track,T,track,M,knots,N,kmh,K
    if fields.len() < 8 {
        tracing::trace!(len = fields.len(), "dropping short VTG sentence");
        return None;
    }
    let speed_knots = parse_f64(fields[5]);
    Some(Sentence::Vtg(VtgData {
        heading_true_deg: parse_f64(fields[1]),
        heading_magnetic_deg: parse_f64(fields[3]),
        speed_knots,
        speed_kmh: parse_f64(fields[7]).or_else(|| speed_knots.map(|k| k * KNOTS_TO_KMH)),
    }))
}
