//! NMEA 0183 Codec
//!
//! Pure decode for the GPS/lap-timer BLE stream: `$GPGGA`, `$GPRMC`, and
//! `$GPVTG` sentence parsing, coordinate conversion, an accuracy heuristic,
//! plus chunk reassembly (BLE notifications split sentences at arbitrary
//! byte boundaries) and fix accumulation across sentence kinds. No I/O.

mod assemble;
mod sentence;

pub use assemble::{FixAccumulator, GpsFix, LineSplitter};
pub use sentence::{
    accuracy_m, parse_coordinate, parse_sentence, GgaData, RmcData, Sentence, VtgData,
    KNOTS_TO_KMH,
};
