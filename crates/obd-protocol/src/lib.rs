//! ELM327 / OBD-II Wire Codec
//!
//! Pure encode/decode for the serial OBD adapter: the AT initialization
//! sequence, response cleanup, hex payload parsing, and the Mode-01 PID
//! decode table. No I/O lives here; the serial adapter drives this codec
//! through its command channel.

mod elm;
mod pid;

pub use elm::{
    clean_response, is_alive, parse_payload, InitStep, COMMAND_TERMINATOR, INIT_SEQUENCE,
    LIVENESS_PROBE, PROMPT, SERIAL_BAUD,
};
pub use pid::Pid;
