//! ELM327 command surface and response cleanup.

/// Response terminator: the adapter prints its prompt when it is ready for
/// the next command.
pub const PROMPT: char = '>';

/// Every command sent to the adapter ends with a bare carriage return.
pub const COMMAND_TERMINATOR: &str = "\r";

/// ELM327-compatible adapters talk 38400 8N1.
pub const SERIAL_BAUD: u32 = 38_400;

/// One step of the fixed initialization sequence.
#[derive(Debug, Clone, Copy)]
pub struct InitStep {
    pub command: &'static str,
    /// How long the chip needs after acknowledging before the next command.
    pub settle_ms: u64,
}

/// Initialization sequence run after the transport opens, in order. Reset
/// needs a long settle while the chip reboots; the configuration commands
/// (echo, linefeeds, spaces, headers all off) only need a short one.
pub const INIT_SEQUENCE: [InitStep; 5] = [
    InitStep { command: "ATZ", settle_ms: 1000 },
    InitStep { command: "ATE0", settle_ms: 100 },
    InitStep { command: "ATL0", settle_ms: 100 },
    InitStep { command: "ATS0", settle_ms: 100 },
    InitStep { command: "ATH0", settle_ms: 100 },
];

/// Mode-01 supported-PIDs probe issued as the final handshake step. An
/// empty or `NO DATA` answer means no ECU is talking to the adapter.
pub const LIVENESS_PROBE: &str = "0100";

/// Normalize a raw adapter response: drop the prompt, all whitespace and
/// line terminators, and the `SEARCHING...` preamble clones print while
/// hunting for a protocol. The result is an uppercase character run ready
/// for hex parsing.
pub fn clean_response(raw: &str) -> String {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != PROMPT)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    while let Some(rest) = cleaned.strip_prefix("SEARCHING...") {
        cleaned = rest.to_string();
    }
    cleaned
}

/// Liveness check for the `0100` probe response. `NO DATA`, `UNABLE TO
/// CONNECT`, and empty responses all mean the handshake failed.
pub fn is_alive(raw: &str) -> bool {
    let cleaned = clean_response(raw);
    !cleaned.is_empty() && !cleaned.contains("NODATA") && !cleaned.contains("UNABLETOCONNECT")
}

/// Parse the leading run of hex digits in a cleaned response into bytes.
/// A trailing odd nibble is dropped; non-hex responses ("?", "OK") parse
/// to an empty payload rather than an error.
pub fn parse_payload(cleaned: &str) -> Vec<u8> {
    let hex: Vec<u8> = cleaned
        .bytes()
        .take_while(u8::is_ascii_hexdigit)
        .collect();
    hex.chunks_exact(2)
        .filter_map(|pair| {
            let digits = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(digits, 16).ok()
        })
        .collect()
}
