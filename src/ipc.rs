//! Line-based IPC protocol between the gateway and the control-surface endpoint
//!
//! Three verbs, newline-terminated ASCII, space-separated fields:
//!
//! - `VOL <id> <volume>` - authoritative state, endpoint to clients
//! - `VU <id> <level_db>` - meter level, endpoint to clients
//! - `SET_VOL <id> <volume>` - write request, client to endpoint
//!
//! Volumes are printed with 6 decimals, meter levels with 2. A line that does
//! not scan is ignored by the receiver; one bad line must never take down a
//! connection.

use tracing::debug;

/// A parsed IPC command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Authoritative track volume (endpoint -> clients)
    Vol { id: u32, volume: f64 },
    /// Meter level in dB (endpoint -> clients)
    Vu { id: u32, level_db: f64 },
    /// Volume write request (client -> endpoint)
    SetVol { id: u32, volume: f64 },
}

/// Format a `VOL` state line.
pub fn format_vol(id: u32, volume: f64) -> String {
    format!("VOL {} {:.6}\n", id, volume)
}

/// Format a `VU` meter line.
pub fn format_vu(id: u32, level_db: f64) -> String {
    format!("VU {} {:.2}\n", id, level_db)
}

/// Format a `SET_VOL` write request line.
pub fn format_set_vol(id: u32, volume: f64) -> String {
    format!("SET_VOL {} {:.6}\n", id, volume)
}

/// Parse one line (without or with its trailing newline).
///
/// Returns `None` for unrecognized verbs or lines whose fields fail to scan;
/// the caller logs and moves on.
pub fn parse(line: &str) -> Option<Command> {
    let mut fields = line.trim_end_matches(['\r', '\n']).split_ascii_whitespace();
    let verb = fields.next()?;
    let id: u32 = fields.next()?.parse().ok()?;
    let value: f64 = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }

    match verb {
        "VOL" => Some(Command::Vol { id, volume: value }),
        "VU" => Some(Command::Vu {
            id,
            level_db: value,
        }),
        "SET_VOL" => Some(Command::SetVol { id, volume: value }),
        _ => {
            debug!("Ignoring unrecognized IPC verb: {}", verb);
            None
        }
    }
}

/// Accumulates raw TCP reads and hands out complete newline-terminated lines.
///
/// TCP gives no message boundaries; a read may end mid-line or carry several
/// lines at once. The remainder after the last newline stays buffered for the
/// next read.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and drain every complete line.
    ///
    /// Non-UTF-8 chunks are replaced lossily; the protocol is ASCII, so any
    /// replacement characters end up in lines the parser rejects anyway.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(data));

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        lines
    }
}
