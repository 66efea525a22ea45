use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;
use std::time::Duration;

use memchr::memmem;

use crate::types::TraceRecord;

/// Minimum number of `|`-separated fields in a trace line.
pub const MIN_FIELDS: usize = 11;

const FIELD_MESSAGE: usize = 0;
const FIELD_SOURCE_ADDR: usize = 5;
const FIELD_SOURCE_PORT: usize = 6;
const FIELD_DEST_ADDR: usize = 8;
const FIELD_DEST_PORT: usize = 9;
const FIELD_TIMESTAMP: usize = 10;

static ESCAPED_CRLF: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(br"\x0D\x0A"));

/// Why a trace line did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    TooFewFields { found: usize },
    InvalidAddress { field: usize, value: String },
    InvalidPort { field: usize, value: String },
    InvalidTimestamp { value: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TooFewFields { found } => {
                write!(f, "expected at least {MIN_FIELDS} fields, found {found}")
            }
            SkipReason::InvalidAddress { field, value } => {
                write!(f, "field {field}: '{value}' is not an IPv4 address")
            }
            SkipReason::InvalidPort { field, value } => {
                write!(f, "field {field}: '{value}' is not a port number")
            }
            SkipReason::InvalidTimestamp { value } => {
                write!(f, "field {FIELD_TIMESTAMP}: '{value}' is not an epoch timestamp")
            }
        }
    }
}

impl std::error::Error for SkipReason {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Take the capture time from field 10 instead of the conversion clock.
    pub use_line_timestamps: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            use_line_timestamps: true,
        }
    }
}

/// Parse one trace line into a [`TraceRecord`].
///
/// Expected layout (only the listed indices are read):
/// `<sip text>|..|..|..|..|<src ip>|<src port>|..|<dst ip>|<dst port>|<epoch secs>`
///
/// The SIP text is kept byte for byte; only the addressing and time fields
/// have to be UTF-8.
pub fn parse_line(line: &[u8], options: &ParseOptions) -> Result<TraceRecord, SkipReason> {
    let fields: Vec<&[u8]> = line.split(|&b| b == b'|').collect();
    if fields.len() < MIN_FIELDS {
        return Err(SkipReason::TooFewFields {
            found: fields.len(),
        });
    }

    let mut payload = unescape_crlf(fields[FIELD_MESSAGE]);
    normalize_terminator(&mut payload);

    let source = parse_ipv4(&fields, FIELD_SOURCE_ADDR)?;
    let destination = parse_ipv4(&fields, FIELD_DEST_ADDR)?;
    let source_port = parse_port(&fields, FIELD_SOURCE_PORT)?;
    let destination_port = parse_port(&fields, FIELD_DEST_PORT)?;

    let timestamp = if options.use_line_timestamps {
        let raw = fields[FIELD_TIMESTAMP];
        let ts = field_text(raw)
            .and_then(parse_epoch_seconds)
            .ok_or_else(|| SkipReason::InvalidTimestamp {
                value: lossy(raw),
            })?;
        Some(ts)
    } else {
        None
    };

    Ok(TraceRecord {
        payload,
        source,
        destination,
        source_port,
        destination_port,
        timestamp,
    })
}

/// Replace every literal `\x0D\x0A` escape left by the logger with a real CRLF.
pub fn unescape_crlf(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut last = 0;
    for pos in ESCAPED_CRLF.find_iter(text) {
        out.extend_from_slice(&text[last..pos]);
        out.extend_from_slice(b"\r\n");
        last = pos + ESCAPED_CRLF.needle().len();
    }
    out.extend_from_slice(&text[last..]);
    out
}

/// Make the message end in exactly the blank line a SIP dissector expects.
///
/// Text already ending in `\r\n\r\n` is left alone, so this is idempotent.
pub fn normalize_terminator(text: &mut Vec<u8>) {
    if text.ends_with(b"\r\n\r\n") {
        return;
    }
    if text.ends_with(b"\r\n") {
        text.extend_from_slice(b"\r\n");
    } else {
        text.extend_from_slice(b"\r\n\r\n");
    }
}

fn field_text(raw: &[u8]) -> Option<&str> {
    std::str::from_utf8(raw).ok()
}

fn lossy(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Dotted quad, or an IPv4-mapped IPv6 literal such as `::ffff:10.0.0.1`.
fn to_ipv4(text: &str) -> Option<Ipv4Addr> {
    if let Ok(addr) = text.parse::<Ipv4Addr>() {
        return Some(addr);
    }
    text.parse::<Ipv6Addr>().ok()?.to_ipv4_mapped()
}

fn parse_ipv4(fields: &[&[u8]], field: usize) -> Result<Ipv4Addr, SkipReason> {
    field_text(fields[field])
        .and_then(to_ipv4)
        .ok_or_else(|| SkipReason::InvalidAddress {
            field,
            value: lossy(fields[field]),
        })
}

fn parse_port(fields: &[&[u8]], field: usize) -> Result<u16, SkipReason> {
    field_text(fields[field])
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| SkipReason::InvalidPort {
            field,
            value: lossy(fields[field]),
        })
}

/// Parse fractional seconds since the epoch, e.g. `1700000000.5`.
///
/// The sub-second part is truncated to whole nanoseconds.
fn parse_epoch_seconds(value: &str) -> Option<Duration> {
    let seconds: f64 = value.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 || seconds >= u64::MAX as f64 {
        return None;
    }
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1e9) as u32;
    Some(Duration::new(whole as u64, nanos.min(999_999_999)))
}
