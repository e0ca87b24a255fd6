//! Strict log line parser.
//!
//! Expected grammar: `<ISO-8601 timestamp> SP <level token> SP <message>`.
//! Tokenisation uses the first two ASCII spaces; everything after the second
//! space is the message body, possibly empty.
//!
//! The timestamp is parsed against a small fixed set of shapes instead of a
//! permissive library routine, so loose or ambiguous forms are rejected
//! consistently across platforms. A line whose timestamp does not parse, or
//! that is missing either of the first two spaces, is malformed. Everything
//! else is tolerated: an unknown level maps to [`LogLevel::Other`] and a
//! missing or garbled latency field simply yields no latency sample.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Log severity. Unrecognised tokens land in `Other` rather than failing
/// the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
    Other,
}

impl LogLevel {
    /// Number of distinct levels, for dense per-level counters.
    pub const COUNT: usize = 5;

    /// Dense index in `0..COUNT`.
    pub fn index(self) -> usize {
        match self {
            LogLevel::Info => 0,
            LogLevel::Warn => 1,
            LogLevel::Error => 2,
            LogLevel::Debug => 3,
            LogLevel::Other => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Debug => "debug",
            LogLevel::Other => "other",
        }
    }

    /// All levels in index order.
    pub fn all() -> [LogLevel; Self::COUNT] {
        [
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
            LogLevel::Debug,
            LogLevel::Other,
        ]
    }
}

/// A successfully parsed line. `message_key` borrows from the scanned line
/// and is valid only while that line is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// First whitespace-delimited token of the message body. Empty when the
    /// body is empty.
    pub message_key: &'a [u8],
    /// Value of a `latency_ms=<digits>` field anywhere in the line, if one
    /// parses cleanly.
    pub latency_ms: Option<u64>,
}

/// Parses one line. Returns `None` for malformed lines; a malformed line
/// never produces a partially populated record.
pub fn parse_line(line: &[u8]) -> Option<ParsedLine<'_>> {
    let sp1 = line.iter().position(|&b| b == b' ')?;
    let rest = &line[sp1 + 1..];
    let sp2 = rest.iter().position(|&b| b == b' ')?;

    let timestamp = parse_timestamp(&line[..sp1])?;
    let level = parse_level(&rest[..sp2]);

    let body = &rest[sp2 + 1..];
    let key_end = body
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(body.len());

    Some(ParsedLine {
        timestamp,
        level,
        message_key: &body[..key_end],
        latency_ms: find_latency(line),
    })
}

/// Case-insensitive match against the four known level tokens.
fn parse_level(token: &[u8]) -> LogLevel {
    if token.eq_ignore_ascii_case(b"INFO") {
        LogLevel::Info
    } else if token.eq_ignore_ascii_case(b"WARN") {
        LogLevel::Warn
    } else if token.eq_ignore_ascii_case(b"ERROR") {
        LogLevel::Error
    } else if token.eq_ignore_ascii_case(b"DEBUG") {
        LogLevel::Debug
    } else {
        LogLevel::Other
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Parses a strict ISO-8601 instant with an explicit zone designator.
///
/// Accepted shapes:
/// - `YYYY-MM-DDTHH:MM:SSZ`
/// - `YYYY-MM-DDTHH:MM:SS±HH:MM`
/// - either of the above with `.fff` or `.fffffff` fractional seconds
///
/// `T` and `Z` must be upper case. Any other form is rejected.
fn parse_timestamp(ts: &[u8]) -> Option<DateTime<Utc>> {
    // Fixed prefix: YYYY-MM-DDTHH:MM:SS (19 bytes).
    if ts.len() < 20 {
        return None;
    }
    if ts[4] != b'-' || ts[7] != b'-' || ts[10] != b'T' || ts[13] != b':' || ts[16] != b':' {
        return None;
    }
    let year = digits(ts, 0, 4)?;
    let month = digits(ts, 5, 2)?;
    let day = digits(ts, 8, 2)?;
    let hour = digits(ts, 11, 2)?;
    let minute = digits(ts, 14, 2)?;
    let second = digits(ts, 17, 2)?;

    // Optional fraction: exactly 3 (milliseconds) or 7 (100 ns ticks) digits.
    let mut pos = 19;
    let mut nanos: u32 = 0;
    if ts[pos] == b'.' {
        let frac_len = ts[pos + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        match frac_len {
            3 => nanos = digits(ts, pos + 1, 3)? * 1_000_000,
            7 => nanos = digits(ts, pos + 1, 7)? * 100,
            _ => return None,
        }
        pos += 1 + frac_len;
    }

    // Zone designator: Z, or a ±HH:MM offset, terminating the input.
    let zone = &ts[pos..];
    let offset_secs: i64 = match zone {
        [b'Z'] => 0,
        [sign @ (b'+' | b'-'), h1, h0, b':', m1, m0] => {
            let oh = two_digits(*h1, *h0)?;
            let om = two_digits(*m1, *m0)?;
            if om >= 60 {
                return None;
            }
            let magnitude = i64::from(oh) * 3600 + i64::from(om) * 60;
            if *sign == b'-' { -magnitude } else { magnitude }
        }
        _ => return None,
    };

    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
    let time = NaiveTime::from_hms_nano_opt(hour, minute, second, nanos)?;
    let local = date.and_time(time);
    let utc = local.checked_sub_signed(Duration::seconds(offset_secs))?;
    Some(DateTime::from_naive_utc_and_offset(utc, Utc))
}

/// Parses `count` ASCII digits at `start` into a number.
fn digits(bytes: &[u8], start: usize, count: usize) -> Option<u32> {
    let slice = bytes.get(start..start + count)?;
    let mut value: u32 = 0;
    for &b in slice {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value * 10 + u32::from(b - b'0');
    }
    Some(value)
}

fn two_digits(hi: u8, lo: u8) -> Option<u32> {
    if hi.is_ascii_digit() && lo.is_ascii_digit() {
        Some(u32::from(hi - b'0') * 10 + u32::from(lo - b'0'))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Latency field
// ---------------------------------------------------------------------------

const LATENCY_PREFIX: &[u8] = b"latency_ms=";

/// Scans the whole line for `latency_ms=<digits>`, folding case over the
/// entire prefix. Absent, digit-less, or overflowing values yield `None`;
/// none of those make the line malformed.
fn find_latency(line: &[u8]) -> Option<u64> {
    let n = LATENCY_PREFIX.len();
    if line.len() < n {
        return None;
    }
    let start = (0..=line.len() - n)
        .find(|&i| line[i..i + n].eq_ignore_ascii_case(LATENCY_PREFIX))?;
    parse_decimal(&line[start + n..])
}

/// Parses leading consecutive ASCII digits, rejecting empty runs and
/// numeric overflow.
fn parse_decimal(bytes: &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    let mut seen = false;
    for &b in bytes {
        if !b.is_ascii_digit() {
            break;
        }
        seen = true;
        value = value
            .checked_mul(10)?
            .checked_add(u64::from(b - b'0'))?;
    }
    seen.then_some(value)
}
