//! Property tests for the scanner and parser.
//!
//! The scanner must reproduce its logical input for any chunking of any
//! byte stream, and the parser must recover every component of any
//! well-formed line exactly.

use proptest::prelude::*;

use super::carry::CarryBuffer;
use super::parser::{self, LogLevel};
use super::scanner;

/// Splits `data` at the given fractions and feeds the pieces through the
/// scanner, returning the emitted lines and the final carry.
fn scan_in_chunks(data: &[u8], cuts: &[usize]) -> (Vec<Vec<u8>>, Vec<u8>) {
    let mut carry = CarryBuffer::new();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut bounds: Vec<usize> = cuts.iter().map(|&c| c % (data.len() + 1)).collect();
    bounds.sort_unstable();
    bounds.push(data.len());
    for end in bounds {
        if end < start {
            continue;
        }
        scanner::scan_chunk(&mut carry, &data[start..end], |line| {
            lines.push(line.to_vec());
        });
        start = end;
    }
    (lines, carry.as_slice().to_vec())
}

proptest! {
    /// Chunking is invisible: any split of the input yields the same lines
    /// and carry as one big chunk.
    #[test]
    fn scanner_is_chunking_independent(
        data in proptest::collection::vec(any::<u8>(), 0..512),
        cuts in proptest::collection::vec(any::<usize>(), 0..8),
    ) {
        let (whole_lines, whole_carry) = scan_in_chunks(&data, &[]);
        let (split_lines, split_carry) = scan_in_chunks(&data, &cuts);
        prop_assert_eq!(whole_lines, split_lines);
        prop_assert_eq!(whole_carry, split_carry);
    }

    /// No byte is dropped: emitted lines plus the carry reproduce the input
    /// once delimiters (and the single CR each may hide) are re-inserted.
    #[test]
    fn scanner_preserves_input(
        segments in proptest::collection::vec(
            proptest::collection::vec(any::<u8>().prop_filter("no delimiters", |b| *b != b'\n' && *b != b'\r'), 0..32),
            0..8,
        ),
        crlf in proptest::collection::vec(any::<bool>(), 0..8),
        trailing in proptest::collection::vec(any::<u8>().prop_filter("no delimiters", |b| *b != b'\n' && *b != b'\r'), 0..32),
        cuts in proptest::collection::vec(any::<usize>(), 0..6),
    ) {
        // Build an input whose expected decomposition is known: each
        // segment terminated by \n or \r\n, then an unterminated tail.
        let mut data = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            data.extend_from_slice(segment);
            if crlf.get(i).copied().unwrap_or(false) {
                data.push(b'\r');
            }
            data.push(b'\n');
        }
        data.extend_from_slice(&trailing);

        let (lines, carry) = scan_in_chunks(&data, &cuts);
        prop_assert_eq!(lines, segments);
        prop_assert_eq!(carry, trailing);
    }

    /// Any well-formed line round-trips through the parser.
    #[test]
    fn parser_recovers_well_formed_lines(
        year in 1i32..9999,
        month in 1u32..=12,
        day in 1u32..=28,
        hour in 0u32..=23,
        minute in 0u32..=59,
        second in 0u32..=59,
        millis in proptest::option::of(0u32..=999),
        offset_minutes in -14i32 * 60..=14 * 60,
        level_idx in 0usize..4,
        key in "[a-z_][a-z0-9_.-]{0,15}",
        latency in proptest::option::of(0u64..100_000),
    ) {
        use chrono::{TimeZone, Utc};

        let (level_token, level) = [
            ("INFO", LogLevel::Info),
            ("warn", LogLevel::Warn),
            ("Error", LogLevel::Error),
            ("DEBUG", LogLevel::Debug),
        ][level_idx];

        let fraction = match millis {
            Some(ms) => format!(".{:03}", ms),
            None => String::new(),
        };
        let zone = if offset_minutes == 0 {
            "Z".to_string()
        } else {
            let sign = if offset_minutes < 0 { '-' } else { '+' };
            let magnitude = offset_minutes.unsigned_abs();
            format!("{}{:02}:{:02}", sign, magnitude / 60, magnitude % 60)
        };
        let latency_field = match latency {
            Some(ms) => format!(" latency_ms={}", ms),
            None => String::new(),
        };
        let line = format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{}{} {} {} body{}",
            year, month, day, hour, minute, second, fraction, zone, level_token, key, latency_field,
        );

        let parsed = parser::parse_line(line.as_bytes()).expect("well-formed line must parse");

        let expected = Utc
            .with_ymd_and_hms(year, month, day, hour, minute, second)
            .unwrap()
            + chrono::Duration::milliseconds(i64::from(millis.unwrap_or(0)))
            - chrono::Duration::minutes(i64::from(offset_minutes));
        prop_assert_eq!(parsed.timestamp, expected);
        prop_assert_eq!(parsed.level, level);
        prop_assert_eq!(parsed.message_key, key.as_bytes());
        prop_assert_eq!(parsed.latency_ms, latency);
    }
}
