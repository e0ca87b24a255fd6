//! Stateful line scanner.
//!
//! Splits an incoming byte stream into newline-delimited lines, chunk by
//! chunk. The logical input of one call is `carry || chunk`: bytes left over
//! from the previous chunk are prepended, and whatever follows the last
//! newline of this call becomes the new carry. No byte of the logical input
//! is ever dropped.

use super::carry::CarryBuffer;

/// Scans one chunk, emitting every complete line through `on_line`.
///
/// Lines never include the `\n` delimiter; a single `\r` immediately before
/// the delimiter is also stripped. The slice passed to `on_line` is valid
/// only for the duration of that call.
pub fn scan_chunk<F: FnMut(&[u8])>(carry: &mut CarryBuffer, chunk: &[u8], mut on_line: F) {
    if carry.is_empty() {
        // Fast path: emit straight out of the chunk, stash only the tail.
        let tail_start = emit_lines(chunk, &mut on_line);
        carry.append(&chunk[tail_start..]);
    } else {
        // A partial line is pending; lines may span the boundary, so the
        // chunk is appended and the combined buffer is scanned in place.
        carry.append(chunk);
        let consumed = emit_lines(carry.as_slice(), &mut on_line);
        carry.discard_front(consumed);
    }
}

/// Emits every complete line in `data` and returns the index of the first
/// byte after the last delimiter (the start of the unterminated tail).
fn emit_lines<F: FnMut(&[u8])>(data: &[u8], on_line: &mut F) -> usize {
    let mut start = 0;
    while let Some(rel) = data[start..].iter().position(|&b| b == b'\n') {
        let end = start + rel;
        let line = &data[start..end];
        on_line(line.strip_suffix(b"\r").unwrap_or(line));
        start = end + 1;
    }
    start
}
