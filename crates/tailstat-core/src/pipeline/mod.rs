//! Incremental file processing pipeline.
//!
//! Composes the tailer, the line scanner, and the log parser:
//! `carry`, `scanner`, `parser`, and `tailer` are the stages, and
//! [`FileProcessor`] drives one file through all of them.

pub mod carry;
pub mod parser;
pub mod scanner;
pub mod tailer;

#[cfg(test)]
mod property_tests;

use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::registry::TailState;
use crate::stats::StatsBuffer;
use tailer::TailStatus;

/// Drives one catch-up read of a single file.
///
/// Stateless apart from configuration; all per-file state lives in the
/// registry and all counters in the caller's stats buffer.
pub struct FileProcessor {
    chunk_size: usize,
    delay: Option<Duration>,
}

impl FileProcessor {
    /// `chunk_size` of 0 selects the default (64 KiB).
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            delay: None,
        }
    }

    /// Adds a fixed sleep to every call. Used to provoke gate contention
    /// and coalescing in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reads everything appended to `path` since `tail.offset`, scans it
    /// into lines, parses each line, and folds the results into `stats`.
    ///
    /// The caller must hold the file's gate; passing the guarded
    /// [`TailState`] is the proof. The offset is written back only when the
    /// tailer actually delivered bytes or performed a truncation reset, so
    /// a failed read retries the same range next time. Carry bytes are
    /// consumed exclusively by the scanner.
    pub fn process_once(
        &self,
        path: &Path,
        tail: &mut TailState,
        stats: &mut StatsBuffer,
    ) -> TailStatus {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        let TailState { offset, carry } = tail;
        let mut local_offset = *offset;

        let status = tailer::tail_since(path, &mut local_offset, self.chunk_size, |chunk| {
            scanner::scan_chunk(carry, chunk, |line| {
                stats.lines_processed += 1;
                match parser::parse_line(line) {
                    Some(parsed) => stats.record_line(&parsed),
                    None => stats.malformed_lines += 1,
                }
            });
        });

        stats.record_tail_status(status);
        if matches!(status, TailStatus::ReadSome | TailStatus::TruncatedReset) {
            *offset = local_offset;
        }
        status
    }
}
