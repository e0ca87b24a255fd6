//! Per-worker statistics.
//!
//! Provides:
//! - `StatsBuffer`, the counters a worker accumulates between reports
//! - `histogram`, the fixed-range latency histogram
//! - `topk`, sort-and-truncate selection over message counts
//! - `swap`, the double-buffer handover protocol between workers and the
//!   reporter

pub mod histogram;
pub mod swap;
pub mod topk;

use std::borrow::Cow;
use std::collections::HashMap;

use crate::event::FsEventKind;
use crate::pipeline::parser::{LogLevel, ParsedLine};
use crate::pipeline::tailer::TailStatus;
use histogram::LatencyHistogram;

/// Dense per-level line counters.
#[derive(Debug, Clone, Default)]
pub struct LevelCounts([u64; LogLevel::COUNT]);

impl LevelCounts {
    pub fn increment(&mut self, level: LogLevel) {
        self.0[level.index()] += 1;
    }

    pub fn get(&self, level: LogLevel) -> u64 {
        self.0[level.index()]
    }

    pub fn merge_from(&mut self, other: &LevelCounts) {
        for (dst, src) in self.0.iter_mut().zip(other.0.iter()) {
            *dst += src;
        }
    }

    pub fn reset(&mut self) {
        self.0 = [0; LogLevel::COUNT];
    }
}

/// One half of a worker's double buffer.
///
/// Scalars count events, lines, and pipeline anomalies; containers hold
/// per-level counts, message-key counts, and the latency histogram. `reset`
/// returns the buffer to observable zero.
#[derive(Debug, Default)]
pub struct StatsBuffer {
    pub fs_created: u64,
    pub fs_modified: u64,
    pub fs_deleted: u64,
    pub fs_renamed: u64,

    pub lines_processed: u64,
    pub malformed_lines: u64,

    pub coalesced_due_to_busy_gate: u64,
    pub delete_pending_set_count: u64,
    pub skipped_due_to_delete_pending: u64,
    pub file_state_removed_count: u64,

    pub file_not_found_count: u64,
    pub access_denied_count: u64,
    pub io_exception_count: u64,
    pub truncation_reset_count: u64,

    pub level_counts: LevelCounts,
    pub message_counts: HashMap<String, u64>,
    pub histogram: LatencyHistogram,
}

impl StatsBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total filesystem events recorded, all kinds.
    pub fn fs_events_total(&self) -> u64 {
        self.fs_created + self.fs_modified + self.fs_deleted + self.fs_renamed
    }

    pub fn record_event_kind(&mut self, kind: FsEventKind) {
        match kind {
            FsEventKind::Created => self.fs_created += 1,
            FsEventKind::Modified => self.fs_modified += 1,
            FsEventKind::Deleted => self.fs_deleted += 1,
            FsEventKind::Renamed => self.fs_renamed += 1,
        }
    }

    /// Folds one parsed line into the buffer. The message key is converted
    /// to an owned string only the first time it is seen.
    pub fn record_line(&mut self, parsed: &ParsedLine<'_>) {
        self.level_counts.increment(parsed.level);

        let key: Cow<'_, str> = String::from_utf8_lossy(parsed.message_key);
        if let Some(count) = self.message_counts.get_mut(key.as_ref()) {
            *count += 1;
        } else {
            self.message_counts.insert(key.into_owned(), 1);
        }

        if let Some(ms) = parsed.latency_ms {
            self.histogram.record(i64::try_from(ms).unwrap_or(i64::MAX));
        }
    }

    /// Maps a tailer's terminal status to the matching anomaly counter.
    pub fn record_tail_status(&mut self, status: TailStatus) {
        match status {
            TailStatus::FileNotFound => self.file_not_found_count += 1,
            TailStatus::AccessDenied => self.access_denied_count += 1,
            TailStatus::IoError => self.io_exception_count += 1,
            TailStatus::TruncatedReset => self.truncation_reset_count += 1,
            TailStatus::NoData | TailStatus::ReadSome => {}
        }
    }

    /// Returns the buffer to observable zero. Callers must not assume
    /// anything about retained container capacity.
    pub fn reset(&mut self) {
        self.fs_created = 0;
        self.fs_modified = 0;
        self.fs_deleted = 0;
        self.fs_renamed = 0;
        self.lines_processed = 0;
        self.malformed_lines = 0;
        self.coalesced_due_to_busy_gate = 0;
        self.delete_pending_set_count = 0;
        self.skipped_due_to_delete_pending = 0;
        self.file_state_removed_count = 0;
        self.file_not_found_count = 0;
        self.access_denied_count = 0;
        self.io_exception_count = 0;
        self.truncation_reset_count = 0;
        self.level_counts.reset();
        self.message_counts.clear();
        self.histogram.reset();
    }

    /// Sums `other` into this buffer: scalars add, level counters add
    /// element-wise, message counts add per key, histograms merge
    /// bucket-wise.
    pub fn merge_from(&mut self, other: &StatsBuffer) {
        self.fs_created += other.fs_created;
        self.fs_modified += other.fs_modified;
        self.fs_deleted += other.fs_deleted;
        self.fs_renamed += other.fs_renamed;
        self.lines_processed += other.lines_processed;
        self.malformed_lines += other.malformed_lines;
        self.coalesced_due_to_busy_gate += other.coalesced_due_to_busy_gate;
        self.delete_pending_set_count += other.delete_pending_set_count;
        self.skipped_due_to_delete_pending += other.skipped_due_to_delete_pending;
        self.file_state_removed_count += other.file_state_removed_count;
        self.file_not_found_count += other.file_not_found_count;
        self.access_denied_count += other.access_denied_count;
        self.io_exception_count += other.io_exception_count;
        self.truncation_reset_count += other.truncation_reset_count;
        self.level_counts.merge_from(&other.level_counts);
        for (key, count) in &other.message_counts {
            *self.message_counts.entry(key.clone()).or_insert(0) += count;
        }
        self.histogram.merge_from(&other.histogram);
    }
}
