//! The reporter's working set and report formatting.

use crate::pipeline::parser::LogLevel;
use crate::stats::histogram::PercentileValue;
use crate::stats::{topk, StatsBuffer};

/// Everything one report tick merges and derives. Reset and refilled every
/// tick; the containers are reused across ticks.
#[derive(Debug, Default)]
pub struct GlobalSnapshot {
    pub stats: StatsBuffer,

    pub bus_published: u64,
    pub bus_dropped: u64,
    pub bus_depth: usize,

    /// Workers whose swap acknowledgement did not arrive this tick.
    pub ack_timeouts: u64,

    /// Allocator movement since the previous tick, when a probe exists.
    pub allocated_delta: Option<i64>,
    pub resident_delta: Option<i64>,

    pub top_messages: Vec<(String, u64)>,
    pub p50: Option<PercentileValue>,
    pub p95: Option<PercentileValue>,
    pub p99: Option<PercentileValue>,
}

impl GlobalSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the snapshot to observable zero before a new merge pass.
    pub fn reset(&mut self) {
        self.stats.reset();
        self.bus_published = 0;
        self.bus_dropped = 0;
        self.bus_depth = 0;
        self.ack_timeouts = 0;
        self.allocated_delta = None;
        self.resident_delta = None;
        self.top_messages.clear();
        self.p50 = None;
        self.p95 = None;
        self.p99 = None;
    }

    /// Computes the derived outputs from the merged counters.
    pub fn finalise(&mut self, top_k: usize) {
        self.top_messages = topk::top_k(&self.stats.message_counts, top_k);
        self.p50 = self.stats.histogram.percentile(0.50);
        self.p95 = self.stats.histogram.percentile(0.95);
        self.p99 = self.stats.histogram.percentile(0.99);
    }
}

/// Renders one report block. The first line carries every counter in a
/// stable order; a `TopK:` block follows when any keys were seen.
/// `elapsed_seconds` of zero marks the final report.
pub fn format_report(snapshot: &GlobalSnapshot, elapsed_seconds: f64) -> String {
    let stats = &snapshot.stats;
    let mut line = String::with_capacity(256);

    line.push_str(&format!(
        "elapsed={:.2} lines={} rate={} malformed={}",
        elapsed_seconds,
        stats.lines_processed,
        format_rate(stats.lines_processed, elapsed_seconds),
        stats.malformed_lines,
    ));
    line.push_str(&format!(
        " events={} (created={} modified={} deleted={} renamed={}) event_rate={}",
        stats.fs_events_total(),
        stats.fs_created,
        stats.fs_modified,
        stats.fs_deleted,
        stats.fs_renamed,
        format_rate(stats.fs_events_total(), elapsed_seconds),
    ));
    line.push_str(&format!(
        " levels (info={} warn={} error={} debug={} other={})",
        stats.level_counts.get(LogLevel::Info),
        stats.level_counts.get(LogLevel::Warn),
        stats.level_counts.get(LogLevel::Error),
        stats.level_counts.get(LogLevel::Debug),
        stats.level_counts.get(LogLevel::Other),
    ));
    line.push_str(&format!(
        " bus_published={} bus_dropped={} bus_depth={}",
        snapshot.bus_published, snapshot.bus_dropped, snapshot.bus_depth,
    ));
    line.push_str(&format!(
        " coalesced={} deletes_parked={} skipped_deleted={} states_removed={}",
        stats.coalesced_due_to_busy_gate,
        stats.delete_pending_set_count,
        stats.skipped_due_to_delete_pending,
        stats.file_state_removed_count,
    ));
    line.push_str(&format!(
        " not_found={} denied={} io_errors={} truncations={} ack_timeouts={}",
        stats.file_not_found_count,
        stats.access_denied_count,
        stats.io_exception_count,
        stats.truncation_reset_count,
        snapshot.ack_timeouts,
    ));
    if let Some(delta) = snapshot.allocated_delta {
        line.push_str(&format!(
            " alloc_delta={} rss_delta={}",
            format_bytes_delta(delta),
            format_bytes_delta(snapshot.resident_delta.unwrap_or(0)),
        ));
    }
    line.push_str(&format!(
        " p50={} p95={} p99={}",
        format_percentile(snapshot.p50),
        format_percentile(snapshot.p95),
        format_percentile(snapshot.p99),
    ));

    if !snapshot.top_messages.is_empty() {
        line.push_str("\nTopK:");
        for (key, count) in &snapshot.top_messages {
            line.push_str(&format!("\n  {}: {}", key, count));
        }
    }
    line
}

fn format_percentile(value: Option<PercentileValue>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

/// Per-second rate over the measured interval; a zero interval (the final
/// report) yields a zero rate.
fn format_rate(count: u64, elapsed_seconds: f64) -> String {
    let rate = if elapsed_seconds > 0.0 {
        count as f64 / elapsed_seconds
    } else {
        0.0
    };
    format!("{:.1}/s", rate)
}

/// Signed human-readable byte count, e.g. `+1.5M` or `-12.0K`.
fn format_bytes_delta(delta: i64) -> String {
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const KB: f64 = 1024.0;

    let sign = if delta < 0 { "-" } else { "+" };
    let magnitude = delta.unsigned_abs() as f64;
    if magnitude >= GB {
        format!("{}{:.1}G", sign, magnitude / GB)
    } else if magnitude >= MB {
        format!("{}{:.1}M", sign, magnitude / MB)
    } else if magnitude >= KB {
        format!("{}{:.1}K", sign, magnitude / KB)
    } else {
        format!("{}{}B", sign, delta.unsigned_abs())
    }
}
