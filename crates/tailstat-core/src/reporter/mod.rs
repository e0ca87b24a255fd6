//! Periodic statistics reporter.
//!
//! A single thread that, every interval, swaps every worker's buffers,
//! merges the handed-over halves into a global snapshot, derives rates,
//! top-K, and percentiles, and emits one report block. Cadence and elapsed
//! time both come from the monotonic clock. Stop is observed within a
//! bounded time regardless of the interval length and is followed by one
//! final report marked `elapsed=0.00`.

pub mod report;
pub mod sink;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, warn};

use crate::bus::EventBus;
use crate::mem::{AllocSnapshot, MemoryProbe};
use crate::stats::swap::WorkerStats;
use report::{format_report, GlobalSnapshot};
use sink::{DiagnosticSink, ReportSink};

/// How long `stop` waits for the reporter thread to wind down.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Granularity at which the sleeping reporter re-checks the stop flag.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

struct ReporterInner {
    bus: Arc<EventBus>,
    workers: Vec<Arc<WorkerStats>>,
    interval: Duration,
    ack_timeout: Duration,
    top_k: usize,
    sink: Box<dyn ReportSink>,
    diag: Box<dyn DiagnosticSink>,
    probe: Arc<dyn MemoryProbe>,
    stopping: Arc<AtomicBool>,
}

/// Owns the reporter thread.
pub struct Reporter {
    stopping: Arc<AtomicBool>,
    inner: Option<ReporterInner>,
    handle: Option<JoinHandle<ReporterInner>>,
}

impl Reporter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: Arc<EventBus>,
        workers: Vec<Arc<WorkerStats>>,
        interval: Duration,
        ack_timeout: Duration,
        top_k: usize,
        sink: Box<dyn ReportSink>,
        diag: Box<dyn DiagnosticSink>,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        let stopping = Arc::new(AtomicBool::new(false));
        Self {
            stopping: Arc::clone(&stopping),
            inner: Some(ReporterInner {
                bus,
                workers,
                interval,
                ack_timeout,
                top_k,
                sink,
                diag,
                probe,
                stopping,
            }),
            handle: None,
        }
    }

    /// Launches the reporter thread. A second start while running is a
    /// no-op; a start after a clean stop relaunches.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let Some(inner) = self.inner.take() else {
            return Err(std::io::Error::other("reporter thread was abandoned"));
        };
        self.stopping.store(false, Ordering::Release);
        let handle = thread::Builder::new()
            .name("tailstat-reporter".to_string())
            .spawn(move || run_loop(inner))?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Signals the loop and waits (bounded) for the final report. The
    /// thread returns its state so the reporter can be started again.
    pub fn stop(&mut self) {
        self.stopping.store(true, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return;
        };
        let deadline = Instant::now() + STOP_TIMEOUT;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if handle.is_finished() {
            match handle.join() {
                Ok(inner) => self.inner = Some(inner),
                Err(_) => error!("reporter thread exited via panic"),
            }
        } else {
            warn!("reporter did not stop within {:?}; abandoning it", STOP_TIMEOUT);
        }
    }
}

fn run_loop(mut inner: ReporterInner) -> ReporterInner {
    let mut baseline = inner.probe.snapshot();
    let mut snapshot = GlobalSnapshot::new();
    let mut last_tick = Instant::now();

    while !inner.stopping.load(Ordering::Acquire) {
        sleep_interruptible(&inner.stopping, inner.interval);
        if inner.stopping.load(Ordering::Acquire) {
            break;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(last_tick).as_secs_f64();
        last_tick = now;

        // An unexpected panic skips one report, never the reporter.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            tick(&mut inner, &mut snapshot, &mut baseline, elapsed);
        }));
        if outcome.is_err() {
            error!("reporter tick panicked; continuing");
        }
    }

    final_tick(&mut inner, &mut snapshot, baseline.as_ref());
    inner
}

/// One periodic report: swap, wait, merge, derive, emit.
fn tick(
    inner: &mut ReporterInner,
    snapshot: &mut GlobalSnapshot,
    baseline: &mut Option<AllocSnapshot>,
    elapsed: f64,
) {
    let ReporterInner {
        bus,
        workers,
        ack_timeout,
        top_k,
        sink,
        diag,
        probe,
        ..
    } = inner;

    for shared in workers.iter() {
        shared.request_swap();
    }

    // One deadline across all workers: a stalled worker cannot consume the
    // whole budget for everyone behind it.
    let deadline = Instant::now() + *ack_timeout;

    snapshot.reset();
    for (index, shared) in workers.iter().enumerate() {
        if shared.wait_for_swap_ack(deadline) {
            shared.with_inactive_mut(|buf| {
                snapshot.stats.merge_from(buf);
                // Drained after merge so a later flush or re-merge cannot
                // double-count this interval.
                buf.reset();
            });
        } else {
            snapshot.ack_timeouts += 1;
            diag.warn(&format!("swap ack timed out for worker {}", index));
        }
    }

    attach_bus(snapshot, bus);
    let reading = probe.snapshot();
    attach_memory_deltas(snapshot, reading, baseline.as_ref());
    if let Some(reading) = reading {
        *baseline = Some(reading);
    }

    snapshot.finalise(*top_k);
    sink.emit(&format_report(snapshot, elapsed));
}

/// The final report. The workers have been stopped by the host before this
/// runs and have flushed their remaining counts into the shared buffers,
/// so no swap round-trip is needed (or possible).
fn final_tick(
    inner: &mut ReporterInner,
    snapshot: &mut GlobalSnapshot,
    baseline: Option<&AllocSnapshot>,
) {
    let ReporterInner {
        bus,
        workers,
        top_k,
        sink,
        probe,
        ..
    } = inner;

    snapshot.reset();
    for shared in workers.iter() {
        shared.with_inactive_mut(|buf| {
            snapshot.stats.merge_from(buf);
            buf.reset();
        });
    }

    attach_bus(snapshot, bus);
    attach_memory_deltas(snapshot, probe.snapshot(), baseline);
    snapshot.finalise(*top_k);
    sink.emit(&format_report(snapshot, 0.0));
}

fn attach_bus(snapshot: &mut GlobalSnapshot, bus: &EventBus) {
    snapshot.bus_published = bus.published_count();
    snapshot.bus_dropped = bus.dropped_count();
    snapshot.bus_depth = bus.depth();
}

fn attach_memory_deltas(
    snapshot: &mut GlobalSnapshot,
    reading: Option<AllocSnapshot>,
    baseline: Option<&AllocSnapshot>,
) {
    if let (Some(reading), Some(base)) = (reading, baseline) {
        snapshot.allocated_delta =
            Some(reading.allocated_bytes as i64 - base.allocated_bytes as i64);
        snapshot.resident_delta =
            Some(reading.resident_bytes as i64 - base.resident_bytes as i64);
    }
}

/// Sleeps `duration` in small slices so a stop request is honoured within
/// [`SLEEP_SLICE`] regardless of the interval length.
fn sleep_interruptible(stopping: &AtomicBool, duration: Duration) {
    let mut remaining = duration;
    while remaining > Duration::ZERO && !stopping.load(Ordering::Acquire) {
        let step = remaining.min(SLEEP_SLICE);
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}
