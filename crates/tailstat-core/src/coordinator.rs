//! Worker pool and event routing.
//!
//! A fixed number of workers dequeue events from the bus and drive the file
//! processor. Per-path serialisation is enforced by the file state's gate:
//! exactly one worker processes a given path at any instant. A worker that
//! finds the gate busy does not wait; it arms the dirty flag so the gate
//! holder re-reads before releasing, which coalesces bursts of events for a
//! hot file into a single catch-up pass. Deletes observed while the gate is
//! busy are parked on the delete-pending flag and finalised by the gate
//! holder.
//!
//! Every worker acknowledges buffer swaps only at safe points: after fully
//! handling one event, on dequeue timeouts, and between iterations of a
//! catch-up loop.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::bus::{DequeueOutcome, EventBus};
use crate::event::{FsEvent, FsEventKind};
use crate::pipeline::FileProcessor;
use crate::registry::FileRegistry;
use crate::stats::swap::WorkerStats;
use crate::stats::StatsBuffer;

/// How long `stop` waits for each worker to exit before abandoning it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed-size pool of worker threads.
///
/// The worker count is the length of the `worker_stats` slice and never
/// changes after construction.
pub struct Coordinator {
    bus: Arc<EventBus>,
    registry: Arc<FileRegistry>,
    processor: Arc<FileProcessor>,
    worker_stats: Vec<Arc<WorkerStats>>,
    dequeue_timeout: Duration,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Coordinator {
    pub fn new(
        bus: Arc<EventBus>,
        registry: Arc<FileRegistry>,
        processor: Arc<FileProcessor>,
        worker_stats: Vec<Arc<WorkerStats>>,
        dequeue_timeout: Duration,
    ) -> Self {
        debug_assert!(!worker_stats.is_empty());
        Self {
            bus,
            registry,
            processor,
            worker_stats,
            dequeue_timeout,
            shutdown: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_stats.len()
    }

    /// Spawns the worker threads.
    pub fn start(&mut self) -> std::io::Result<()> {
        for (index, stats) in self.worker_stats.iter().enumerate() {
            let ctx = WorkerCtx {
                index,
                bus: Arc::clone(&self.bus),
                registry: Arc::clone(&self.registry),
                processor: Arc::clone(&self.processor),
                shared: Arc::clone(stats),
                shutdown: Arc::clone(&self.shutdown),
                dequeue_timeout: self.dequeue_timeout,
            };
            let handle = thread::Builder::new()
                .name(format!("tailstat-worker-{}", index))
                .spawn(move || worker_loop(ctx))?;
            self.handles.push(handle);
        }
        Ok(())
    }

    /// Signals shutdown, stops the bus, and waits for the workers with a
    /// bounded per-pool deadline. Threads cannot be killed; a worker that
    /// outlives the deadline is abandoned with a diagnostic.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.bus.stop();

        let deadline = Instant::now() + JOIN_TIMEOUT;
        for handle in self.handles.drain(..) {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    error!("worker thread exited via panic");
                }
            } else {
                warn!("worker did not stop within {:?}; abandoning it", JOIN_TIMEOUT);
            }
        }
    }
}

struct WorkerCtx {
    index: usize,
    bus: Arc<EventBus>,
    registry: Arc<FileRegistry>,
    processor: Arc<FileProcessor>,
    shared: Arc<WorkerStats>,
    shutdown: Arc<AtomicBool>,
    dequeue_timeout: Duration,
}

fn worker_loop(ctx: WorkerCtx) {
    let mut active = StatsBuffer::new();
    debug!(worker = ctx.index, "worker started");

    loop {
        if ctx.shutdown.load(Ordering::Acquire) {
            break;
        }
        match ctx.bus.try_dequeue(ctx.dequeue_timeout) {
            DequeueOutcome::Event(event) => {
                // Unexpected panics are confined to the event that caused
                // them; the worker keeps draining.
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    handle_event(&ctx, &event, &mut active);
                }));
                if outcome.is_err() {
                    error!(
                        worker = ctx.index,
                        path = %event.path.display(),
                        "panic while handling event; continuing"
                    );
                }
                ctx.shared.acknowledge_swap_if_requested(&mut active);
            }
            DequeueOutcome::Timeout => {
                ctx.shared.acknowledge_swap_if_requested(&mut active);
            }
            DequeueOutcome::Drained => break,
        }
    }

    // Hand the remaining active data to the reporter's final flush.
    ctx.shared.flush_active(&mut active);
    debug!(worker = ctx.index, "worker stopped");
}

fn handle_event(ctx: &WorkerCtx, event: &FsEvent, active: &mut StatsBuffer) {
    active.record_event_kind(event.kind);
    match event.kind {
        FsEventKind::Created | FsEventKind::Modified => {
            if event.processable {
                handle_create_or_modify(ctx, &event.path, active);
            }
        }
        FsEventKind::Deleted => handle_delete(ctx, &event.path, active),
        FsEventKind::Renamed => {
            if let Some(old_path) = &event.old_path {
                handle_delete(ctx, old_path, active);
            }
            if event.processable {
                handle_create_or_modify(ctx, &event.path, active);
            }
        }
    }
}

/// Catches a path up with its file. Runs the processor under the gate and
/// keeps iterating while other workers mark the path dirty, so a burst of
/// events costs one gate acquisition.
fn handle_create_or_modify(ctx: &WorkerCtx, path: &Path, active: &mut StatsBuffer) {
    let state = ctx.registry.get_or_create(path);

    let Some(mut tail) = state.try_lock_gate() else {
        // Another worker owns this path right now. Leave a note and move
        // on; the dirty flag may not be armed once a delete is pending.
        state.mark_dirty();
        active.coalesced_due_to_busy_gate += 1;
        return;
    };

    let mut first_iteration = true;
    loop {
        if state.delete_pending() {
            if first_iteration {
                active.skipped_due_to_delete_pending += 1;
            }
            ctx.registry.finalize_delete(path, &mut tail);
            active.file_state_removed_count += 1;
            return;
        }

        ctx.shared.acknowledge_swap_if_requested(active);
        ctx.processor.process_once(path, &mut tail, active);
        ctx.shared.acknowledge_swap_if_requested(active);

        if state.delete_pending() {
            ctx.registry.finalize_delete(path, &mut tail);
            active.file_state_removed_count += 1;
            return;
        }
        if !state.clear_dirty() {
            return;
        }
        first_iteration = false;
    }
}

/// Removes a path's state, either immediately (gate free) or by parking a
/// delete-pending marker for the current gate holder to honour.
fn handle_delete(ctx: &WorkerCtx, path: &Path, active: &mut StatsBuffer) {
    let Some(state) = ctx.registry.try_get(path) else {
        return;
    };
    match state.try_lock_gate() {
        Some(mut tail) => {
            state.set_delete_pending();
            ctx.registry.finalize_delete(path, &mut tail);
            active.file_state_removed_count += 1;
        }
        None => {
            state.set_delete_pending();
            active.delete_pending_set_count += 1;
        }
    }
}
