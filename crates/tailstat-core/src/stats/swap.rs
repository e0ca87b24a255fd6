//! Double-buffer handover between a worker and the reporter.
//!
//! Each worker owns its active `StatsBuffer` outright and mutates it without
//! any locking. The shared half holds the inactive buffer plus the swap
//! protocol state. The reporter requests a swap; the worker honours the
//! request at its next safe point (between two complete event handlings) by
//! exchanging the buffers and signalling an acknowledgement. The exchange is
//! a `mem::swap` of a small struct whose containers are heap-backed, so no
//! sample data is copied.
//!
//! Happens-before for the reporter's read is established by the
//! acknowledgement signal: the swap and the reset of the new active buffer
//! complete before the signal is set, and the reporter reads the inactive
//! buffer only after observing the signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Instant;

use super::StatsBuffer;

/// Shared side of one worker's double buffer.
#[derive(Default)]
pub struct WorkerStats {
    swap_requested: AtomicBool,
    inactive: Mutex<StatsBuffer>,
    ack: Mutex<bool>,
    acked: Condvar,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self {
            swap_requested: AtomicBool::new(false),
            inactive: Mutex::new(StatsBuffer::new()),
            ack: Mutex::new(false),
            acked: Condvar::new(),
        }
    }

    /// Reporter side: arm a swap and reset the acknowledgement signal.
    pub fn request_swap(&self) {
        let mut ack = self.ack.lock().unwrap_or_else(PoisonError::into_inner);
        *ack = false;
        drop(ack);
        self.swap_requested.store(true, Ordering::Release);
    }

    /// Worker side: if a swap is armed, exchange the buffers, reset the new
    /// active buffer, and signal the acknowledgement. Must only be called at
    /// a safe point; `active` must be the caller's own active buffer.
    pub fn acknowledge_swap_if_requested(&self, active: &mut StatsBuffer) {
        if !self.swap_requested.swap(false, Ordering::AcqRel) {
            return;
        }
        {
            let mut inactive = self.inactive.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::swap(&mut *inactive, active);
        }
        active.reset();

        let mut ack = self.ack.lock().unwrap_or_else(PoisonError::into_inner);
        *ack = true;
        self.acked.notify_all();
    }

    /// Reporter side: block until the worker acknowledges or the deadline
    /// passes. Returns whether the acknowledgement arrived.
    pub fn wait_for_swap_ack(&self, deadline: Instant) -> bool {
        let mut ack = self.ack.lock().unwrap_or_else(PoisonError::into_inner);
        while !*ack {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _timeout) = self
                .acked
                .wait_timeout(ack, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            ack = guard;
        }
        true
    }

    /// Reporter side: read (and optionally drain) the inactive buffer.
    /// Call only after a successful [`wait_for_swap_ack`], or during the
    /// final flush when the workers have already exited.
    ///
    /// [`wait_for_swap_ack`]: WorkerStats::wait_for_swap_ack
    pub fn with_inactive_mut<R>(&self, f: impl FnOnce(&mut StatsBuffer) -> R) -> R {
        let mut inactive = self.inactive.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inactive)
    }

    /// Worker side, on exit: fold the remaining active data into the
    /// inactive buffer so the final report can pick it up.
    pub fn flush_active(&self, active: &mut StatsBuffer) {
        let mut inactive = self.inactive.lock().unwrap_or_else(PoisonError::into_inner);
        inactive.merge_from(active);
        active.reset();
    }
}
