//! Bounded event bus between the watcher and the worker pool.
//!
//! Fixed-capacity FIFO with drop-newest overflow: a publisher never blocks
//! and never evicts an item that is already queued. Consumers block on a
//! condition variable with a per-call timeout measured on the monotonic
//! clock. `stop` wakes every waiting consumer; queued items drain before
//! consumers see the stopped state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::event::FsEvent;

/// Result of one publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Accepted,
    /// The queue was full; the incoming event was discarded.
    Dropped,
    /// The bus had already been stopped.
    Stopped,
}

/// Result of one dequeue attempt.
#[derive(Debug)]
pub enum DequeueOutcome {
    Event(FsEvent),
    Timeout,
    /// Stopped and no items remain.
    Drained,
}

struct BusInner {
    queue: VecDeque<FsEvent>,
    stopped: bool,
}

/// Many-producer many-consumer bounded queue.
pub struct EventBus {
    inner: Mutex<BusInner>,
    available: Condvar,
    capacity: usize,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl EventBus {
    /// `capacity` must be at least 1; the host facade validates this before
    /// construction.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity >= 1);
        Self {
            inner: Mutex::new(BusInner {
                queue: VecDeque::with_capacity(capacity.min(1024)),
                stopped: false,
            }),
            available: Condvar::new(),
            capacity,
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues an event without ever blocking for capacity. A full queue
    /// drops the incoming event and bumps the drop counter.
    pub fn publish(&self, event: FsEvent) -> PublishOutcome {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.stopped {
            return PublishOutcome::Stopped;
        }
        if inner.queue.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return PublishOutcome::Dropped;
        }
        inner.queue.push_back(event);
        self.published.fetch_add(1, Ordering::Relaxed);
        drop(inner);
        self.available.notify_one();
        PublishOutcome::Accepted
    }

    /// Waits up to `timeout` for an event. Remaining items are handed out
    /// after `stop`; only an empty stopped bus reports `Drained`.
    pub fn try_dequeue(&self, timeout: Duration) -> DequeueOutcome {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(event) = inner.queue.pop_front() {
                return DequeueOutcome::Event(event);
            }
            if inner.stopped {
                return DequeueOutcome::Drained;
            }
            let now = Instant::now();
            if now >= deadline {
                return DequeueOutcome::Timeout;
            }
            let (guard, _timeout) = self
                .available
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }
    }

    /// Marks the bus stopped and wakes every waiting consumer. Later
    /// publishes are refused; queued items remain dequeueable.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.stopped = true;
        drop(inner);
        self.available.notify_all();
    }

    /// Accepted publishes so far. Monotonic.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Overflow drops so far. Monotonic. Publishes refused because the bus
    /// was stopped count as neither published nor dropped.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Snapshot of the current queue length.
    pub fn depth(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.queue.len()
    }
}
