//! Core configuration.
//!
//! All knobs of the processing core in one validated struct. The daemon
//! builds this from CLI flags; library users fill it directly. Validation
//! happens once, at the host facade boundary; the components themselves
//! treat the values as preconditions.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use thiserror::Error;

/// Validation failures, surfaced by the host facade before anything starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("watch_path does not exist or is not a directory: {0:?}")]
    WatchPath(PathBuf),
    #[error("workers must be at least 1")]
    Workers,
    #[error("queue_capacity must be at least 1")]
    QueueCapacity,
    #[error("report_interval_seconds must be at least 1")]
    ReportInterval,
    #[error("top_k must be at least 1")]
    TopK,
    #[error("dequeue_timeout_ms must be at least 10")]
    DequeueTimeout,
    #[error("ack_timeout must be at least 1 second")]
    AckTimeout,
}

/// Configuration of the processing core.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Directory handed to the event producer. Must exist.
    pub watch_path: PathBuf,
    /// Number of worker threads. Fixed for the lifetime of the engine.
    pub workers: usize,
    /// Bus capacity; overflow drops the incoming event.
    pub queue_capacity: usize,
    /// Nominal reporter period in seconds.
    pub report_interval_seconds: u64,
    /// Truncation limit for the report's top message keys.
    pub top_k: usize,
    /// Per-call timeout for bus consumers, in milliseconds.
    pub dequeue_timeout_ms: u64,
    /// Per-worker swap acknowledgement timeout. `None` selects
    /// `max(1s, 1.5 x interval)`.
    pub ack_timeout: Option<Duration>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            watch_path: PathBuf::from("."),
            workers: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            queue_capacity: 10_000,
            report_interval_seconds: 2,
            top_k: 10,
            dequeue_timeout_ms: 200,
            ack_timeout: None,
        }
    }
}

impl CoreConfig {
    /// Checks every bound, including that the watch path names an existing
    /// directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.watch_path.is_dir() {
            return Err(ConfigError::WatchPath(self.watch_path.clone()));
        }
        if self.workers < 1 {
            return Err(ConfigError::Workers);
        }
        if self.queue_capacity < 1 {
            return Err(ConfigError::QueueCapacity);
        }
        if self.report_interval_seconds < 1 {
            return Err(ConfigError::ReportInterval);
        }
        if self.top_k < 1 {
            return Err(ConfigError::TopK);
        }
        if self.dequeue_timeout_ms < 10 {
            return Err(ConfigError::DequeueTimeout);
        }
        if let Some(ack) = self.ack_timeout
            && ack < Duration::from_secs(1)
        {
            return Err(ConfigError::AckTimeout);
        }
        Ok(())
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_seconds)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    /// Explicit ack timeout, or the default derived from the interval.
    pub fn effective_ack_timeout(&self) -> Duration {
        self.ack_timeout.unwrap_or_else(|| {
            Duration::from_secs(1).max(self.report_interval().mul_f64(1.5))
        })
    }
}
