//! Allocator telemetry abstraction.
//!
//! The reporter prints allocator deltas per tick when the host can provide
//! them. The core stays allocator-agnostic: the daemon installs jemalloc
//! and supplies a probe; library users get the silent default.

/// One reading of the process allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocSnapshot {
    /// Bytes currently allocated by the application.
    pub allocated_bytes: u64,
    /// Bytes of physical memory the allocator maps.
    pub resident_bytes: u64,
}

/// Source of allocator readings.
pub trait MemoryProbe: Send + Sync {
    /// Returns the current reading, or `None` when telemetry is
    /// unavailable.
    fn snapshot(&self) -> Option<AllocSnapshot>;
}

/// Probe used when the host provides no allocator telemetry.
#[derive(Debug, Default)]
pub struct NoopMemoryProbe;

impl MemoryProbe for NoopMemoryProbe {
    fn snapshot(&self) -> Option<AllocSnapshot> {
        None
    }
}
