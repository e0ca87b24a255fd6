//! Per-path file state and its registry.
//!
//! Each tracked path owns a `FileState`: the tail position and carry buffer
//! behind an exclusive gate, a dirty flag for coalescing, a delete-pending
//! flag, and a generation number. The registry maps live paths to their
//! state and keeps a per-path epoch that survives finalisation, so a state
//! created after a delete always carries a strictly newer generation.
//!
//! Locking rules:
//! - `offset` and `carry` are reachable only through the gate, so they can
//!   never be touched without holding it.
//! - Gate acquisition in the hot path is try-lock only; a busy gate is
//!   coalesced through the dirty flag instead of blocking the worker.
//! - A poisoned gate is recovered rather than propagated. A worker panic is
//!   already surfaced by the worker's own guard; wedging the path forever
//!   would turn one bad line into a permanent stall.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use crate::pipeline::carry::CarryBuffer;

/// Tail position of one file. Only reachable through the owning state's
/// gate.
#[derive(Debug, Default)]
pub struct TailState {
    /// Byte offset of the next read.
    pub offset: u64,
    /// Trailing incomplete line from the previous read.
    pub carry: CarryBuffer,
}

/// Per-path processing state.
#[derive(Debug)]
pub struct FileState {
    tail: Mutex<TailState>,
    dirty: AtomicBool,
    delete_pending: AtomicBool,
    generation: i32,
}

impl FileState {
    fn new(generation: i32) -> Self {
        Self {
            tail: Mutex::new(TailState::default()),
            dirty: AtomicBool::new(false),
            delete_pending: AtomicBool::new(false),
            generation,
        }
    }

    /// Generation assigned at creation; strictly greater than the
    /// generation of any previously finalised state for the same path.
    pub fn generation(&self) -> i32 {
        self.generation
    }

    /// Non-blocking gate acquisition. `None` means another worker holds the
    /// gate right now.
    pub fn try_lock_gate(&self) -> Option<MutexGuard<'_, TailState>> {
        match self.tail.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Blocking gate acquisition, for callers outside the event hot path.
    pub fn lock_gate(&self) -> MutexGuard<'_, TailState> {
        self.tail.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms the dirty flag so the gate holder re-reads before releasing.
    /// Refused once a delete is pending; returns whether the flag was set.
    pub fn mark_dirty(&self) -> bool {
        if self.delete_pending.load(Ordering::Acquire) {
            return false;
        }
        self.dirty.store(true, Ordering::Release);
        true
    }

    /// Consumes the dirty flag, returning whether it was set.
    pub fn clear_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Marks the state for removal. Never cleared again on this instance.
    pub fn set_delete_pending(&self) {
        self.delete_pending.store(true, Ordering::Release);
    }

    pub fn delete_pending(&self) -> bool {
        self.delete_pending.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct RegistryInner {
    states: HashMap<PathBuf, Arc<FileState>>,
    /// Highest generation ever finalised per path. Retained after removal
    /// so recreation yields a newer generation; this tombstone is the only
    /// thing that outlives a state.
    epochs: HashMap<PathBuf, i32>,
}

/// Registry of live per-path states.
#[derive(Default)]
pub struct FileRegistry {
    inner: Mutex<RegistryInner>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live state for `path`, creating it at the next
    /// generation if absent. Idempotent per live path: every caller gets
    /// the same instance until the state is finalised.
    pub fn get_or_create(&self, path: &Path) -> Arc<FileState> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = inner.states.get(path) {
            return Arc::clone(state);
        }
        let generation = inner.epochs.get(path).copied().unwrap_or(0) + 1;
        let state = Arc::new(FileState::new(generation));
        inner.states.insert(path.to_path_buf(), Arc::clone(&state));
        state
    }

    pub fn try_get(&self, path: &Path) -> Option<Arc<FileState>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.states.get(path).map(Arc::clone)
    }

    /// Removes `path`'s state and bumps the path's epoch.
    ///
    /// The caller must hold the state's gate and passes its guarded tail
    /// state, which has its carry released before the entry disappears.
    /// Taking the proof-of-gate as a parameter also keeps this call free of
    /// any second acquisition of the gate.
    pub fn finalize_delete(&self, path: &Path, tail: &mut TailState) {
        tail.carry.release();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = inner.states.remove(path) {
            let epoch = inner.epochs.entry(path.to_path_buf()).or_insert(0);
            *epoch = (*epoch).max(state.generation);
        }
    }

    /// Highest finalised generation for `path`; 0 if never finalised.
    pub fn current_epoch(&self, path: &Path) -> i32 {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.epochs.get(path).copied().unwrap_or(0)
    }

    /// Number of live states, for diagnostics.
    pub fn tracked_paths(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let registry = FileRegistry::new();
        let a = registry.get_or_create(Path::new("a.log"));
        let b = registry.get_or_create(Path::new("a.log"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.generation(), 1);
    }

    #[test]
    fn test_new_state_starts_clean() {
        let registry = FileRegistry::new();
        let state = registry.get_or_create(Path::new("a.log"));
        let tail = state.lock_gate();
        assert_eq!(tail.offset, 0);
        assert!(tail.carry.is_empty());
        drop(tail);
        assert!(!state.is_dirty());
        assert!(!state.delete_pending());
    }

    #[test]
    fn test_finalize_removes_and_bumps_epoch() {
        let registry = FileRegistry::new();
        let path = Path::new("a.log");
        let state = registry.get_or_create(path);

        let mut tail = state.lock_gate();
        tail.carry.append(b"partial");
        registry.finalize_delete(path, &mut tail);
        assert_eq!(tail.carry.capacity(), 0);
        drop(tail);

        assert!(registry.try_get(path).is_none());
        assert_eq!(registry.current_epoch(path), 1);
    }

    #[test]
    fn test_generations_strictly_increase_across_cycles() {
        let registry = FileRegistry::new();
        let path = Path::new("a.log");

        let mut previous = 0;
        for _ in 0..5 {
            let state = registry.get_or_create(path);
            assert!(state.generation() > previous);
            previous = state.generation();

            let mut tail = state.lock_gate();
            registry.finalize_delete(path, &mut tail);
        }
        assert_eq!(registry.current_epoch(path), 5);
    }

    #[test]
    fn test_gate_try_lock_excludes() {
        let registry = FileRegistry::new();
        let state = registry.get_or_create(Path::new("a.log"));

        let held = state.try_lock_gate().unwrap();
        assert!(state.try_lock_gate().is_none());
        drop(held);
        assert!(state.try_lock_gate().is_some());
    }

    #[test]
    fn test_mark_dirty_refused_when_delete_pending() {
        let registry = FileRegistry::new();
        let state = registry.get_or_create(Path::new("a.log"));

        assert!(state.mark_dirty());
        assert!(state.clear_dirty());
        assert!(!state.clear_dirty());

        state.set_delete_pending();
        assert!(!state.mark_dirty());
        assert!(!state.is_dirty());
    }

    #[test]
    fn test_concurrent_get_or_create_returns_one_instance() {
        let registry = Arc::new(FileRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                registry.get_or_create(Path::new("shared.log"))
            }));
        }
        let states: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for state in &states[1..] {
            assert!(Arc::ptr_eq(&states[0], state));
        }
    }

    #[test]
    fn test_paths_are_independent() {
        let registry = FileRegistry::new();
        let a = registry.get_or_create(Path::new("a.log"));
        let b = registry.get_or_create(Path::new("b.log"));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.tracked_paths(), 2);
    }
}
