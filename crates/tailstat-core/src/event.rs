//! Filesystem event model.
//!
//! Events are produced by an external watcher (see [`crate::watch`]) and
//! consumed by the worker pool through the bounded bus. An event is immutable
//! once constructed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// What happened to the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

/// A single filesystem notification.
///
/// `path` is an opaque identity compared as raw bytes. `old_path` is set only
/// for renames. `observed_at` is wall-clock and advisory; all scheduling in
/// the pipeline uses monotonic time.
#[derive(Debug, Clone)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
    pub old_path: Option<PathBuf>,
    pub observed_at: DateTime<Utc>,
    /// Whether the pipeline should tail this path. Decided at event
    /// construction from the filename extension.
    pub processable: bool,
}

impl FsEvent {
    fn new(kind: FsEventKind, path: PathBuf, old_path: Option<PathBuf>) -> Self {
        let processable = is_processable(&path);
        Self {
            kind,
            path,
            old_path,
            observed_at: Utc::now(),
            processable,
        }
    }

    pub fn created(path: PathBuf) -> Self {
        Self::new(FsEventKind::Created, path, None)
    }

    pub fn modified(path: PathBuf) -> Self {
        Self::new(FsEventKind::Modified, path, None)
    }

    pub fn deleted(path: PathBuf) -> Self {
        Self::new(FsEventKind::Deleted, path, None)
    }

    /// A rename from `old_path` to `path`. The `processable` flag refers to
    /// the new name.
    pub fn renamed(old_path: PathBuf, path: PathBuf) -> Self {
        Self::new(FsEventKind::Renamed, path, Some(old_path))
    }
}

/// Returns true if the path's extension is `.log` or `.txt`, ASCII
/// case-insensitive. Paths without an extension are never processable.
pub fn is_processable(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.eq_ignore_ascii_case("log") || ext.eq_ignore_ascii_case("txt"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processable_extensions() {
        assert!(is_processable(Path::new("/var/log/app.log")));
        assert!(is_processable(Path::new("notes.txt")));
        assert!(is_processable(Path::new("UPPER.LOG")));
        assert!(is_processable(Path::new("mixed.TxT")));
        assert!(!is_processable(Path::new("archive.gz")));
        assert!(!is_processable(Path::new("noext")));
        assert!(!is_processable(Path::new(".log")));
    }

    #[test]
    fn test_constructors_set_processable() {
        assert!(FsEvent::created(PathBuf::from("a.log")).processable);
        assert!(!FsEvent::modified(PathBuf::from("a.bin")).processable);

        let ev = FsEvent::renamed(PathBuf::from("a.tmp"), PathBuf::from("a.log"));
        assert_eq!(ev.kind, FsEventKind::Renamed);
        assert_eq!(ev.old_path.as_deref(), Some(Path::new("a.tmp")));
        // The flag follows the new name, not the old one.
        assert!(ev.processable);
    }
}
