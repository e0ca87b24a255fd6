//! Directory watcher built on platform file notifications.
//!
//! Wraps the `notify` crate's recommended backend (inotify on Linux,
//! kqueue on macOS, ReadDirectoryChanges on Windows) as an
//! [`EventProducer`]. Watching is non-recursive; only direct children of
//! the watched directory are reported. Handler errors are swallowed and
//! counted so the delivery callback can never raise into the backend, and
//! delivery never blocks: publishing into the engine's bus is a
//! non-blocking operation by construction.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::debug;

use crate::engine::{EventProducer, PublishFn};
use crate::event::FsEvent;

/// Produces [`FsEvent`]s for one directory.
pub struct DirectoryWatcher {
    path: PathBuf,
    watcher: Option<RecommendedWatcher>,
    callback_errors: Arc<AtomicU64>,
    seed_existing: bool,
}

impl DirectoryWatcher {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            watcher: None,
            callback_errors: Arc::new(AtomicU64::new(0)),
            seed_existing: false,
        }
    }

    /// Also announce files already present in the directory at start as
    /// synthetic `Created` events, so a watcher attached to a live log
    /// directory picks its files up without waiting for the next write.
    pub fn with_seed_existing(mut self) -> Self {
        self.seed_existing = true;
        self
    }

    /// Backend errors observed (and swallowed) since construction.
    pub fn callback_errors(&self) -> u64 {
        self.callback_errors.load(Ordering::Relaxed)
    }

    /// Publishes one `Created` per existing direct child. Unreadable
    /// directory entries are skipped and counted like backend errors.
    fn seed(&self, publish: &PublishFn) {
        let entries = match std::fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) => {
                self.callback_errors.fetch_add(1, Ordering::Relaxed);
                debug!("seed scan failed for {}: {}", self.path.display(), e);
                return;
            }
        };
        for entry in entries {
            match entry {
                Ok(entry) if entry.path().is_file() => publish(FsEvent::created(entry.path())),
                Ok(_) => {}
                Err(e) => {
                    self.callback_errors.fetch_add(1, Ordering::Relaxed);
                    debug!("seed scan entry error: {}", e);
                }
            }
        }
    }
}

impl EventProducer for DirectoryWatcher {
    fn start(&mut self, publish: PublishFn) -> Result<(), String> {
        let errors = Arc::clone(&self.callback_errors);
        let delivery = Arc::clone(&publish);
        let mut watcher = notify::recommended_watcher(
            move |result: Result<notify::Event, notify::Error>| match result {
                Ok(event) => {
                    for fs_event in map_notify_event(event) {
                        delivery(fs_event);
                    }
                }
                Err(e) => {
                    errors.fetch_add(1, Ordering::Relaxed);
                    debug!("watch backend error: {}", e);
                }
            },
        )
        .map_err(|e| format!("create watcher: {}", e))?;

        watcher
            .watch(&self.path, RecursiveMode::NonRecursive)
            .map_err(|e| format!("watch {}: {}", self.path.display(), e))?;
        self.watcher = Some(watcher);

        // Seed after the watch is armed so nothing created in between is
        // missed; a duplicate Created for a racing file is harmless.
        if self.seed_existing {
            self.seed(&publish);
        }
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the backend ends delivery.
        self.watcher = None;
    }
}

/// Maps one backend notification to zero or more pipeline events.
///
/// Renames where the backend pairs both names become a single `Renamed`
/// event; one-sided rename legs degrade to delete or create. Access and
/// other informational kinds are discarded.
fn map_notify_event(event: notify::Event) -> Vec<FsEvent> {
    match event.kind {
        EventKind::Create(_) => event.paths.into_iter().map(FsEvent::created).collect(),
        EventKind::Remove(_) => event.paths.into_iter().map(FsEvent::deleted).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(old_path), Some(new_path)) => vec![FsEvent::renamed(old_path, new_path)],
                (Some(only), None) => vec![FsEvent::modified(only)],
                _ => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.into_iter().map(FsEvent::deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.into_iter().map(FsEvent::created).collect()
        }
        EventKind::Modify(_) => event.paths.into_iter().map(FsEvent::modified).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}
