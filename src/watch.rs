//! Formula file change notifications
//!
//! Watches the file's directory rather than the file, so editors that save
//! by writing a temp file and renaming it over the original are still seen.

use crate::error::WatchError;
use crossbeam::channel::{unbounded, Receiver};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub struct ReloadWatcher {
    path: PathBuf,
    events: Receiver<()>,
    _watcher: RecommendedWatcher,
}

impl ReloadWatcher {
    pub fn new(path: &Path) -> Result<Self, WatchError> {
        let (tx, events) = unbounded();
        let watched_name = path.file_name().map(OsString::from);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_content_change(&event.kind) && touches(&event, watched_name.as_deref()) {
                    debug!(kind = ?event.kind, "formula file changed");
                    let _ = tx.send(());
                }
            }
            Err(e) => warn!("file watch error: {e}"),
        })?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            path: path.to_path_buf(),
            events,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One message per relevant filesystem event
    pub fn events(&self) -> &Receiver<()> {
        &self.events
    }

    /// Let a burst of events settle, then discard what queued up meanwhile.
    /// Returns the number of events coalesced.
    pub fn settle(&self, debounce: Duration) -> usize {
        if !debounce.is_zero() {
            thread::sleep(debounce);
        }
        self.events.try_iter().count()
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any
    )
}

fn touches(event: &Event, name: Option<&std::ffi::OsStr>) -> bool {
    event.paths.is_empty() || event.paths.iter().any(|p| p.file_name() == name)
}
