//! Directory watching for docsync.
//!
//! This crate provides [`FolderWatcher`], which subscribes to filesystem
//! notifications for one directory and turns them into a stream of
//! [`WatchEvent`]s:
//!
//! - Pre-existing files are reported as synthetic [`FileEventKind::Created`]
//!   events, followed by a single [`WatchEvent::Ready`]
//! - Later changes are debounced per file and reported as created, modified,
//!   or removed
//! - Hidden entries and non-`.json` files are ignored
//!
//! # Example
//!
//! ```ignore
//! use docsync_watch::{FolderWatcher, WatchEvent};
//!
//! let (mut rx, _handle) = FolderWatcher::new("data/items").start()?;
//! while let Some(event) = rx.recv().await {
//!     match event {
//!         WatchEvent::Ready => println!("initial scan done"),
//!         WatchEvent::File(change) => println!("{:?} {}", change.kind, change.path.display()),
//!     }
//! }
//! ```

mod debouncer;
mod event;
mod scanner;

use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{EventKind, RecursiveMode, Watcher};

use debouncer::EventDebouncer;
pub use event::{
    FileEvent, FileEventKind, WatchEvent, WatchEventReceiver, WatchEventSender, WatchHandle,
};
pub use scanner::{is_hidden, is_tracked, scan_files, scan_subdirectories};

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Poll interval of the drain thread.
const DRAIN_INTERVAL: Duration = Duration::from_millis(25);

/// Watch error.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The notification backend refused the subscription.
    #[error("Failed to watch {}: {source}", path.display())]
    Notify {
        /// Watched directory.
        path: PathBuf,
        /// Backend error.
        #[source]
        source: notify::Error,
    },
    /// The initial scan could not list the directory.
    #[error("Failed to scan {}: {source}", path.display())]
    Scan {
        /// Watched directory.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Map a notify event kind to a file event kind for one of its paths.
///
/// Renames are reported per side: the path that still exists was created,
/// the one that is gone was removed. Returns `None` for irrelevant kinds
/// (e.g., access).
fn file_event_kind(kind: EventKind, path: &Path) -> Option<FileEventKind> {
    match kind {
        EventKind::Create(_) => Some(FileEventKind::Created),
        EventKind::Modify(ModifyKind::Name(_)) => Some(if path.exists() {
            FileEventKind::Created
        } else {
            FileEventKind::Removed
        }),
        EventKind::Modify(_) => Some(FileEventKind::Modified),
        EventKind::Remove(_) => Some(FileEventKind::Removed),
        _ => None,
    }
}

/// Process a notify event result, recording tracked paths into the debouncer.
fn record_notify_events(res: Result<notify::Event, notify::Error>, debouncer: &EventDebouncer) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Watch backend error");
            return;
        }
    };
    for path in event.paths {
        if !is_tracked(&path) {
            continue;
        }
        if let Some(kind) = file_event_kind(event.kind, &path) {
            debouncer.record(path, kind);
        }
    }
}

/// Watches the direct children of one directory.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use docsync_watch::FolderWatcher;
///
/// let watcher = FolderWatcher::new("data/items").with_debounce(Duration::from_millis(50));
/// let (rx, handle) = watcher.start()?;
/// ```
#[derive(Clone, Debug)]
pub struct FolderWatcher {
    dir: PathBuf,
    debounce: Duration,
}

impl FolderWatcher {
    /// Create a watcher for `dir` with the default debounce window.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Set the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Subscribe to changes and run the initial scan.
    ///
    /// The subscription is registered before the scan, so files created
    /// while scanning are reported (possibly twice). All initial `Created`
    /// events and the `Ready` marker are already queued when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError`] if the subscription cannot be registered or the
    /// directory cannot be listed.
    pub fn start(&self) -> Result<(WatchEventReceiver, WatchHandle), WatchError> {
        let (event_tx, event_rx) = WatchEventReceiver::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let debouncer = Arc::new(EventDebouncer::new(self.debounce));

        let notify_error = |source| WatchError::Notify {
            path: self.dir.clone(),
            source,
        };
        let watcher_debouncer = Arc::clone(&debouncer);
        let mut watcher = notify::recommended_watcher(move |res| {
            record_notify_events(res, &watcher_debouncer);
        })
        .map_err(notify_error)?;
        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(notify_error)?;

        let files = scan_files(&self.dir).map_err(|source| WatchError::Scan {
            path: self.dir.clone(),
            source,
        })?;
        tracing::debug!(dir = %self.dir.display(), files = files.len(), "Initial scan complete");
        debouncer.mark_scanned(files.iter().cloned());
        for path in files {
            // Receiver is still held locally; sends cannot fail yet.
            let _ = event_tx.send(WatchEvent::File(FileEvent {
                path,
                kind: FileEventKind::Created,
            }));
        }
        let _ = event_tx.send(WatchEvent::Ready);

        // Spawn drain thread. The watcher is moved in to keep it alive.
        std::thread::spawn(move || {
            let _watcher = watcher;

            loop {
                match shutdown_rx.recv_timeout(DRAIN_INTERVAL) {
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                }

                for event in debouncer.drain_ready() {
                    if event_tx.send(WatchEvent::File(event)).is_err() {
                        return;
                    }
                }
            }
        });

        // When dropped, shutdown_tx disconnects, causing the drain thread to exit
        Ok((event_rx, WatchHandle::new(shutdown_tx)))
    }
}
