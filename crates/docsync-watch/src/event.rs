//! Watch event types for change notification.
//!
//! Provides types for consuming directory changes produced by
//! [`FolderWatcher::start`](crate::FolderWatcher::start).

use std::path::PathBuf;
use std::sync::mpsc;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError};

/// Kind of file change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileEventKind {
    /// File was created (or found by the initial scan).
    Created,
    /// File was modified.
    Modified,
    /// File was removed.
    Removed,
}

/// A file change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEvent {
    /// Absolute path of the file inside the watched directory.
    pub path: PathBuf,
    /// Kind of change.
    pub kind: FileEventKind,
}

/// An event from a directory watch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEvent {
    /// A tracked file changed.
    File(FileEvent),
    /// The initial scan finished; every pre-existing file has been reported
    /// as [`FileEventKind::Created`]. Sent exactly once per watch.
    Ready,
}

/// Sending half of a watch channel.
pub type WatchEventSender = UnboundedSender<WatchEvent>;

/// Receiver for watch events.
///
/// Wraps a tokio unbounded channel so events can be produced from the
/// watcher's OS thread and consumed from async tasks.
#[derive(Debug)]
pub struct WatchEventReceiver {
    rx: UnboundedReceiver<WatchEvent>,
}

impl WatchEventReceiver {
    /// Create a connected sender/receiver pair.
    ///
    /// Used by [`FolderWatcher`](crate::FolderWatcher) and by callers that
    /// feed events from another source (e.g. tests).
    #[must_use]
    pub fn channel() -> (WatchEventSender, Self) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    /// Whether every sender has been dropped.
    ///
    /// Buffered events may still be available via [`try_recv`](Self::try_recv).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }

    /// Try to receive an event without waiting.
    ///
    /// Returns `None` if no event is available or the senders are dropped.
    pub fn try_recv(&mut self) -> Option<WatchEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

/// Handle to stop watching for changes.
///
/// Uses RAII pattern - dropping the handle stops watching automatically.
/// Signals shutdown by dropping the internal channel sender.
#[derive(Debug)]
pub struct WatchHandle {
    _shutdown: Option<mpsc::Sender<()>>,
}

impl WatchHandle {
    /// Create a new watch handle with a shutdown signal sender.
    ///
    /// When the handle is dropped, the sender is dropped, causing the
    /// receiver to return `Err(RecvError)` which signals shutdown.
    pub(crate) fn new(shutdown: mpsc::Sender<()>) -> Self {
        Self {
            _shutdown: Some(shutdown),
        }
    }

    /// Create a handle that owns no watch.
    ///
    /// Pairs with [`WatchEventReceiver::channel`] when events come from
    /// somewhere other than a [`FolderWatcher`](crate::FolderWatcher).
    #[must_use]
    pub fn detached() -> Self {
        Self { _shutdown: None }
    }

    /// Stop watching immediately (consumes the handle).
    pub fn stop(mut self) {
        self._shutdown.take();
    }
}
