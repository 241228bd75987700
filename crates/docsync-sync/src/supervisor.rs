//! Per-directory watch supervision.
//!
//! A [`FolderSupervisor`] owns one directory's subscription and a worker task
//! that feeds its events, in arrival order, to a [`FileSyncAdapter`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use docsync_store::DocumentStore;
use docsync_watch::{
    DEFAULT_DEBOUNCE, FileEventKind, FolderWatcher, WatchEvent, WatchEventReceiver, WatchHandle,
};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::adapter::FileSyncAdapter;
use crate::error::StartupError;

/// How long shutdown waits for an in-flight event before aborting the worker.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A directory bound to the collection its files sync into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchBinding {
    /// Collection name.
    pub collection: String,
    /// Watched directory.
    pub dir: PathBuf,
}

impl WatchBinding {
    /// Bind `dir` to `collection`.
    #[must_use]
    pub fn new(collection: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            collection: collection.into(),
            dir: dir.into(),
        }
    }
}

/// Lifecycle of a [`FolderSupervisor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    /// Created, not started.
    Idle,
    /// Waiting for the shared database connection.
    Connecting,
    /// Subscribing and scanning the directory.
    Watching,
    /// Initial scan queued; steady-state watching.
    Ready,
    /// Stopping the worker.
    ShuttingDown,
    /// Subscription released.
    Closed,
}

/// Tuning for a [`FolderSupervisor`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Debounce window for filesystem notifications.
    pub debounce: Duration,
    /// Close the directory after this many consecutive failed events.
    /// `None` never closes it.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            max_consecutive_failures: None,
        }
    }
}

/// Event counters for one directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Files upserted successfully.
    pub synced: usize,
    /// Removals applied.
    pub removed: usize,
    /// Events that failed.
    pub failed: usize,
    /// Every file found by the initial scan has been processed.
    pub initial_sync_complete: bool,
    /// The worker has exited.
    pub stopped: bool,
}

struct Worker {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Watches one directory and syncs its files into one collection.
pub struct FolderSupervisor {
    binding: WatchBinding,
    store: Arc<dyn DocumentStore>,
    options: SupervisorOptions,
    state: Arc<watch::Sender<SupervisorState>>,
    stats: Arc<watch::Sender<SyncStats>>,
    worker: Option<Worker>,
}

impl FolderSupervisor {
    /// Create an idle supervisor.
    #[must_use]
    pub fn new(binding: WatchBinding, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            binding,
            store,
            options: SupervisorOptions::default(),
            state: Arc::new(watch::Sender::new(SupervisorState::Idle)),
            stats: Arc::new(watch::Sender::new(SyncStats::default())),
            worker: None,
        }
    }

    /// Set tuning options.
    #[must_use]
    pub fn with_options(mut self, options: SupervisorOptions) -> Self {
        self.options = options;
        self
    }

    /// The directory binding.
    #[must_use]
    pub fn binding(&self) -> &WatchBinding {
        &self.binding
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Current event counters.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.stats.borrow().clone()
    }

    /// Connect, subscribe to the directory and start the worker.
    ///
    /// Resolves once the supervisor is [`SupervisorState::Ready`]: the
    /// initial scan is queued, though not necessarily processed. Use
    /// [`wait_initial_sync`](Self::wait_initial_sync) for that.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] if the connection or the subscription cannot
    /// be established. The supervisor is then [`SupervisorState::Closed`].
    pub async fn start(&mut self) -> Result<(), StartupError> {
        if self.state() != SupervisorState::Idle {
            tracing::warn!(collection = %self.binding.collection, "Supervisor already started");
            return Ok(());
        }

        self.state.send_replace(SupervisorState::Connecting);
        if let Err(e) = self.store.connect().await {
            self.state.send_replace(SupervisorState::Closed);
            return Err(StartupError::Connect(e));
        }

        self.state.send_replace(SupervisorState::Watching);
        let watcher =
            FolderWatcher::new(&self.binding.dir).with_debounce(self.options.debounce);
        let (events, handle) = match watcher.start() {
            Ok(started) => started,
            Err(source) => {
                self.state.send_replace(SupervisorState::Closed);
                return Err(StartupError::Watch {
                    collection: self.binding.collection.clone(),
                    source,
                });
            }
        };

        self.attach(events, handle);
        tracing::info!(
            collection = %self.binding.collection,
            dir = %self.binding.dir.display(),
            "Watching directory"
        );
        Ok(())
    }

    /// Start the worker over an already established event stream.
    ///
    /// `handle` is released when the worker exits.
    pub fn attach(&mut self, events: WatchEventReceiver, handle: WatchHandle) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_worker(
            FileSyncAdapter::new(self.binding.collection.clone(), Arc::clone(&self.store)),
            events,
            handle,
            shutdown_rx,
            WorkerChannels {
                state: Arc::clone(&self.state),
                stats: Arc::clone(&self.stats),
            },
            self.options.max_consecutive_failures,
        ));
        self.worker = Some(Worker {
            shutdown: shutdown_tx,
            task,
        });
        self.state.send_replace(SupervisorState::Ready);
    }

    /// Wait until every file of the initial scan has been processed, or the
    /// worker stopped first.
    pub async fn wait_initial_sync(&self) -> SyncStats {
        if self.worker.is_none() {
            return self.stats();
        }
        let mut rx = self.stats.subscribe();
        match rx
            .wait_for(|stats| stats.initial_sync_complete || stats.stopped)
            .await
        {
            Ok(stats) => stats.clone(),
            Err(_) => self.stats(),
        }
    }

    /// Stop the worker and release the subscription.
    ///
    /// The event being processed is allowed to finish within a grace period;
    /// queued events are dropped. Does not disconnect the shared store.
    pub async fn shutdown(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            self.state.send_replace(SupervisorState::Closed);
            return;
        };

        if self.state() != SupervisorState::Closed {
            self.state.send_replace(SupervisorState::ShuttingDown);
        }
        let _ = worker.shutdown.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut worker.task)
            .await
            .is_err()
        {
            tracing::warn!(collection = %self.binding.collection, "Worker did not stop in time, aborting");
            worker.task.abort();
        }

        self.state.send_replace(SupervisorState::Closed);
        tracing::info!(collection = %self.binding.collection, "Stopped watching");
    }
}

struct WorkerChannels {
    state: Arc<watch::Sender<SupervisorState>>,
    stats: Arc<watch::Sender<SyncStats>>,
}

async fn run_worker(
    adapter: FileSyncAdapter,
    mut events: WatchEventReceiver,
    handle: WatchHandle,
    mut shutdown: oneshot::Receiver<()>,
    channels: WorkerChannels,
    max_consecutive_failures: Option<u32>,
) {
    // Dropping the handle ends the subscription.
    let _handle = handle;
    let collection = adapter.collection().to_owned();
    let mut consecutive_failures = 0u32;

    loop {
        let event = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            event = events.recv() => event,
        };
        let Some(event) = event else {
            tracing::debug!(collection = %collection, "Event stream closed");
            break;
        };

        let event = match event {
            WatchEvent::Ready => {
                channels
                    .stats
                    .send_modify(|stats| stats.initial_sync_complete = true);
                tracing::info!(collection = %collection, "Initial sync complete");
                continue;
            }
            WatchEvent::File(event) => event,
        };

        tracing::debug!(collection = %collection, path = %event.path.display(), kind = ?event.kind, "Processing event");
        let ok = adapter.process(&event).await;
        channels.stats.send_modify(|stats| match (ok, event.kind) {
            (false, _) => stats.failed += 1,
            (true, FileEventKind::Removed) => stats.removed += 1,
            (true, _) => stats.synced += 1,
        });

        if ok {
            consecutive_failures = 0;
            continue;
        }
        consecutive_failures += 1;
        if max_consecutive_failures.is_some_and(|max| consecutive_failures >= max) {
            tracing::error!(
                collection = %collection,
                failures = consecutive_failures,
                "Too many consecutive failures, closing directory"
            );
            channels.state.send_replace(SupervisorState::Closed);
            break;
        }
    }

    channels.stats.send_modify(|stats| stats.stopped = true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_store::{MemoryStore, RecordId};
    use docsync_watch::{FileEvent, WatchEventSender};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::fs;
    use std::path::Path;

    fn created(path: PathBuf) -> WatchEvent {
        WatchEvent::File(FileEvent {
            path,
            kind: FileEventKind::Created,
        })
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    async fn attached(
        store: &Arc<MemoryStore>,
        dir: &Path,
        options: SupervisorOptions,
    ) -> (FolderSupervisor, WatchEventSender) {
        store.connect().await.unwrap();
        let (tx, rx) = WatchEventReceiver::channel();
        let mut supervisor = FolderSupervisor::new(
            WatchBinding::new("items", dir),
            Arc::<MemoryStore>::clone(&store),
        )
        .with_options(options);
        supervisor.attach(rx, WatchHandle::detached());
        (supervisor, tx)
    }

    #[tokio::test]
    async fn test_initial_files_are_synced_before_ready() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let alpha = dir.path().join("alpha.json");
        fs::write(&alpha, r#"{"name":"Alpha"}"#).unwrap();
        let (supervisor, tx) = attached(&store, dir.path(), SupervisorOptions::default()).await;

        tx.send(created(alpha.clone())).unwrap();
        tx.send(WatchEvent::Ready).unwrap();
        let stats = supervisor.wait_initial_sync().await;

        assert_eq!(
            stats,
            SyncStats {
                synced: 1,
                initial_sync_complete: true,
                ..SyncStats::default()
            }
        );
        assert_eq!(
            store.record("items", "alpha").map(|r| r.id),
            Some(RecordId::new("id-1"))
        );
        assert_eq!(read_json(&alpha), json!({"name": "Alpha", "_id": "id-1"}));
        assert_eq!(supervisor.state(), SupervisorState::Ready);
    }

    #[tokio::test]
    async fn test_malformed_file_does_not_stop_watch() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        let good = dir.path().join("good.json");
        fs::write(&broken, "{oops").unwrap();
        fs::write(&good, r#"{"ok":true}"#).unwrap();
        let (supervisor, tx) = attached(&store, dir.path(), SupervisorOptions::default()).await;

        tx.send(created(broken)).unwrap();
        tx.send(created(good)).unwrap();
        tx.send(WatchEvent::Ready).unwrap();
        let stats = supervisor.wait_initial_sync().await;

        assert_eq!(stats.synced, 1);
        assert_eq!(stats.failed, 1);
        assert!(!stats.stopped);
        assert_eq!(store.upsert_count(), 1);
        assert_eq!(supervisor.state(), SupervisorState::Ready);
    }

    #[tokio::test]
    async fn test_consecutive_failures_close_directory() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.json", "b.json"] {
            fs::write(dir.path().join(name), "not json").unwrap();
        }
        let options = SupervisorOptions {
            max_consecutive_failures: Some(2),
            ..SupervisorOptions::default()
        };
        let (supervisor, tx) = attached(&store, dir.path(), options).await;

        tx.send(created(dir.path().join("a.json"))).unwrap();
        tx.send(created(dir.path().join("b.json"))).unwrap();
        tx.send(WatchEvent::Ready).unwrap();
        let stats = supervisor.wait_initial_sync().await;

        assert_eq!(stats.failed, 2);
        assert!(stats.stopped);
        assert!(!stats.initial_sync_complete);
        assert_eq!(supervisor.state(), SupervisorState::Closed);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), "not json").unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        fs::write(dir.path().join("c.json"), "not json").unwrap();
        let options = SupervisorOptions {
            max_consecutive_failures: Some(2),
            ..SupervisorOptions::default()
        };
        let (supervisor, tx) = attached(&store, dir.path(), options).await;

        for name in ["a.json", "b.json", "c.json"] {
            tx.send(created(dir.path().join(name))).unwrap();
        }
        tx.send(WatchEvent::Ready).unwrap();
        let stats = supervisor.wait_initial_sync().await;

        assert_eq!(stats.failed, 2);
        assert_eq!(stats.synced, 1);
        assert!(!stats.stopped);
    }

    #[tokio::test]
    async fn test_removal_is_counted() {
        let store = Arc::new(MemoryStore::new().with_record(
            "items",
            "alpha",
            "X1",
            serde_json::Map::new(),
        ));
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, tx) = attached(&store, dir.path(), SupervisorOptions::default()).await;

        tx.send(WatchEvent::File(FileEvent {
            path: dir.path().join("alpha.json"),
            kind: FileEventKind::Removed,
        }))
        .unwrap();
        tx.send(WatchEvent::Ready).unwrap();
        let stats = supervisor.wait_initial_sync().await;

        assert_eq!(stats.removed, 1);
        assert!(store.is_empty("items"));
    }

    #[tokio::test]
    async fn test_shutdown_closes_stream() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let (mut supervisor, tx) =
            attached(&store, dir.path(), SupervisorOptions::default()).await;
        let mut states = supervisor.subscribe();

        supervisor.shutdown().await;

        assert_eq!(supervisor.state(), SupervisorState::Closed);
        assert!(supervisor.stats().stopped);
        assert!(tx.send(WatchEvent::Ready).is_err());
        assert!(states.has_changed().unwrap());
        // Shutdown leaves the shared connection to its owner.
        assert!(store.is_connected());
    }

    #[tokio::test]
    async fn test_shutdown_idle_supervisor() {
        let store = Arc::new(MemoryStore::new());
        let mut supervisor = FolderSupervisor::new(WatchBinding::new("items", "/tmp"), store);

        supervisor.shutdown().await;

        assert_eq!(supervisor.state(), SupervisorState::Closed);
    }

    #[tokio::test]
    async fn test_start_syncs_existing_files() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("alpha.json"), r#"{"name":"Alpha"}"#).unwrap();
        fs::write(dir.path().join(".hidden.json"), r#"{"name":"Hidden"}"#).unwrap();
        let mut supervisor = FolderSupervisor::new(
            WatchBinding::new("items", dir.path()),
            Arc::<MemoryStore>::clone(&store),
        );

        supervisor.start().await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Ready);
        let stats = supervisor.wait_initial_sync().await;
        supervisor.shutdown().await;

        assert_eq!(stats.synced, 1);
        assert_eq!(store.len("items"), 1);
        assert!(store.record("items", "alpha").is_some());
        assert_eq!(store.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_start_missing_dir_is_watch_error() {
        let store = Arc::new(MemoryStore::new());
        let mut supervisor = FolderSupervisor::new(
            WatchBinding::new("items", "/nonexistent/docsync/items"),
            store,
        );

        let err = supervisor.start().await.unwrap_err();

        assert!(matches!(err, StartupError::Watch { .. }));
        assert_eq!(supervisor.state(), SupervisorState::Closed);
    }

    #[tokio::test]
    async fn test_start_refused_connection() {
        let store = Arc::new(MemoryStore::new().with_refused_connection());
        let dir = tempfile::tempdir().unwrap();
        let mut supervisor = FolderSupervisor::new(WatchBinding::new("items", dir.path()), store);

        let err = supervisor.start().await.unwrap_err();

        assert!(matches!(err, StartupError::Connect(_)));
        assert_eq!(supervisor.state(), SupervisorState::Closed);
    }
}
