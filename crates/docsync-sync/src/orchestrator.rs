//! Multi-directory orchestration.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use docsync_store::DocumentStore;
use docsync_watch::scan_subdirectories;
use futures::future::join_all;

use crate::error::StartupError;
use crate::supervisor::{FolderSupervisor, SupervisorOptions, SyncStats, WatchBinding};

/// Final counters of one collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionSummary {
    /// Collection name.
    pub collection: String,
    /// Counters at shutdown.
    pub stats: SyncStats,
}

/// Final counters of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Per-collection counters, sorted by collection name.
    pub collections: Vec<CollectionSummary>,
}

impl SyncSummary {
    /// Total files upserted.
    #[must_use]
    pub fn synced(&self) -> usize {
        self.collections.iter().map(|c| c.stats.synced).sum()
    }

    /// Total removals applied.
    #[must_use]
    pub fn removed(&self) -> usize {
        self.collections.iter().map(|c| c.stats.removed).sum()
    }

    /// Total failed events.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.collections.iter().map(|c| c.stats.failed).sum()
    }
}

/// Watches every subdirectory of a root data directory.
///
/// Each subdirectory becomes a collection of the same name. The orchestrator
/// owns the store: it connects once before any watch starts and disconnects
/// once after all of them stopped.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use docsync_store::SqliteStore;
/// use docsync_sync::Orchestrator;
///
/// let store = Arc::new(SqliteStore::new("sqlite://docsync.db"));
/// let summary = Orchestrator::new("data", store)
///     .run(async { tokio::signal::ctrl_c().await.ok(); })
///     .await?;
/// ```
pub struct Orchestrator {
    root: PathBuf,
    store: Arc<dyn DocumentStore>,
    options: SupervisorOptions,
}

impl Orchestrator {
    /// Create an orchestrator over `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            root: root.into(),
            store,
            options: SupervisorOptions::default(),
        }
    }

    /// Set options applied to every supervisor.
    #[must_use]
    pub fn with_options(mut self, options: SupervisorOptions) -> Self {
        self.options = options;
        self
    }

    /// List the directories to watch, sorted by collection name.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::ReadRoot`] if the root cannot be listed.
    pub fn discover(&self) -> Result<Vec<WatchBinding>, StartupError> {
        let dirs = scan_subdirectories(&self.root).map_err(|source| StartupError::ReadRoot {
            path: self.root.clone(),
            source,
        })?;
        Ok(dirs
            .into_iter()
            .map(|(collection, dir)| WatchBinding::new(collection, dir))
            .collect())
    }

    /// Watch until `shutdown` resolves, then stop every watch and disconnect.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] if the store cannot be connected or the root
    /// cannot be listed. Per-file failures are only logged.
    pub async fn run(
        &self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<SyncSummary, StartupError> {
        let mut supervisors = self.start().await?;
        tracing::info!(collections = supervisors.len(), "Watching for changes");

        shutdown.await;
        tracing::info!("Shutting down");
        Ok(self.stop(&mut supervisors).await)
    }

    /// Sync every file once, then stop.
    ///
    /// Waits for each directory's initial scan to be fully processed.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn sync_once(&self) -> Result<SyncSummary, StartupError> {
        let mut supervisors = self.start().await?;
        join_all(supervisors.iter().map(FolderSupervisor::wait_initial_sync)).await;
        Ok(self.stop(&mut supervisors).await)
    }

    /// Connect and start one supervisor per subdirectory.
    async fn start(&self) -> Result<Vec<FolderSupervisor>, StartupError> {
        if let Err(e) = self.store.connect().await {
            self.store.disconnect().await;
            return Err(StartupError::Connect(e));
        }
        tracing::debug!("Connected to database");

        match self.discover() {
            Ok(bindings) => Ok(self.start_supervisors(bindings).await),
            Err(e) => {
                self.store.disconnect().await;
                Err(e)
            }
        }
    }

    /// Start one supervisor per binding, concurrently.
    ///
    /// A directory whose watch cannot be established is logged and skipped.
    async fn start_supervisors(&self, bindings: Vec<WatchBinding>) -> Vec<FolderSupervisor> {
        let mut supervisors: Vec<FolderSupervisor> = bindings
            .into_iter()
            .map(|binding| {
                FolderSupervisor::new(binding, Arc::clone(&self.store))
                    .with_options(self.options.clone())
            })
            .collect();
        let results = join_all(supervisors.iter_mut().map(FolderSupervisor::start)).await;

        supervisors
            .into_iter()
            .zip(results)
            .filter_map(|(supervisor, result)| match result {
                Ok(()) => Some(supervisor),
                Err(e) => {
                    tracing::error!(
                        collection = %supervisor.binding().collection,
                        error = %e,
                        "Failed to start watch"
                    );
                    None
                }
            })
            .collect()
    }

    async fn stop(&self, supervisors: &mut [FolderSupervisor]) -> SyncSummary {
        join_all(supervisors.iter_mut().map(FolderSupervisor::shutdown)).await;
        self.store.disconnect().await;
        tracing::debug!("Disconnected from database");

        SyncSummary {
            collections: supervisors
                .iter()
                .map(|supervisor| CollectionSummary {
                    collection: supervisor.binding().collection.clone(),
                    stats: supervisor.stats(),
                })
                .collect(),
        }
    }
}
