//! File-to-database synchronization for docsync.
//!
//! Mirrors directories of JSON files into collections of a
//! [`DocumentStore`](docsync_store::DocumentStore):
//!
//! - [`FileSyncAdapter`] turns one file event into an upsert or delete
//! - [`IdentifierReconciler`] writes database-assigned ids back to files
//! - [`FolderSupervisor`] runs the watch of one directory
//! - [`Orchestrator`] runs one supervisor per subdirectory of a root
//!
//! Per-file failures are logged and never stop a watch. Only
//! [`StartupError`]s are returned to the caller.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use docsync_store::SqliteStore;
//! use docsync_sync::Orchestrator;
//!
//! let store = Arc::new(SqliteStore::new("sqlite://docsync.db"));
//! let summary = Orchestrator::new("data", store).sync_once().await?;
//! println!("synced {} files", summary.synced());
//! ```

mod adapter;
mod document;
mod error;
mod orchestrator;
mod reconcile;
mod supervisor;

pub use adapter::{FileSyncAdapter, SyncOutcome};
pub use error::{ReconcileError, StartupError, SyncError};
pub use orchestrator::{CollectionSummary, Orchestrator, SyncSummary};
pub use reconcile::IdentifierReconciler;
pub use supervisor::{
    FolderSupervisor, SupervisorOptions, SupervisorState, SyncStats, WatchBinding,
};
