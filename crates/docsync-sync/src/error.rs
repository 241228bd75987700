//! Error types for synchronization.
//!
//! Per-file errors ([`SyncError`], [`ReconcileError`]) are logged by the
//! supervisor and never end a watch. Only [`StartupError`] is fatal.

use std::path::PathBuf;

use docsync_store::StoreError;
use docsync_watch::WatchError;

/// Failure to sync one file.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The path has no usable base name.
    #[error("Cannot derive a file name from {}", .0.display())]
    InvalidPath(PathBuf),
    /// The file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// Source file.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid JSON.
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        /// Source file.
        path: PathBuf,
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The file is valid JSON but not an object.
    #[error("Expected a JSON object in {}", .0.display())]
    NotAnObject(PathBuf),
    /// The database operation failed.
    #[error("Database operation failed for {collection}/{key}: {source}")]
    Store {
        /// Collection name.
        collection: String,
        /// Lookup key.
        key: String,
        /// Store error.
        #[source]
        source: StoreError,
    },
    /// The record was synced but its identifier could not be written back.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

impl SyncError {
    /// Whether the file content itself is at fault (as opposed to I/O or the
    /// database).
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::NotAnObject(_))
    }
}

/// Failure to write a database-assigned identifier back to its file.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Re-fetching the record failed.
    #[error("Failed to look up {collection}/{key}: {source}")]
    Lookup {
        /// Collection name.
        collection: String,
        /// Lookup key.
        key: String,
        /// Store error.
        #[source]
        source: StoreError,
    },
    /// The record disappeared between the upsert and the re-fetch.
    #[error("Record {collection}/{key} vanished before its id could be read")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Lookup key.
        key: String,
    },
    /// The document could not be rendered.
    #[error("Failed to render {}: {source}", path.display())]
    Serialize {
        /// Source file.
        path: PathBuf,
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The file could not be rewritten.
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        /// Source file.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Failure that prevents watching from starting at all.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The initial database connection failed.
    #[error("Failed to connect to database: {0}")]
    Connect(#[source] StoreError),
    /// The root data directory could not be listed.
    #[error("Failed to read data directory {}: {source}", path.display())]
    ReadRoot {
        /// Root data directory.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A single-directory watch could not be established.
    #[error("Failed to watch {collection}: {source}")]
    Watch {
        /// Collection name.
        collection: String,
        /// Watch error.
        #[source]
        source: WatchError,
    },
}
