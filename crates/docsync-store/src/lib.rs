//! Document store abstraction for docsync.
//!
//! This crate provides a [`DocumentStore`] trait for the database side of the
//! file-to-record mirror. Records live in named collections and are addressed
//! by a lookup key (the source file's base name) independently of their
//! database-assigned [`RecordId`].
//!
//! # Architecture
//!
//! The crate provides:
//! - [`DocumentStore`] trait with `connect()`, `disconnect()`, `upsert()`,
//!   `delete()`, and `find_by_key()` methods
//! - [`SqliteStore`] backend over a single shared `sqlx` pool
//! - [`MemoryStore`] for testing (behind `mock` feature flag)
//!
//! # Example
//!
//! ```ignore
//! use docsync_store::{DocumentStore, SqliteStore};
//!
//! let store = SqliteStore::new("sqlite://docsync.db");
//! store.connect().await?;
//! let outcome = store.upsert("items", "alpha", &document).await?;
//! if let Some(id) = outcome.upserted_id {
//!     println!("inserted alpha as {id}");
//! }
//! store.disconnect().await;
//! ```

#[cfg(feature = "mock")]
mod mock;
mod sqlite;
mod store;

#[cfg(feature = "mock")]
pub use mock::{MemoryStore, StoreCall};
pub use sqlite::SqliteStore;
pub use store::{
    Document, DocumentStore, ID_FIELD, KEY_FIELD, Record, RecordId, StoreError, UpsertOutcome,
    replacement_payload,
};
