//! Document store trait, record types, and error types.
//!
//! Provides the core [`DocumentStore`] trait for the database gateway, along
//! with [`StoreError`] for unified error handling across backends.
//!
//! # Lookup Keys
//!
//! Every record carries a lookup key (stored under [`KEY_FIELD`]) equal to the
//! base name of the file it mirrors. Operations address records by
//! `(collection, key)`, never by [`RecordId`]; the id is assigned by the store
//! on first insert and never supplied by the caller.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON object as read from a source file.
pub type Document = serde_json::Map<String, Value>;

/// Field holding the database-assigned identifier in a rendered document.
pub const ID_FIELD: &str = "_id";

/// Field holding the lookup key in a rendered document.
pub const KEY_FIELD: &str = "fileName";

/// Boxed error source from a backend driver.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Database-assigned record identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier for an inserted record.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read an identifier from a document's `_id` field.
    ///
    /// Returns `None` when the field is absent, null, or an empty string.
    /// Non-string values are rendered as their JSON text.
    #[must_use]
    pub fn from_document(document: &Document) -> Option<Self> {
        match document.get(ID_FIELD)? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(Self(s.clone())),
            other => Some(Self(other.to_string())),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<RecordId> for Value {
    fn from(id: RecordId) -> Self {
        Value::String(id.0)
    }
}

/// Result of an upsert.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// A record with the lookup key already existed.
    pub matched: bool,
    /// The existing record's fields changed.
    pub modified: bool,
    /// Identifier assigned when the upsert inserted a new record.
    pub upserted_id: Option<RecordId>,
}

impl UpsertOutcome {
    /// Outcome for a freshly inserted record.
    #[must_use]
    pub fn inserted(id: RecordId) -> Self {
        Self {
            matched: false,
            modified: false,
            upserted_id: Some(id),
        }
    }

    /// Outcome for an existing record, changed or not.
    #[must_use]
    pub fn updated(modified: bool) -> Self {
        Self {
            matched: true,
            modified,
            upserted_id: None,
        }
    }
}

/// A stored record.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Database-assigned identifier.
    pub id: RecordId,
    /// Lookup key (source file base name).
    pub file_name: String,
    /// Replacement payload last written for this key.
    pub fields: Document,
}

impl Record {
    /// Render the record as a single JSON object.
    ///
    /// The stored fields come first, followed by [`KEY_FIELD`] and [`ID_FIELD`].
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut document = self.fields.clone();
        document.insert(KEY_FIELD.to_owned(), Value::String(self.file_name.clone()));
        document.insert(ID_FIELD.to_owned(), self.id.clone().into());
        document
    }
}

/// Build the replacement payload for an upsert.
///
/// Drops [`ID_FIELD`] (identifiers are never client-supplied) and
/// [`KEY_FIELD`] (the lookup key is stored separately and always equals the
/// key passed to the store).
#[must_use]
pub fn replacement_payload(document: &Document) -> Document {
    document
        .iter()
        .filter(|(name, _)| name.as_str() != ID_FIELD && name.as_str() != KEY_FIELD)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Store error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An operation ran before `connect()` or after `disconnect()`.
    #[error("[{backend}] Not connected")]
    NotConnected {
        /// Backend identifier (e.g., "Sqlite", "Memory").
        backend: &'static str,
    },
    /// The endpoint was unreachable or rejected the connection.
    #[error("[{backend}] Connection failed: {source}")]
    Connection {
        /// Backend identifier.
        backend: &'static str,
        /// Driver error.
        #[source]
        source: BoxError,
    },
    /// A query failed after the connection was established.
    #[error("[{backend}] Query failed: {source}")]
    Query {
        /// Backend identifier.
        backend: &'static str,
        /// Driver error.
        #[source]
        source: BoxError,
    },
    /// A stored body could not be encoded or decoded.
    #[error("Invalid record body: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create a connection error.
    #[must_use]
    pub fn connection(
        backend: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            backend,
            source: Box::new(source),
        }
    }

    /// Create a query error.
    #[must_use]
    pub fn query(
        backend: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Query {
            backend,
            source: Box::new(source),
        }
    }
}

/// Database gateway for mirrored records.
///
/// One instance owns one connection (or pool) and is shared by every watched
/// directory as `Arc<dyn DocumentStore>`. Implementations must be safe to call
/// concurrently; no locking is done above this trait.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Establish the connection.
    ///
    /// Must complete before any other operation. Calling it again on a
    /// connected store is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the endpoint is unreachable or
    /// the credentials are rejected.
    async fn connect(&self) -> Result<(), StoreError>;

    /// Release the connection.
    ///
    /// Idempotent. Failures are logged, never returned, so shutdown always
    /// proceeds.
    async fn disconnect(&self);

    /// Replace (or insert) the record whose lookup key equals `key`.
    ///
    /// The stored fields become [`replacement_payload`] of `document`.
    /// An unchanged payload reports `matched` without `modified`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store is disconnected or the write fails.
    async fn upsert(
        &self,
        collection: &str,
        key: &str,
        document: &Document,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Remove the record with the given lookup key.
    ///
    /// Returns whether a record was removed; an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store is disconnected or the delete fails.
    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError>;

    /// Fetch the current record for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store is disconnected or the read fails.
    async fn find_by_key(&self, collection: &str, key: &str)
    -> Result<Option<Record>, StoreError>;
}
