//! In-memory document store for testing.
//!
//! Provides [`MemoryStore`] for unit testing without a database.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::store::{
    Document, DocumentStore, Record, RecordId, StoreError, UpsertOutcome, replacement_payload,
};

/// Backend identifier for error messages.
const BACKEND: &str = "Memory";

/// A call recorded by [`MemoryStore`].
#[derive(Clone, Debug, PartialEq)]
pub enum StoreCall {
    /// `upsert(collection, key, document)` with the payload actually stored.
    Upsert {
        /// Collection name.
        collection: String,
        /// Lookup key.
        key: String,
        /// Replacement payload after stripping `_id`/`fileName`.
        payload: Document,
    },
    /// `delete(collection, key)`.
    Delete {
        /// Collection name.
        collection: String,
        /// Lookup key.
        key: String,
    },
    /// `find_by_key(collection, key)`.
    Find {
        /// Collection name.
        collection: String,
        /// Lookup key.
        key: String,
    },
}

#[derive(Debug, Default)]
struct State {
    connected: bool,
    connects: usize,
    disconnects: usize,
    next_id: u64,
    collections: HashMap<String, HashMap<String, (RecordId, Document)>>,
    calls: Vec<StoreCall>,
    refuse_connect: bool,
    failing_keys: HashSet<String>,
    vanishing_keys: HashSet<String>,
}

/// In-memory store for testing.
///
/// Mirrors the upsert/delete/find semantics of the real backends. Ids are
/// assigned sequentially (`id-1`, `id-2`, ...) so tests can assert them.
///
/// # Example
///
/// ```ignore
/// use docsync_store::{DocumentStore, MemoryStore};
///
/// let store = MemoryStore::new().with_failing_key("broken");
/// store.connect().await?;
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create a new empty, disconnected store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a record.
    #[must_use]
    pub fn with_record(
        self,
        collection: &str,
        key: &str,
        id: impl Into<String>,
        fields: Document,
    ) -> Self {
        self.state()
            .collections
            .entry(collection.to_owned())
            .or_default()
            .insert(key.to_owned(), (RecordId::new(id), fields));
        self
    }

    /// Make `connect()` fail as if the endpoint were unreachable.
    #[must_use]
    pub fn with_refused_connection(self) -> Self {
        self.state().refuse_connect = true;
        self
    }

    /// Make every operation on `key` fail with a query error.
    #[must_use]
    pub fn with_failing_key(self, key: &str) -> Self {
        self.state().failing_keys.insert(key.to_owned());
        self
    }

    /// Remove the record for `key` right after each upsert, simulating a
    /// concurrent delete landing between the upsert and a follow-up read.
    #[must_use]
    pub fn with_vanishing_key(self, key: &str) -> Self {
        self.state().vanishing_keys.insert(key.to_owned());
        self
    }

    /// Snapshot of a stored record.
    pub fn record(&self, collection: &str, key: &str) -> Option<Record> {
        let state = self.state();
        let (id, fields) = state.collections.get(collection)?.get(key)?;
        Some(Record {
            id: id.clone(),
            file_name: key.to_owned(),
            fields: fields.clone(),
        })
    }

    /// Number of records in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.state()
            .collections
            .get(collection)
            .map_or(0, HashMap::len)
    }

    /// Whether a collection holds no records.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    /// Number of upsert calls made so far.
    pub fn upsert_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, StoreCall::Upsert { .. }))
            .count()
    }

    /// Whether the store is currently connected.
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Number of successful `connect()` calls.
    pub fn connect_count(&self) -> usize {
        self.state().connects
    }

    /// Number of `disconnect()` calls that released a live connection.
    pub fn disconnect_count(&self) -> usize {
        self.state().disconnects
    }

    /// Check connection and injected failures for an operation on `key`.
    fn check(state: &State, key: &str) -> Result<(), StoreError> {
        if !state.connected {
            return Err(StoreError::NotConnected { backend: BACKEND });
        }
        if state.failing_keys.contains(key) {
            return Err(StoreError::query(
                BACKEND,
                io::Error::other(format!("injected failure for {key}")),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn connect(&self) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.refuse_connect {
            return Err(StoreError::connection(
                BACKEND,
                io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            ));
        }
        if !state.connected {
            state.connected = true;
            state.connects += 1;
        }
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.state();
        if state.connected {
            state.connected = false;
            state.disconnects += 1;
        }
    }

    async fn upsert(
        &self,
        collection: &str,
        key: &str,
        document: &Document,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.state();
        Self::check(&state, key)?;

        let payload = replacement_payload(document);
        state.calls.push(StoreCall::Upsert {
            collection: collection.to_owned(),
            key: key.to_owned(),
            payload: payload.clone(),
        });

        let next_id = state.next_id + 1;
        let fresh_id = RecordId::new(format!("id-{next_id}"));
        let records = state.collections.entry(collection.to_owned()).or_default();
        let outcome = match records.entry(key.to_owned()) {
            Entry::Occupied(mut entry) => {
                let (_, fields) = entry.get_mut();
                if *fields == payload {
                    UpsertOutcome::updated(false)
                } else {
                    *fields = payload;
                    UpsertOutcome::updated(true)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert((fresh_id.clone(), payload));
                UpsertOutcome::inserted(fresh_id)
            }
        };

        if outcome.upserted_id.is_some() {
            state.next_id = next_id;
        }
        if state.vanishing_keys.contains(key)
            && let Some(records) = state.collections.get_mut(collection)
        {
            records.remove(key);
        }

        Ok(outcome)
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        let mut state = self.state();
        Self::check(&state, key)?;
        state.calls.push(StoreCall::Delete {
            collection: collection.to_owned(),
            key: key.to_owned(),
        });
        Ok(state
            .collections
            .get_mut(collection)
            .is_some_and(|records| records.remove(key).is_some()))
    }

    async fn find_by_key(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Record>, StoreError> {
        {
            let mut state = self.state();
            Self::check(&state, key)?;
            state.calls.push(StoreCall::Find {
                collection: collection.to_owned(),
                key: key.to_owned(),
            });
        }
        Ok(self.record(collection, key))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::*;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_upsert_assigns_sequential_ids() {
        let store = MemoryStore::new();
        store.connect().await.unwrap();

        let a = store.upsert("items", "a", &doc(json!({"n": 1}))).await.unwrap();
        let b = store.upsert("items", "b", &doc(json!({"n": 2}))).await.unwrap();

        assert_eq!(a.upserted_id, Some(RecordId::new("id-1")));
        assert_eq!(b.upserted_id, Some(RecordId::new("id-2")));
        assert_eq!(store.len("items"), 2);
    }

    #[tokio::test]
    async fn test_upsert_unchanged_reports_not_modified() {
        let store = MemoryStore::new().with_record("items", "a", "X1", doc(json!({"n": 1})));
        store.connect().await.unwrap();

        let outcome = store
            .upsert("items", "a", &doc(json!({"n": 1, "_id": "X1"})))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::updated(false));
        assert_eq!(store.record("items", "a").unwrap().id, RecordId::new("X1"));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let store = MemoryStore::new().with_refused_connection();

        let err = store.connect().await.unwrap_err();

        assert!(matches!(err, StoreError::Connection { .. }));
        assert!(!store.is_connected());
    }

    #[tokio::test]
    async fn test_failing_key() {
        let store = MemoryStore::new().with_failing_key("bad");
        store.connect().await.unwrap();

        assert!(store.delete("items", "bad").await.is_err());
        assert!(store.delete("items", "good").await.is_ok());
    }

    #[tokio::test]
    async fn test_vanishing_key() {
        let store = MemoryStore::new().with_vanishing_key("a");
        store.connect().await.unwrap();

        store.upsert("items", "a", &doc(json!({"n": 1}))).await.unwrap();

        assert!(store.find_by_key("items", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_counts_once() {
        let store = MemoryStore::new();
        store.connect().await.unwrap();

        store.disconnect().await;
        store.disconnect().await;

        assert_eq!(store.connect_count(), 1);
        assert_eq!(store.disconnect_count(), 1);
    }
}
