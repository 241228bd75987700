//! Translation of file events into database operations.

use std::path::Path;
use std::sync::Arc;

use docsync_store::{DocumentStore, RecordId, UpsertOutcome, replacement_payload};
use docsync_watch::{FileEvent, FileEventKind};

use crate::document::{file_name_for, read_document};
use crate::error::SyncError;
use crate::reconcile::IdentifierReconciler;

/// Result of syncing one file event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The file's content was upserted.
    Upserted {
        /// Lookup key.
        key: String,
        /// What the store reported.
        upsert: UpsertOutcome,
        /// Identifier written back to the file, if reconciliation ran.
        reconciled_id: Option<RecordId>,
    },
    /// The file's record was deleted.
    Removed {
        /// Lookup key.
        key: String,
        /// Whether a record existed.
        existed: bool,
    },
}

/// Syncs the files of one directory into one collection.
///
/// Cheap to clone; all clones share the store.
#[derive(Clone)]
pub struct FileSyncAdapter {
    collection: String,
    store: Arc<dyn DocumentStore>,
    reconciler: IdentifierReconciler,
}

impl FileSyncAdapter {
    /// Create an adapter writing into `collection`.
    #[must_use]
    pub fn new(collection: impl Into<String>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            collection: collection.into(),
            reconciler: IdentifierReconciler::new(Arc::clone(&store)),
            store,
        }
    }

    /// Target collection.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Sync a newly created file.
    pub async fn on_file_added(&self, path: &Path) -> Result<SyncOutcome, SyncError> {
        self.upsert_file(path).await
    }

    /// Sync a modified file.
    pub async fn on_file_changed(&self, path: &Path) -> Result<SyncOutcome, SyncError> {
        self.upsert_file(path).await
    }

    /// Delete the record of a removed file. A missing record is not an error.
    pub async fn on_file_removed(&self, path: &Path) -> Result<SyncOutcome, SyncError> {
        let key = file_name_for(path)?;
        let existed = self
            .store
            .delete(&self.collection, &key)
            .await
            .map_err(|source| self.store_error(&key, source))?;

        if existed {
            tracing::info!(collection = %self.collection, file_name = %key, "Deleted record");
        } else {
            tracing::debug!(collection = %self.collection, file_name = %key, "No record to delete");
        }
        Ok(SyncOutcome::Removed { key, existed })
    }

    /// Dispatch a file event to the matching operation.
    pub async fn handle(&self, event: &FileEvent) -> Result<SyncOutcome, SyncError> {
        match event.kind {
            FileEventKind::Created => self.on_file_added(&event.path).await,
            FileEventKind::Modified => self.on_file_changed(&event.path).await,
            FileEventKind::Removed => self.on_file_removed(&event.path).await,
        }
    }

    /// Handle an event, logging any failure instead of returning it.
    ///
    /// Returns `true` on success.
    pub async fn process(&self, event: &FileEvent) -> bool {
        match self.handle(event).await {
            Ok(_) => true,
            Err(e) if e.is_parse_error() => {
                tracing::warn!(collection = %self.collection, error = %e, "Skipping malformed file");
                false
            }
            Err(e) => {
                tracing::error!(collection = %self.collection, error = %e, "Failed to sync file");
                false
            }
        }
    }

    /// Upsert a file's content and reconcile its identifier if needed.
    ///
    /// Reconciliation runs when the file has no `_id`, or when the upsert
    /// inserted a fresh record whose id differs from the one on disk (the
    /// old record was deleted out from under the file).
    async fn upsert_file(&self, path: &Path) -> Result<SyncOutcome, SyncError> {
        let key = file_name_for(path)?;
        let document = read_document(path)?;
        let file_id = RecordId::from_document(&document);

        let upsert = self
            .store
            .upsert(&self.collection, &key, &replacement_payload(&document))
            .await
            .map_err(|source| self.store_error(&key, source))?;
        tracing::info!(
            collection = %self.collection,
            file_name = %key,
            matched = upsert.matched,
            modified = upsert.modified,
            "Synced file"
        );

        let stale = upsert
            .upserted_id
            .as_ref()
            .is_some_and(|id| file_id.as_ref() != Some(id));
        let reconciled_id = if file_id.is_none() || stale {
            let id = self
                .reconciler
                .reconcile(&self.collection, &key, path, document, &upsert)
                .await?;
            Some(id)
        } else {
            None
        };

        Ok(SyncOutcome::Upserted {
            key,
            upsert,
            reconciled_id,
        })
    }

    fn store_error(&self, key: &str, source: docsync_store::StoreError) -> SyncError {
        SyncError::Store {
            collection: self.collection.clone(),
            key: key.to_owned(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_store::{Document, MemoryStore, StoreCall};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::fs;
    use std::path::PathBuf;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    async fn setup(store: MemoryStore) -> (Arc<MemoryStore>, FileSyncAdapter, tempfile::TempDir) {
        store.connect().await.unwrap();
        let store = Arc::new(store);
        let adapter = FileSyncAdapter::new("items", Arc::<MemoryStore>::clone(&store));
        (store, adapter, tempfile::tempdir().unwrap())
    }

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_added_file_is_inserted_and_reconciled() {
        let (store, adapter, dir) = setup(MemoryStore::new()).await;
        let path = write(&dir, "alpha.json", r#"{"name":"Alpha"}"#);

        let outcome = adapter.on_file_added(&path).await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Upserted {
                key: "alpha".to_owned(),
                upsert: UpsertOutcome::inserted(RecordId::new("id-1")),
                reconciled_id: Some(RecordId::new("id-1")),
            }
        );
        assert_eq!(
            store.calls(),
            vec![StoreCall::Upsert {
                collection: "items".to_owned(),
                key: "alpha".to_owned(),
                payload: doc(json!({"name": "Alpha"})),
            }]
        );
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{\n  \"name\": \"Alpha\",\n  \"_id\": \"id-1\"\n}"
        );
    }

    #[tokio::test]
    async fn test_change_after_write_back_does_not_reconcile() {
        let (store, adapter, dir) = setup(MemoryStore::new()).await;
        let path = write(&dir, "alpha.json", r#"{"name":"Alpha"}"#);
        adapter.on_file_added(&path).await.unwrap();

        let outcome = adapter.on_file_changed(&path).await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Upserted {
                key: "alpha".to_owned(),
                upsert: UpsertOutcome::updated(false),
                reconciled_id: None,
            }
        );
        let calls = store.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1],
            StoreCall::Upsert {
                collection: "items".to_owned(),
                key: "alpha".to_owned(),
                payload: doc(json!({"name": "Alpha"})),
            }
        );
        assert_eq!(read_json(&path), json!({"name": "Alpha", "_id": "id-1"}));
    }

    #[tokio::test]
    async fn test_hand_edited_file_without_id_refetches() {
        let (store, adapter, dir) = setup(MemoryStore::new().with_record(
            "items",
            "alpha",
            "X9",
            doc(json!({"name": "Old"})),
        ))
        .await;
        let path = write(&dir, "alpha.json", r#"{"name":"New"}"#);

        let outcome = adapter.on_file_changed(&path).await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Upserted {
                key: "alpha".to_owned(),
                upsert: UpsertOutcome::updated(true),
                reconciled_id: Some(RecordId::new("X9")),
            }
        );
        assert_eq!(read_json(&path), json!({"name": "New", "_id": "X9"}));
        assert!(matches!(store.calls().last(), Some(StoreCall::Find { .. })));
    }

    #[tokio::test]
    async fn test_stale_id_is_replaced_after_reinsert() {
        let (_store, adapter, dir) = setup(MemoryStore::new()).await;
        let path = write(&dir, "alpha.json", r#"{"name":"Alpha","_id":"gone"}"#);

        let outcome = adapter.on_file_changed(&path).await.unwrap();

        assert!(matches!(
            outcome,
            SyncOutcome::Upserted {
                reconciled_id: Some(_),
                ..
            }
        ));
        assert_eq!(read_json(&path), json!({"name": "Alpha", "_id": "id-1"}));
    }

    #[tokio::test]
    async fn test_malformed_file_is_parse_error_without_mutation() {
        let (store, adapter, dir) = setup(MemoryStore::new()).await;
        let path = write(&dir, "broken.json", "{\"name\": ");

        let err = adapter.on_file_added(&path).await.unwrap_err();

        assert!(err.is_parse_error());
        assert!(store.calls().is_empty());
        assert!(!adapter.process(&FileEvent {
            path,
            kind: FileEventKind::Created,
        })
        .await);
    }

    #[tokio::test]
    async fn test_removed_file_deletes_record() {
        let (store, adapter, dir) = setup(MemoryStore::new().with_record(
            "items",
            "alpha",
            "X1",
            doc(json!({"name": "Alpha"})),
        ))
        .await;

        let outcome = adapter
            .on_file_removed(&dir.path().join("alpha.json"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Removed {
                key: "alpha".to_owned(),
                existed: true,
            }
        );
        assert!(store.is_empty("items"));
    }

    #[tokio::test]
    async fn test_removing_unknown_file_is_noop() {
        let (_store, adapter, dir) = setup(MemoryStore::new()).await;

        let outcome = adapter
            .on_file_removed(&dir.path().join("ghost.json"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Removed {
                key: "ghost".to_owned(),
                existed: false,
            }
        );
    }

    #[tokio::test]
    async fn test_vanished_record_is_reconcile_error() {
        let (_store, adapter, dir) = setup(
            MemoryStore::new()
                .with_record("items", "alpha", "X1", doc(json!({"name": "Old"})))
                .with_vanishing_key("alpha"),
        )
        .await;
        let path = write(&dir, "alpha.json", r#"{"name":"New"}"#);

        let err = adapter.on_file_changed(&path).await.unwrap_err();

        assert!(matches!(err, SyncError::Reconcile(_)));
        assert_eq!(read_json(&path), json!({"name": "New"}));
    }

    #[tokio::test]
    async fn test_store_failure_is_sync_error() {
        let (_store, adapter, dir) = setup(MemoryStore::new().with_failing_key("alpha")).await;
        let path = write(&dir, "alpha.json", r#"{"name":"Alpha"}"#);

        let err = adapter.on_file_added(&path).await.unwrap_err();

        assert!(matches!(err, SyncError::Store { .. }));
        assert_eq!(read_json(&path), json!({"name": "Alpha"}));
    }

    #[tokio::test]
    async fn test_handle_dispatches_by_kind() {
        let (store, adapter, dir) = setup(MemoryStore::new()).await;
        let path = write(&dir, "alpha.json", r#"{"name":"Alpha"}"#);

        assert!(
            adapter
                .process(&FileEvent {
                    path: path.clone(),
                    kind: FileEventKind::Created,
                })
                .await
        );
        assert_eq!(store.len("items"), 1);

        assert!(
            adapter
                .process(&FileEvent {
                    path,
                    kind: FileEventKind::Removed,
                })
                .await
        );
        assert!(store.is_empty("items"));
    }
}
