//! Identifier write-back.
//!
//! After an upsert, a source file that has no `_id` (or a stale one) is
//! rewritten with the record's database-assigned identifier so file and
//! record converge on the same id.

use std::path::Path;
use std::sync::Arc;

use docsync_store::{Document, DocumentStore, ID_FIELD, RecordId, UpsertOutcome};

use crate::document::write_document;
use crate::error::ReconcileError;

/// Writes database-assigned identifiers back to source files.
#[derive(Clone)]
pub struct IdentifierReconciler {
    store: Arc<dyn DocumentStore>,
}

impl IdentifierReconciler {
    /// Create a reconciler over the shared store.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Resolve the record's identifier and persist it into `path`.
    ///
    /// Uses the id reported by the upsert when it inserted; otherwise the
    /// record is re-fetched by key. `document` is the parsed file content and
    /// is written back in full with `_id` set.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NotFound`] if the record was deleted before
    /// it could be re-fetched, or another [`ReconcileError`] if the lookup or
    /// the file write fails.
    pub async fn reconcile(
        &self,
        collection: &str,
        key: &str,
        path: &Path,
        mut document: Document,
        outcome: &UpsertOutcome,
    ) -> Result<RecordId, ReconcileError> {
        let id = match &outcome.upserted_id {
            Some(id) => id.clone(),
            None => self.lookup_id(collection, key).await?,
        };

        document.insert(ID_FIELD.to_owned(), id.clone().into());
        write_document(path, &document).await?;

        tracing::info!(collection, file_name = key, id = %id, "Wrote record id back to file");
        Ok(id)
    }

    async fn lookup_id(&self, collection: &str, key: &str) -> Result<RecordId, ReconcileError> {
        let record = self
            .store
            .find_by_key(collection, key)
            .await
            .map_err(|source| ReconcileError::Lookup {
                collection: collection.to_owned(),
                key: key.to_owned(),
                source,
            })?;
        record
            .map(|record| record.id)
            .ok_or_else(|| ReconcileError::NotFound {
                collection: collection.to_owned(),
                key: key.to_owned(),
            })
    }
}
