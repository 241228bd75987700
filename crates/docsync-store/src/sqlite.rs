//! `SQLite` document store backed by a single `sqlx` pool.

use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::store::{
    Document, DocumentStore, Record, RecordId, StoreError, UpsertOutcome, replacement_payload,
};

/// Backend identifier for error messages.
const BACKEND: &str = "Sqlite";

/// Default pool size.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

const CREATE_RECORDS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY NOT NULL,
    collection TEXT NOT NULL,
    file_name TEXT NOT NULL,
    body TEXT NOT NULL,
    UNIQUE (collection, file_name)
)";

/// `SQLite` document store.
///
/// All collections share one `records` table keyed by
/// `(collection, file_name)`. Record bodies are stored as JSON text in the
/// field order of the source document, so an unchanged file produces a
/// byte-identical body and the upsert reports no modification.
///
/// # Example
///
/// ```ignore
/// use docsync_store::{DocumentStore, SqliteStore};
///
/// let store = SqliteStore::new("sqlite://docsync.db").with_max_connections(1);
/// store.connect().await?;
/// ```
pub struct SqliteStore {
    url: String,
    max_connections: u32,
    pool: RwLock<Option<SqlitePool>>,
}

impl SqliteStore {
    /// Create a store for the given connection string.
    ///
    /// Nothing is opened until [`DocumentStore::connect`] is called. The
    /// database file is created if it does not exist.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            pool: RwLock::new(None),
        }
    }

    /// Set the maximum number of pooled connections.
    #[must_use]
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Clone the live pool handle, or fail if not connected.
    fn pool(&self) -> Result<SqlitePool, StoreError> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StoreError::NotConnected { backend: BACKEND })
    }
}

fn query_error(e: sqlx::Error) -> StoreError {
    StoreError::query(BACKEND, e)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn connect(&self) -> Result<(), StoreError> {
        if self.pool().is_ok() {
            tracing::debug!("Already connected");
            return Ok(());
        }

        let options = SqliteConnectOptions::from_str(&self.url)
            .map_err(|e| StoreError::connection(BACKEND, e))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::connection(BACKEND, e))?;

        sqlx::query(CREATE_RECORDS_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::connection(BACKEND, e))?;

        let previous = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(pool);
        if let Some(previous) = previous {
            // Lost a race with a concurrent connect(); keep the newer pool.
            previous.close().await;
        }

        tracing::info!("Connected to database");
        Ok(())
    }

    async fn disconnect(&self) {
        let pool = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pool) = pool {
            pool.close().await;
            tracing::info!("Disconnected from database");
        }
    }

    async fn upsert(
        &self,
        collection: &str,
        key: &str,
        document: &Document,
    ) -> Result<UpsertOutcome, StoreError> {
        let pool = self.pool()?;
        let body = serde_json::to_string(&replacement_payload(document))?;

        let updated = sqlx::query(
            "UPDATE records SET body = ? WHERE collection = ? AND file_name = ? AND body <> ?",
        )
        .bind(&body)
        .bind(collection)
        .bind(key)
        .bind(&body)
        .execute(&pool)
        .await
        .map_err(query_error)?;
        if updated.rows_affected() > 0 {
            return Ok(UpsertOutcome::updated(true));
        }

        let id = RecordId::generate();
        let inserted = sqlx::query(
            "INSERT INTO records (id, collection, file_name, body) VALUES (?, ?, ?, ?) \
             ON CONFLICT (collection, file_name) DO NOTHING",
        )
        .bind(id.as_str())
        .bind(collection)
        .bind(key)
        .bind(&body)
        .execute(&pool)
        .await
        .map_err(query_error)?;

        if inserted.rows_affected() > 0 {
            Ok(UpsertOutcome::inserted(id))
        } else {
            Ok(UpsertOutcome::updated(false))
        }
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        let pool = self.pool()?;
        let result = sqlx::query("DELETE FROM records WHERE collection = ? AND file_name = ?")
            .bind(collection)
            .bind(key)
            .execute(&pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_key(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Record>, StoreError> {
        let pool = self.pool()?;
        let row = sqlx::query("SELECT id, body FROM records WHERE collection = ? AND file_name = ?")
            .bind(collection)
            .bind(key)
            .fetch_optional(&pool)
            .await
            .map_err(query_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: String = row.try_get("id").map_err(query_error)?;
        let body: String = row.try_get("body").map_err(query_error)?;

        Ok(Some(Record {
            id: RecordId::new(id),
            file_name: key.to_owned(),
            fields: serde_json::from_str(&body)?,
        }))
    }
}
