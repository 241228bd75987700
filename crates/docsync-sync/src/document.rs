//! Reading and writing source documents.

use std::path::Path;

use docsync_store::Document;
use serde_json::Value;

use crate::error::{ReconcileError, SyncError};

/// Derive the lookup key for a file: its base name without `.json`.
pub fn file_name_for(path: &Path) -> Result<String, SyncError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| SyncError::InvalidPath(path.to_path_buf()))
}

/// Read and parse a source file.
///
/// The content must be a JSON object.
pub fn read_document(path: &Path) -> Result<Document, SyncError> {
    let content = std::fs::read_to_string(path).map_err(|source| SyncError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&content, path)
}

/// Parse file content into a document.
fn parse_document(content: &str, path: &Path) -> Result<Document, SyncError> {
    let value: Value = serde_json::from_str(content).map_err(|source| SyncError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(document) => Ok(document),
        _ => Err(SyncError::NotAnObject(path.to_path_buf())),
    }
}

/// Overwrite a source file with a pretty-printed document (2-space indent).
pub async fn write_document(path: &Path, document: &Document) -> Result<(), ReconcileError> {
    let content =
        serde_json::to_string_pretty(document).map_err(|source| ReconcileError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
    tokio::fs::write(path, content)
        .await
        .map_err(|source| ReconcileError::Write {
            path: path.to_path_buf(),
            source,
        })
}
