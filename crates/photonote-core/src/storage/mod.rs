//! Durable storage for session records and preview images.

mod catalog;
mod file;
mod memory;

pub use catalog::{PreviewUpdate, SessionCatalog};
pub(crate) use catalog::validate_name;
pub use file::{FilePreviewStore, FileSessionStorage};
pub use memory::{MemoryPreviewStore, MemorySessionStorage};

use crate::config::EngineConfig;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    /// No durable store can be opened in this environment.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Numeric session identity, auto-assigned on insert.
pub type SessionId = i64;

/// One persisted session row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub name: String,
    /// Epoch milliseconds, set once.
    pub created_at: i64,
    pub preview_uri: Option<String>,
    /// Serialized [`EditorState`](crate::document::EditorState).
    pub state_json: String,
}

/// A record about to be inserted; the backend assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub name: String,
    pub created_at: i64,
    pub preview_uri: Option<String>,
    pub state_json: String,
}

impl NewSession {
    fn into_record(self, id: SessionId) -> SessionRecord {
        SessionRecord {
            id,
            name: self.name,
            created_at: self.created_at,
            preview_uri: self.preview_uri,
            state_json: self.state_json,
        }
    }
}

/// Record storage backend.
///
/// Backends are plain CRUD; validation, preview cleanup and per-record
/// locking live in [`SessionCatalog`].
pub trait SessionStorage: Send + Sync {
    /// Insert a new record, assigning a fresh id.
    fn insert(&self, session: NewSession) -> BoxFuture<'_, StorageResult<SessionRecord>>;

    /// Replace an existing record. Fails with `NotFound` if absent.
    fn save(&self, record: &SessionRecord) -> BoxFuture<'_, StorageResult<()>>;

    /// Load a record. Fails with `NotFound` if absent.
    fn load(&self, id: SessionId) -> BoxFuture<'_, StorageResult<SessionRecord>>;

    /// Delete a record. Deleting a missing record succeeds.
    fn delete(&self, id: SessionId) -> BoxFuture<'_, StorageResult<()>>;

    /// All records, in no particular order.
    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<SessionRecord>>>;
}

/// Blob area for rasterized preview images.
pub trait PreviewStore: Send + Sync {
    /// Store encoded preview bytes, returning their reference.
    fn write(&self, bytes: &[u8]) -> BoxFuture<'_, StorageResult<String>>;

    fn read(&self, uri: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>>;

    fn exists(&self, uri: &str) -> BoxFuture<'_, StorageResult<bool>>;

    /// Delete a preview. Deleting a missing preview succeeds.
    fn delete(&self, uri: &str) -> BoxFuture<'_, StorageResult<()>>;
}

/// Catalog over the file backends, the usual on-device configuration.
pub type FileSessionCatalog = SessionCatalog<FileSessionStorage, FilePreviewStore>;

/// Open the file-backed catalog under the configured data directory.
pub fn create_file_catalog(config: &EngineConfig) -> StorageResult<FileSessionCatalog> {
    let storage = FileSessionStorage::new(config.sessions_dir())?;
    let previews = FilePreviewStore::new(config.previews_dir())?;
    Ok(SessionCatalog::new(Arc::new(storage), Arc::new(previews)))
}

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
