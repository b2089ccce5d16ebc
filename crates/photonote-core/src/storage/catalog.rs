//! Session store: validated CRUD over a record backend and a preview area.
//!
//! Mutations of one record are serialized through a per-record async lock;
//! different records never wait on each other. Preview cleanup is
//! best-effort: failures are logged and never fail the parent operation.

use super::{
    NewSession, PreviewStore, SessionId, SessionRecord, SessionStorage, StorageError, now_millis,
};
use crate::document::{self, EditorState};
use crate::error::{EngineError, EngineResult};
use dashmap::DashMap;
use futures_util::lock::{Mutex, OwnedMutexGuard};
use std::sync::Arc;

/// What an update does with the stored preview reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PreviewUpdate {
    /// Leave the existing preview untouched.
    #[default]
    Keep,
    /// Store a new preview and delete the previous one.
    Replace(String),
    /// Clear the reference and delete the previous preview.
    Clear,
}

impl From<Option<String>> for PreviewUpdate {
    fn from(preview: Option<String>) -> Self {
        match preview {
            Some(uri) => PreviewUpdate::Replace(uri),
            None => PreviewUpdate::Clear,
        }
    }
}

/// Durable CRUD for sessions and their previews.
pub struct SessionCatalog<S: SessionStorage, P: PreviewStore> {
    storage: Arc<S>,
    previews: Arc<P>,
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl<S: SessionStorage, P: PreviewStore> SessionCatalog<S, P> {
    pub fn new(storage: Arc<S>, previews: Arc<P>) -> Self {
        Self {
            storage,
            previews,
            locks: DashMap::new(),
        }
    }

    /// Wait for exclusive access to record `id`.
    async fn lock_record(&self, id: SessionId) -> RecordGuard<'_> {
        let lock = self
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        RecordGuard {
            locks: &self.locks,
            id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Insert a new session named `name`.
    pub async fn create(
        &self,
        name: &str,
        state: &EditorState,
        preview_uri: Option<String>,
    ) -> EngineResult<SessionId> {
        let name = validate_name(name)?;
        let state_json = document::serialize(state)?;

        let record = self
            .storage
            .insert(NewSession {
                name,
                created_at: now_millis(),
                preview_uri,
                state_json,
            })
            .await?;

        log::info!("Created session {} ({:?})", record.id, record.name);
        Ok(record.id)
    }

    /// Overwrite the state of session `id`, applying `preview` to its preview.
    pub async fn update(
        &self,
        id: SessionId,
        state: &EditorState,
        preview: PreviewUpdate,
    ) -> EngineResult<()> {
        self.write_update(id, None, state, preview).await
    }

    /// Like [`update`](Self::update), also renaming the session in the same
    /// record write.
    pub async fn update_and_rename(
        &self,
        id: SessionId,
        name: &str,
        state: &EditorState,
        preview: PreviewUpdate,
    ) -> EngineResult<()> {
        let name = validate_name(name)?;
        self.write_update(id, Some(name), state, preview).await
    }

    async fn write_update(
        &self,
        id: SessionId,
        name: Option<String>,
        state: &EditorState,
        preview: PreviewUpdate,
    ) -> EngineResult<()> {
        let state_json = document::serialize(state)?;

        let _guard = self.lock_record(id).await;

        let mut record = self.storage.load(id).await?;
        let previous = record.preview_uri.clone();
        record.state_json = state_json;
        if let Some(name) = name {
            record.name = name;
        }
        match &preview {
            PreviewUpdate::Keep => {}
            PreviewUpdate::Replace(uri) => record.preview_uri = Some(uri.clone()),
            PreviewUpdate::Clear => record.preview_uri = None,
        }
        self.storage.save(&record).await?;
        log::info!("Updated session {}", id);

        let replaced = previous
            .filter(|_| preview != PreviewUpdate::Keep)
            .filter(|old| record.preview_uri.as_deref() != Some(old.as_str()));
        if let Some(old) = replaced {
            self.discard_preview(&old).await;
        }
        Ok(())
    }

    /// Rename session `id`.
    pub async fn rename(&self, id: SessionId, name: &str) -> EngineResult<()> {
        let name = validate_name(name)?;

        let _guard = self.lock_record(id).await;

        let mut record = self.storage.load(id).await?;
        record.name = name;
        self.storage.save(&record).await?;
        Ok(())
    }

    /// Fetch session `id`, or `None` if it does not exist.
    pub async fn get(&self, id: SessionId) -> EngineResult<Option<SessionRecord>> {
        match self.storage.load(id).await {
            Ok(record) => Ok(Some(record)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch and deserialize the state of session `id`.
    pub async fn load_state(&self, id: SessionId) -> EngineResult<Option<EditorState>> {
        match self.get(id).await? {
            Some(record) => document::deserialize(&record.state_json).map(Some),
            None => Ok(None),
        }
    }

    /// All sessions, most recently created first.
    pub async fn list(&self) -> EngineResult<Vec<SessionRecord>> {
        let mut records = self.storage.list().await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    /// Delete session `id` and its preview. Missing ids are a no-op.
    pub async fn delete(&self, id: SessionId) -> EngineResult<()> {
        let _guard = self.lock_record(id).await;

        let record = match self.storage.load(id).await {
            Ok(record) => record,
            Err(StorageError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        self.storage.delete(id).await?;
        log::info!("Deleted session {}", id);

        if let Some(uri) = record.preview_uri {
            self.discard_preview(&uri).await;
        }
        Ok(())
    }

    /// Write encoded preview bytes into the preview area.
    pub async fn store_preview(&self, bytes: &[u8]) -> EngineResult<String> {
        Ok(self.previews.write(bytes).await?)
    }

    /// Read back a stored preview.
    pub async fn read_preview(&self, uri: &str) -> EngineResult<Vec<u8>> {
        Ok(self.previews.read(uri).await?)
    }

    /// Best-effort preview deletion; failures are only logged.
    pub async fn discard_preview(&self, uri: &str) {
        if let Err(e) = self.previews.delete(uri).await {
            log::warn!("Failed to delete preview {}: {}", uri, e);
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn previews(&self) -> &Arc<P> {
        &self.previews
    }
}

/// Exclusive access to one record. Dropping it removes the record's lock
/// from the table once no other caller is waiting on it.
struct RecordGuard<'a> {
    locks: &'a DashMap<SessionId, Arc<Mutex<()>>>,
    id: SessionId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub(crate) fn validate_name(name: &str) -> EngineResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(
            "Session name must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
