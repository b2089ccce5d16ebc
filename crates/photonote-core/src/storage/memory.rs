//! In-memory storage implementations.

use super::{
    BoxFuture, NewSession, PreviewStore, SessionId, SessionRecord, SessionStorage, StorageError,
    StorageResult,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use uuid::Uuid;

/// In-memory record storage for testing and ephemeral use.
#[derive(Default)]
pub struct MemorySessionStorage {
    inner: RwLock<MemoryRecords>,
}

#[derive(Default)]
struct MemoryRecords {
    records: BTreeMap<SessionId, SessionRecord>,
    last_id: SessionId,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl SessionStorage for MemorySessionStorage {
    fn insert(&self, session: NewSession) -> BoxFuture<'_, StorageResult<SessionRecord>> {
        Box::pin(async move {
            let mut inner = self.inner.write().map_err(lock_error)?;
            inner.last_id += 1;
            let record = session.into_record(inner.last_id);
            inner.records.insert(record.id, record.clone());
            Ok(record)
        })
    }

    fn save(&self, record: &SessionRecord) -> BoxFuture<'_, StorageResult<()>> {
        let record = record.clone();
        Box::pin(async move {
            let mut inner = self.inner.write().map_err(lock_error)?;
            match inner.records.get_mut(&record.id) {
                Some(existing) => {
                    *existing = record;
                    Ok(())
                }
                None => Err(StorageError::NotFound(record.id.to_string())),
            }
        })
    }

    fn load(&self, id: SessionId) -> BoxFuture<'_, StorageResult<SessionRecord>> {
        Box::pin(async move {
            let inner = self.inner.read().map_err(lock_error)?;
            inner
                .records
                .get(&id)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(id.to_string()))
        })
    }

    fn delete(&self, id: SessionId) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            let mut inner = self.inner.write().map_err(lock_error)?;
            inner.records.remove(&id);
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<SessionRecord>>> {
        Box::pin(async move {
            let inner = self.inner.read().map_err(lock_error)?;
            Ok(inner.records.values().cloned().collect())
        })
    }
}

/// In-memory preview blobs, addressed as `memory://previews/<uuid>.png`.
#[derive(Default)]
pub struct MemoryPreviewStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryPreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored previews.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PreviewStore for MemoryPreviewStore {
    fn write(&self, bytes: &[u8]) -> BoxFuture<'_, StorageResult<String>> {
        let bytes = bytes.to_vec();
        Box::pin(async move {
            let uri = format!("memory://previews/{}.png", Uuid::new_v4());
            let mut blobs = self.blobs.write().map_err(lock_error)?;
            blobs.insert(uri.clone(), bytes);
            Ok(uri)
        })
    }

    fn read(&self, uri: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>> {
        let uri = uri.to_string();
        Box::pin(async move {
            let blobs = self.blobs.read().map_err(lock_error)?;
            blobs
                .get(&uri)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(uri))
        })
    }

    fn exists(&self, uri: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let uri = uri.to_string();
        Box::pin(async move {
            let blobs = self.blobs.read().map_err(lock_error)?;
            Ok(blobs.contains_key(&uri))
        })
    }

    fn delete(&self, uri: &str) -> BoxFuture<'_, StorageResult<()>> {
        let uri = uri.to_string();
        Box::pin(async move {
            let mut blobs = self.blobs.write().map_err(lock_error)?;
            blobs.remove(&uri);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollster::block_on;

    fn new_session(name: &str) -> NewSession {
        NewSession {
            name: name.to_string(),
            created_at: 1_000,
            preview_uri: None,
            state_json: "{}".to_string(),
        }
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let storage = MemorySessionStorage::new();
        let a = block_on(storage.insert(new_session("a"))).unwrap();
        let b = block_on(storage.insert(new_session("b"))).unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn test_ids_are_not_reused_after_delete() {
        let storage = MemorySessionStorage::new();
        let a = block_on(storage.insert(new_session("a"))).unwrap();
        block_on(storage.delete(a.id)).unwrap();
        let b = block_on(storage.insert(new_session("b"))).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_load_not_found() {
        let storage = MemorySessionStorage::new();
        let result = block_on(storage.load(99));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_save_requires_existing_record() {
        let storage = MemorySessionStorage::new();
        let mut record = block_on(storage.insert(new_session("a"))).unwrap();
        record.name = "renamed".to_string();
        block_on(storage.save(&record)).unwrap();
        assert_eq!(block_on(storage.load(record.id)).unwrap().name, "renamed");

        record.id = 42;
        assert!(matches!(
            block_on(storage.save(&record)),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_preview_write_read_delete() {
        let previews = MemoryPreviewStore::new();
        let uri = block_on(previews.write(b"png")).unwrap();

        assert!(block_on(previews.exists(&uri)).unwrap());
        assert_eq!(block_on(previews.read(&uri)).unwrap(), b"png");

        block_on(previews.delete(&uri)).unwrap();
        assert!(!block_on(previews.exists(&uri)).unwrap());
        // second delete is a no-op
        block_on(previews.delete(&uri)).unwrap();
        assert!(previews.is_empty());
    }
}
