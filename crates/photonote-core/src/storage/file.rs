//! File-based storage for native platforms.
//!
//! Records live as `<id>.json` files in one directory; previews as
//! `<uuid>.png` files in another.

use super::{
    BoxFuture, NewSession, PreviewStore, SessionId, SessionRecord, SessionStorage, StorageError,
    StorageResult,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

fn ensure_dir(path: &Path) -> StorageResult<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            StorageError::Io(format!(
                "Failed to create storage directory {}: {}",
                path.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Write through a temporary file so a crash never leaves a torn record.
fn write_atomic(path: &Path, contents: &[u8]) -> StorageResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)
        .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path).map_err(|e| {
        StorageError::Io(format!("Failed to move {} into place: {}", path.display(), e))
    })
}

/// File-based session record storage.
pub struct FileSessionStorage {
    base_path: PathBuf,
    /// Highest id handed out so far.
    last_id: Mutex<SessionId>,
}

impl FileSessionStorage {
    /// Open (creating if needed) record storage in `base_path`.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        ensure_dir(&base_path)?;
        let last_id = scan_ids(&base_path)?.into_iter().max().unwrap_or(0);
        Ok(Self {
            base_path,
            last_id: Mutex::new(last_id),
        })
    }

    fn record_path(&self, id: SessionId) -> PathBuf {
        self.base_path.join(format!("{}.json", id))
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    fn write_record(&self, record: &SessionRecord) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        write_atomic(&self.record_path(record.id), &json)
    }

    fn read_record(path: &Path) -> StorageResult<SessionRecord> {
        let json = fs::read_to_string(path)
            .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&json).map_err(|e| {
            StorageError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })
    }
}

/// Ids of all `<id>.json` files in `dir`.
fn scan_ids(dir: &Path) -> StorageResult<Vec<SessionId>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| StorageError::Io(format!("Failed to read directory: {}", e)))?;

    let mut ids = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<SessionId>().ok())
            {
                ids.push(id);
            }
        }
    }
    Ok(ids)
}

impl SessionStorage for FileSessionStorage {
    fn insert(&self, session: NewSession) -> BoxFuture<'_, StorageResult<SessionRecord>> {
        Box::pin(async move {
            let mut last_id = self
                .last_id
                .lock()
                .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))?;
            let record = session.into_record(*last_id + 1);
            self.write_record(&record)?;
            *last_id = record.id;
            Ok(record)
        })
    }

    fn save(&self, record: &SessionRecord) -> BoxFuture<'_, StorageResult<()>> {
        let record = record.clone();
        Box::pin(async move {
            if !self.record_path(record.id).exists() {
                return Err(StorageError::NotFound(record.id.to_string()));
            }
            self.write_record(&record)
        })
    }

    fn load(&self, id: SessionId) -> BoxFuture<'_, StorageResult<SessionRecord>> {
        let path = self.record_path(id);
        Box::pin(async move {
            if !path.exists() {
                return Err(StorageError::NotFound(id.to_string()));
            }
            Self::read_record(&path)
        })
    }

    fn delete(&self, id: SessionId) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.record_path(id);
        Box::pin(async move {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    StorageError::Io(format!("Failed to delete {}: {}", path.display(), e))
                })?;
            }
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<SessionRecord>>> {
        Box::pin(async move {
            let mut records = Vec::new();
            for id in scan_ids(&self.base_path)? {
                match Self::read_record(&self.record_path(id)) {
                    Ok(record) => records.push(record),
                    Err(e) => log::warn!("Skipping unreadable session {}: {}", id, e),
                }
            }
            Ok(records)
        })
    }
}

/// File-based preview image area.
///
/// Preview references are absolute file paths inside `base_path`.
pub struct FilePreviewStore {
    base_path: PathBuf,
}

impl FilePreviewStore {
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        ensure_dir(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    /// Resolve a reference, refusing anything outside the preview area.
    fn resolve(&self, uri: &str) -> StorageResult<PathBuf> {
        let path = PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri));
        let inside = path.parent() == Some(self.base_path.as_path())
            && path.file_name().is_some();
        if !inside {
            return Err(StorageError::Other(format!(
                "Preview {} is outside {}",
                uri,
                self.base_path.display()
            )));
        }
        Ok(path)
    }
}

impl PreviewStore for FilePreviewStore {
    fn write(&self, bytes: &[u8]) -> BoxFuture<'_, StorageResult<String>> {
        let bytes = bytes.to_vec();
        Box::pin(async move {
            let path = self.base_path.join(format!("{}.png", Uuid::new_v4()));
            write_atomic(&path, &bytes)?;
            Ok(path.to_string_lossy().into_owned())
        })
    }

    fn read(&self, uri: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>> {
        let path = self.resolve(uri);
        let uri = uri.to_string();
        Box::pin(async move {
            let path = path?;
            if !path.exists() {
                return Err(StorageError::NotFound(uri));
            }
            fs::read(&path)
                .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))
        })
    }

    fn exists(&self, uri: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let path = self.resolve(uri);
        Box::pin(async move { Ok(path?.exists()) })
    }

    fn delete(&self, uri: &str) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.resolve(uri);
        Box::pin(async move {
            let path = path?;
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    StorageError::Io(format!("Failed to delete {}: {}", path.display(), e))
                })?;
            }
            Ok(())
        })
    }
}
