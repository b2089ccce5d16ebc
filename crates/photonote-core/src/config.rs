//! Engine configuration.

use crate::annotation::Brush;
use crate::storage::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding [`EngineConfig::data_dir`].
pub const DATA_DIR_ENV: &str = "PHOTONOTE_DATA_DIR";

/// Longest edge of rendered previews, in pixels.
pub const DEFAULT_PREVIEW_MAX_DIMENSION: u32 = 1024;

/// Settings shared by the engine and its reference collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root of `sessions/`, `previews/` and `images/`.
    pub data_dir: PathBuf,
    /// Brush new sessions start with.
    pub brush: Brush,
    pub preview_max_dimension: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().unwrap_or_else(|| PathBuf::from(".photonote")),
            brush: Brush::default(),
            preview_max_dimension: DEFAULT_PREVIEW_MAX_DIMENSION,
        }
    }
}

/// Platform data directory for PhotoNote.
///
/// On Linux: `~/.local/share/photonote`
/// On Windows: `%LOCALAPPDATA%\photonote`
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .map(|base| base.join("photonote"))
}

impl EngineConfig {
    /// Defaults, with the data directory taken from `PHOTONOTE_DATA_DIR` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load a JSON config file; missing keys take their defaults.
    pub fn load(path: &Path) -> StorageResult<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut config: Self = serde_json::from_str(&json).map_err(|e| {
            StorageError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// Use `data_dir` instead of the configured one.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn previews_dir(&self) -> PathBuf {
        self.data_dir.join("previews")
    }

    /// Where baked transform outputs are written.
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }
}
