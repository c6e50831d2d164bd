//! File-backed snapshot store using a single JSON document.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::DisposerError;
use crate::infra::store::{BacklogSnapshot, SnapshotStore};

/// Snapshot store persisting the backlog as one JSON file.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous snapshot readable.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store at `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// [`DisposerError::Store`] when the parent directory cannot be created.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, DisposerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| DisposerError::Store(e.to_string()))?;
        }
        Ok(Self { path })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl SnapshotStore for JsonFileStore {
    fn save(&self, snapshot: &BacklogSnapshot) -> Result<(), DisposerError> {
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| DisposerError::Store(e.to_string()))?;
        let temp = self.temp_path();
        fs::write(&temp, bytes).map_err(|e| DisposerError::Store(e.to_string()))?;
        fs::rename(&temp, &self.path).map_err(|e| DisposerError::Store(e.to_string()))
    }

    fn load(&self) -> Result<Option<BacklogSnapshot>, DisposerError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path).map_err(|e| DisposerError::Store(e.to_string()))?;
        let snapshot =
            serde_json::from_slice(&bytes).map_err(|e| DisposerError::Store(e.to_string()))?;
        Ok(Some(snapshot))
    }
}
