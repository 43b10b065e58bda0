//! Save storage keyed by player identity.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("save storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("save encoding failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Where serialized saves live. Keys are already-validated identities.
pub trait SaveStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save(&self, key: &str, data: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

impl<S: SaveStore + ?Sized> SaveStore for Arc<S> {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).load(key)
    }

    fn save(&self, key: &str, data: &str) -> Result<(), StoreError> {
        (**self).save(key, data)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}

/// In-process store, mostly for tests and the simulator.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saves: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.saves.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SaveStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let saves = self.saves.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(saves.get(key).cloned())
    }

    fn save(&self, key: &str, data: &str) -> Result<(), StoreError> {
        let mut saves = self.saves.lock().unwrap_or_else(PoisonError::into_inner);
        saves.insert(key.to_string(), data.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut saves = self.saves.lock().unwrap_or_else(PoisonError::into_inner);
        saves.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per identity under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// The directory is created lazily on the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SaveStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, data: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Readers only ever see a complete file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), bytes = data.len(), "save written");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
