//! Storage backends for persisted records.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::Mutex;

use super::error::StorageError;
use crate::config::PersistenceSettings;

/// Key/value backend for persisted records.
///
/// Implementations may block internally but must not block the runtime;
/// `FileStorage` moves its I/O onto the blocking pool.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-process storage. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a record synchronously.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }

    /// Seed a record synchronously.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.items.lock().insert(key.into(), value.into());
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.peek(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.insert(key, value);
        Ok(())
    }
}

/// One JSON document per key under a directory.
///
/// Writes go to a temporary file that is renamed over the record while an
/// exclusive lock is held on `<record>.lock`, so readers always see a
/// complete document and concurrent writers (including other processes)
/// are serialized.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<data_local_dir>/tagstore`, if the platform has a data directory.
    pub fn default_location() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("tagstore"))
    }

    /// Storage configured by the `[persistence]` section.
    ///
    /// Returns `None` when persistence is disabled or no directory is known.
    pub fn from_settings(settings: &PersistenceSettings) -> Option<Self> {
        if !settings.enabled {
            return None;
        }
        settings
            .storage_dir
            .clone()
            .or_else(Self::default_location)
            .map(Self::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document holding `key`.
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.record_path(key);
        tokio::task::spawn_blocking(move || read_record(&path))
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?
            .map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let dir = self.dir.clone();
        let path = self.record_path(key);
        let value = value.to_string();
        tokio::task::spawn_blocking(move || write_record(&dir, &path, &value))
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?
            .map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })
    }
}

fn file_stem(key: &str) -> String {
    if key.is_empty() {
        return "_".to_string();
    }
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn read_record(path: &Path) -> io::Result<Option<String>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(Some(content))
}

fn write_record(dir: &Path, path: &Path, value: &str) -> io::Result<()> {
    fs::create_dir_all(dir)?;

    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path.with_extension("lock"))?;
    FileExt::lock_exclusive(&lock)?;

    let tmp = path.with_extension("json.tmp");
    let result = fs::write(&tmp, value).and_then(|_| fs::rename(&tmp, path));

    FileExt::unlock(&lock)?;
    result
}
