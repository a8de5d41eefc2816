//! Shared test utilities and mock infrastructure.

#![allow(dead_code, unused_imports)]

pub mod mock_backend;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tagstore::api::{ApiBuilder, TagRegistry};
use tagstore::persistence::{Storage, StorageError};
use tempfile::TempDir;

/// Builder pointed at a mock backend with an isolated registry.
pub fn builder_for(base_url: &str) -> (ApiBuilder, TagRegistry) {
    let registry = TagRegistry::new();
    (ApiBuilder::new(base_url, registry.clone()), registry)
}

/// Create a temporary config file with the given contents.
pub fn temp_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, content).expect("Failed to write config");
    (temp_dir, config_path)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// -- Storage doubles ----------------------------------------------------------

/// Storage whose every call fails like an unreachable backend.
#[derive(Default, Clone)]
pub struct BrokenStorage {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Storage for BrokenStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Io {
            key: key.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        })
    }

    async fn set_item(&self, key: &str, _value: &str) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Io {
            key: key.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        })
    }
}

/// Storage that records every write in order.
#[derive(Default, Clone)]
pub struct RecordingStorage {
    pub writes: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl Storage for RecordingStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .writes
            .lock()
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone()))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.writes.lock().push((key.to_string(), value.to_string()));
        Ok(())
    }
}
