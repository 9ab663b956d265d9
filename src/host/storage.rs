//! Durable key-value storage backends

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, PoisonError,
    },
};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use super::{HostError, StorageBackend};

/// Storage backed by a single JSON object on disk.
///
/// The whole file is rewritten through a temp file and a rename, so readers
/// never observe a half-written record.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    cache: AsyncMutex<HashMap<String, Value>>,
}

impl FileStorage {
    /// Open the store, loading any existing file
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, HostError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| HostError::Storage(format!("Failed to create {}: {}", parent.display(), e)))?;
            }
        }

        let cache = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Ignoring unreadable storage file {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(HostError::Storage(format!("Failed to read {}: {}", path.display(), e)));
            }
        };

        debug!("Opened storage at {} with {} keys", path.display(), cache.len());
        Ok(Self {
            path,
            cache: AsyncMutex::new(cache),
        })
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, HostError> {
        Ok(self.cache.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), HostError> {
        let mut cache = self.cache.lock().await;
        let mut next = cache.clone();
        next.insert(key.to_string(), value);

        let contents = serde_json::to_vec_pretty(&next)
            .map_err(|e| HostError::Storage(format!("Failed to encode storage: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| HostError::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| HostError::Storage(format!("Failed to replace {}: {}", self.path.display(), e)))?;

        // Only a completed write becomes visible
        *cache = next;
        Ok(())
    }
}

/// In-process storage with failure injection, for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, Value>>,
    fail: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key
    pub fn with_value(self, key: &str, value: Value) -> Self {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        self
    }

    /// Make every subsequent call fail
    pub fn fail_storage(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn peek(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn check(&self) -> Result<(), HostError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HostError::Storage("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, HostError> {
        self.check()?;
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), HostError> {
        self.check()?;
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
