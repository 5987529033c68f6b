//! Storage double that records every call and can be told to fail

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use tokio::sync::Mutex;

use crate::auth::storage::{MemoryStorage, TokenStorage};
use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    Get(String),
    Set(String, String),
    Remove(String),
}

/// Wraps a [`MemoryStorage`] and records the operations made against it
#[derive(Default)]
pub struct RecordingStorage {
    pub inner: MemoryStorage,
    ops: Mutex<Vec<StorageOp>>,
    failing_gets: DashSet<String>,
    failing_sets: DashSet<String>,
    failing_removes: DashSet<String>,
    get_delay: Option<Duration>,
}

impl RecordingStorage {
    pub fn new(inner: MemoryStorage) -> Arc<Self> {
        Arc::new(Self {
            inner,
            ..Self::default()
        })
    }

    /// Reads are held back by `delay` so callers can race the initial load
    pub fn slow(inner: MemoryStorage, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner,
            get_delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn fail_get(&self, key: &str) {
        self.failing_gets.insert(key.to_string());
    }

    pub fn fail_set(&self, key: &str) {
        self.failing_sets.insert(key.to_string());
    }

    pub fn fail_remove(&self, key: &str) {
        self.failing_removes.insert(key.to_string());
    }

    pub async fn ops(&self) -> Vec<StorageOp> {
        self.ops.lock().await.clone()
    }

    pub async fn reset_ops(&self) {
        self.ops.lock().await.clear();
    }

    pub async fn gets(&self) -> usize {
        self.ops()
            .await
            .iter()
            .filter(|op| matches!(op, StorageOp::Get(_)))
            .count()
    }

    /// Keys written with `set`, in call order
    pub async fn set_keys(&self) -> Vec<String> {
        self.ops()
            .await
            .into_iter()
            .filter_map(|op| match op {
                StorageOp::Set(key, _) => Some(key),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl TokenStorage for RecordingStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.ops.lock().await.push(StorageOp::Get(key.to_string()));
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_gets.contains(key) {
            return Err(StorageError::Backend(format!("read of {} refused", key)));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.ops
            .lock()
            .await
            .push(StorageOp::Set(key.to_string(), value.clone()));
        if self.failing_sets.contains(key) {
            return Err(StorageError::Backend("quota exceeded".to_string()));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.ops.lock().await.push(StorageOp::Remove(key.to_string()));
        if self.failing_removes.contains(key) {
            return Err(StorageError::Backend(format!("removal of {} refused", key)));
        }
        self.inner.remove(key).await
    }
}
