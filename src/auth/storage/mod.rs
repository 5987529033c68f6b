//! Key-value storage backends for the token store.
//!
//! A backend only has to move strings in and out of named slots. The token
//! store decides what the keys are and what text goes into them.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::StorageConfig;
use crate::error::{AuthError, AuthResult, StorageError};

pub mod file;
pub mod memory;

pub use file::JsonFileStorage;
pub use memory::MemoryStorage;

/// Asynchronous string key-value storage
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Read the value under `key`, or `None` if it was never written
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Delete `key`; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

pub type DynTokenStorage = Arc<dyn TokenStorage>;

/// Open the backend selected by the configuration
pub async fn open_storage(config: &StorageConfig) -> AuthResult<DynTokenStorage> {
    match config {
        StorageConfig::Memory => {
            info!("Using in-memory token storage");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageConfig::File { path } => {
            let storage = JsonFileStorage::open(path)
                .await
                .map_err(|e| AuthError::storage(path.display().to_string(), e))?;
            info!(path = %path.display(), "Using file token storage");
            Ok(Arc::new(storage))
        }
    }
}
