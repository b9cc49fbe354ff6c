//! # Storage
//!
//! Durable key-value storage supplied by the host.
//!
//! Keys are `/`-separated strings (`config`, `sa/<name>`, `wal/<id>`); values are
//! opaque bytes, JSON-encoded by the callers in this crate. Single-key operations
//! are expected to be atomic; the engine adds no locking around them.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStorage`] - in-process map, used by tests and ephemeral deployments
//! - [`FileStorage`] - one file per key under a root directory, written atomically

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("storage I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode or decode '{key}': {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Host-provided durable storage
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Read a value; `None` when the key does not exist
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write a value, replacing any previous one
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Delete a value; deleting an absent key succeeds
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List the leaf keys directly under `prefix`, relative to it, in ascending order
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Read and decode a JSON value
pub async fn get_json<T: DeserializeOwned>(
    storage: &dyn Storage,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = storage.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|source| StorageError::Codec {
            key: key.to_string(),
            source,
        })
}

/// Encode and write a JSON value
pub async fn put_json<T: Serialize + ?Sized>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_vec(value).map_err(|source| StorageError::Codec {
        key: key.to_string(),
        source,
    })?;
    storage.put(key, raw).await
}

/// Reject keys that could escape their namespace or collide with list semantics
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.ends_with('/')
        || key
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == ".." || part.starts_with('.'));
    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
