//! In-memory storage
//!
//! Ephemeral - data does not persist across restarts.
//! Thread-safe using Arc<RwLock> for concurrent access.

use super::{validate_key, Storage, StorageError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every key currently stored, in ascending order
    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        validate_key(key)?;
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .filter_map(|key| {
                let rest = &key[prefix.len()..];
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let storage = MemoryStorage::new();
        assert!(storage.get("sa/a").await.unwrap().is_none());

        storage.put("sa/a", b"1".to_vec()).await.unwrap();
        assert_eq!(storage.get("sa/a").await.unwrap(), Some(b"1".to_vec()));

        storage.delete("sa/a").await.unwrap();
        assert!(storage.get("sa/a").await.unwrap().is_none());

        // Deleting twice is fine
        storage.delete("sa/a").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_returns_direct_children_in_order() {
        let storage = MemoryStorage::new();
        for key in ["sa/zeta", "sa/alpha", "sa/nested/child", "config", "wal/1"] {
            storage.put(key, Vec::new()).await.unwrap();
        }

        assert_eq!(storage.list("sa/").await.unwrap(), vec!["alpha", "zeta"]);
        assert_eq!(storage.list("wal/").await.unwrap(), vec!["1"]);
        assert!(storage.list("missing/").await.unwrap().is_empty());
    }
}
