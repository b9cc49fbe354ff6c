//! Common test utilities
//!
//! Builds a [`Backend`] over in-process storage and an in-process cluster, plus
//! a storage wrapper that records every write and can be told to fail.

#![allow(dead_code)]

use async_trait::async_trait;
use k8s_secrets_engine::cluster::MemoryCluster;
use k8s_secrets_engine::prelude::*;
use k8s_secrets_engine::storage::MemoryStorage;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Base64 of `hello\n`, accepted as a CA bundle by the in-process cluster
pub const TEST_CA: &str = "aGVsbG8K";

/// Storage mutation seen by [`RecordingStorage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    Put(String),
    Delete(String),
}

#[derive(Debug, Default)]
struct Recording {
    events: Vec<StorageEvent>,
    fail_put_prefix: Option<String>,
    fail_delete_prefix: Option<String>,
}

/// [`MemoryStorage`] that journals puts and deletes
#[derive(Debug, Clone, Default)]
pub struct RecordingStorage {
    pub inner: MemoryStorage,
    recording: Arc<Mutex<Recording>>,
}

impl RecordingStorage {
    pub fn events(&self) -> Vec<StorageEvent> {
        self.recording.lock().unwrap().events.clone()
    }

    /// Mutations of keys under `prefix`, in order
    pub fn events_under(&self, prefix: &str) -> Vec<StorageEvent> {
        self.events()
            .into_iter()
            .filter(|event| match event {
                StorageEvent::Put(key) | StorageEvent::Delete(key) => key.starts_with(prefix),
            })
            .collect()
    }

    pub fn fail_puts_under(&self, prefix: &str) {
        self.recording.lock().unwrap().fail_put_prefix = Some(prefix.to_string());
    }

    pub fn fail_deletes_under(&self, prefix: &str) {
        self.recording.lock().unwrap().fail_delete_prefix = Some(prefix.to_string());
    }

    pub fn clear_failures(&self) {
        let mut recording = self.recording.lock().unwrap();
        recording.fail_put_prefix = None;
        recording.fail_delete_prefix = None;
    }
}

#[async_trait]
impl Storage for RecordingStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        {
            let mut recording = self.recording.lock().unwrap();
            if recording
                .fail_put_prefix
                .as_deref()
                .is_some_and(|prefix| key.starts_with(prefix))
            {
                return Err(StorageError::Backend("injected put failure".to_string()));
            }
            recording.events.push(StorageEvent::Put(key.to_string()));
        }
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        {
            let mut recording = self.recording.lock().unwrap();
            if recording
                .fail_delete_prefix
                .as_deref()
                .is_some_and(|prefix| key.starts_with(prefix))
            {
                return Err(StorageError::Backend("injected delete failure".to_string()));
            }
            recording.events.push(StorageEvent::Delete(key.to_string()));
        }
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list(prefix).await
    }
}

/// Backend wired to in-process collaborators
pub struct Harness {
    pub backend: Arc<Backend>,
    pub cluster: MemoryCluster,
    pub storage: RecordingStorage,
}

pub fn fast_poll() -> PollSettings {
    PollSettings::new(5, Duration::from_millis(5))
}

pub fn harness() -> Harness {
    harness_with(MemoryCluster::new())
}

pub fn harness_with(cluster: MemoryCluster) -> Harness {
    let storage = RecordingStorage::default();
    let backend = Backend::builder(Arc::new(storage.clone()), Arc::new(cluster.clone()))
        .poll(fast_poll())
        .names(NameGenerator::seeded(42))
        .build();
    Harness {
        backend: Arc::new(backend),
        cluster,
        storage,
    }
}

impl Harness {
    pub async fn configure(&self, ttl: u64, max_ttl: u64) {
        self.backend
            .write_config(ConfigWriteRequest {
                token: Some("123qwe".to_string()),
                api_url: Some("https://localhost:8443/".to_string()),
                ca: Some(TEST_CA.to_string()),
                ttl: Some(ttl),
                max_ttl: Some(max_ttl),
            })
            .await
            .unwrap();
    }

    pub async fn bind(&self, name: &str, namespace: &str, service_account: &str) {
        self.backend
            .write_binding(
                name,
                BindingWriteRequest {
                    namespace: Some(namespace.to_string()),
                    service_account_name: Some(service_account.to_string()),
                },
            )
            .await
            .unwrap();
    }

    pub async fn wal_keys(&self) -> Vec<String> {
        self.storage.inner.list("wal/").await.unwrap()
    }
}
