//! In-process cluster
//!
//! Keeps token Secrets in memory and mimics the ServiceAccount token controller:
//! a created Secret stays empty for a configurable number of reads before its
//! `token`, `namespace` and `ca.crt` entries appear. Failures can be injected per
//! operation and every call is recorded in a journal, which makes it the cluster
//! double for the engine's tests and for `serve --simulate-cluster`.

use super::{ClusterClient, ClusterConnector, ClusterError, SecretData};
use crate::connection::ConnectionConfig;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const SIMULATED_CA: &[u8] = b"-----BEGIN CERTIFICATE-----\nc2ltdWxhdGVk\n-----END CERTIFICATE-----\n";

/// Operation recorded by [`MemoryCluster`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterOperation {
    Create { namespace: String, name: String },
    Get { namespace: String, name: String },
    Delete { namespace: String, name: String, existed: bool },
}

/// Operation that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Connect,
    Create,
    Get,
    Delete,
}

#[derive(Debug)]
struct StoredSecret {
    service_account: String,
    reads: u32,
    data: SecretData,
}

#[derive(Debug, Default)]
struct State {
    secrets: BTreeMap<(String, String), StoredSecret>,
    reads_before_populated: u32,
    failures: Vec<FailOn>,
    journal: Vec<ClusterOperation>,
}

/// In-memory cluster, cheap to clone (clones share state)
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<State>>,
}

impl MemoryCluster {
    /// Cluster whose Secrets are populated on the first read
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cluster whose Secrets stay empty for `reads` reads; `u32::MAX` never populates
    #[must_use]
    pub fn with_populate_delay(reads: u32) -> Self {
        let cluster = Self::default();
        cluster.state().reads_before_populated = reads;
        cluster
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent `operation` fail until [`MemoryCluster::clear_failures`]
    pub fn fail_on(&self, operation: FailOn) {
        self.state().failures.push(operation);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Store a Secret as if it had been created out of band
    pub fn insert_secret(&self, namespace: &str, name: &str, data: SecretData) {
        self.state().secrets.insert(
            (namespace.to_string(), name.to_string()),
            StoredSecret {
                service_account: String::new(),
                reads: u32::MAX,
                data,
            },
        );
    }

    #[must_use]
    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.state()
            .secrets
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    /// `(namespace, name)` of every stored Secret
    #[must_use]
    pub fn secrets(&self) -> Vec<(String, String)> {
        self.state().secrets.keys().cloned().collect()
    }

    /// ServiceAccount a stored Secret was created for
    #[must_use]
    pub fn service_account_of(&self, namespace: &str, name: &str) -> Option<String> {
        self.state()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .map(|secret| secret.service_account.clone())
    }

    #[must_use]
    pub fn journal(&self) -> Vec<ClusterOperation> {
        self.state().journal.clone()
    }

    fn injected(state: &State, operation: FailOn) -> bool {
        state.failures.contains(&operation)
    }
}

fn simulated_data(namespace: &str, name: &str) -> SecretData {
    BTreeMap::from([
        ("token".to_string(), format!("token-{name}").into_bytes()),
        ("namespace".to_string(), namespace.as_bytes().to_vec()),
        ("ca.crt".to_string(), SIMULATED_CA.to_vec()),
    ])
}

fn injected_error(operation: &'static str, namespace: &str, name: &str) -> ClusterError {
    ClusterError::Api {
        operation,
        namespace: namespace.to_string(),
        name: name.to_string(),
        message: "injected failure".to_string(),
    }
}

#[async_trait]
impl ClusterConnector for MemoryCluster {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn ClusterClient>, ClusterError> {
        config.ca_pem()?;
        if Self::injected(&self.state(), FailOn::Connect) {
            return Err(ClusterError::Connect("injected failure".to_string()));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn create_token_secret(
        &self,
        namespace: &str,
        name: &str,
        service_account: &str,
    ) -> Result<(), ClusterError> {
        let mut state = self.state();
        if Self::injected(&state, FailOn::Create) {
            return Err(injected_error("create", namespace, name));
        }
        let key = (namespace.to_string(), name.to_string());
        if state.secrets.contains_key(&key) {
            return Err(ClusterError::Api {
                operation: "create",
                namespace: namespace.to_string(),
                name: name.to_string(),
                message: "already exists".to_string(),
            });
        }
        state.secrets.insert(
            key,
            StoredSecret {
                service_account: service_account.to_string(),
                reads: 0,
                data: SecretData::new(),
            },
        );
        state.journal.push(ClusterOperation::Create {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    async fn get_secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<SecretData, ClusterError> {
        let mut state = self.state();
        if Self::injected(&state, FailOn::Get) {
            return Err(injected_error("get", namespace, name));
        }
        state.journal.push(ClusterOperation::Get {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        let delay = state.reads_before_populated;
        let secret = state
            .secrets
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ClusterError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;

        if secret.data.is_empty() && secret.reads >= delay {
            secret.data = simulated_data(namespace, name);
        }
        secret.reads = secret.reads.saturating_add(1);
        Ok(secret.data.clone())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state();
        if Self::injected(&state, FailOn::Delete) {
            return Err(injected_error("delete", namespace, name));
        }
        let existed = state
            .secrets
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some();
        state.journal.push(ClusterOperation::Delete {
            namespace: namespace.to_string(),
            name: name.to_string(),
            existed,
        });
        Ok(())
    }

    async fn server_version(&self) -> Result<String, ClusterError> {
        if Self::injected(&self.state(), FailOn::Connect) {
            return Err(ClusterError::Version("injected failure".to_string()));
        }
        Ok("v1.30.0-simulated".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_secret_is_populated_after_delay() {
        let cluster = MemoryCluster::with_populate_delay(2);
        cluster
            .create_token_secret("apps", "vault-web-abcd1234", "web")
            .await
            .unwrap();

        assert!(cluster.get_secret_data("apps", "vault-web-abcd1234").await.unwrap().is_empty());
        assert!(cluster.get_secret_data("apps", "vault-web-abcd1234").await.unwrap().is_empty());

        let data = cluster.get_secret_data("apps", "vault-web-abcd1234").await.unwrap();
        assert_eq!(data["token"], b"token-vault-web-abcd1234".to_vec());
        assert_eq!(data["namespace"], b"apps".to_vec());
        assert_eq!(cluster.service_account_of("apps", "vault-web-abcd1234").as_deref(), Some("web"));
    }

    #[tokio::test]
    async fn test_delete_of_absent_secret_succeeds() {
        let cluster = MemoryCluster::new();
        cluster.delete_secret("apps", "missing").await.unwrap();
        assert_eq!(
            cluster.journal(),
            vec![ClusterOperation::Delete {
                namespace: "apps".to_string(),
                name: "missing".to_string(),
                existed: false,
            }]
        );
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let cluster = MemoryCluster::new();
        cluster.fail_on(FailOn::Create);
        assert!(cluster.create_token_secret("apps", "x", "web").await.is_err());
        assert!(!cluster.contains("apps", "x"));

        cluster.clear_failures();
        cluster.create_token_secret("apps", "x", "web").await.unwrap();
        assert!(cluster.contains("apps", "x"));
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let cluster = MemoryCluster::new();
        cluster.create_token_secret("apps", "x", "web").await.unwrap();
        let err = cluster.create_token_secret("apps", "x", "web").await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
