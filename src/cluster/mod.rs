//! # Cluster Access
//!
//! Create, read and delete of the token Secrets the engine provisions.
//!
//! - [`ClusterConnector`] builds a client from the stored connection profile
//! - [`ClusterClient`] performs the per-namespace Secret operations
//!
//! [`kubernetes::KubeConnector`] talks to a real API server through kube-rs;
//! [`memory::MemoryCluster`] keeps Secrets in process and lets tests control when
//! the token controller "populates" them.

use crate::connection::ConnectionConfig;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub mod kubernetes;
pub mod memory;

pub use kubernetes::{KubeClusterClient, KubeConnector};
pub use memory::MemoryCluster;

/// Data section of a Secret, keyed by entry name
pub type SecretData = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("unable to create kubernetes client, unable to decode CA: {0}")]
    InvalidCa(#[from] base64::DecodeError),

    #[error("unable to create kubernetes client: {0}")]
    Connect(String),

    #[error("secret {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("unable to {operation} secret {namespace}/{name}: {message}")]
    Api {
        operation: &'static str,
        namespace: String,
        name: String,
        message: String,
    },

    #[error("unable to query API server version: {0}")]
    Version(String),
}

/// Secret operations against one cluster
#[async_trait]
pub trait ClusterClient: Send + Sync + std::fmt::Debug {
    /// Ask the cluster for a new ServiceAccount token Secret named `name`
    async fn create_token_secret(
        &self,
        namespace: &str,
        name: &str,
        service_account: &str,
    ) -> Result<(), ClusterError>;

    /// Current data of a Secret; empty until the token controller fills it in
    async fn get_secret_data(&self, namespace: &str, name: &str)
        -> Result<SecretData, ClusterError>;

    /// Delete a Secret; deleting an absent Secret succeeds
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    /// API server version, used to probe a connection profile
    async fn server_version(&self) -> Result<String, ClusterError>;
}

/// Builds cluster clients from the connection profile
#[async_trait]
pub trait ClusterConnector: Send + Sync + std::fmt::Debug {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn ClusterClient>, ClusterError>;
}
