//! # kube-rs Cluster Client
//!
//! Builds a `kube::Client` from the connection profile and manages
//! `kubernetes.io/service-account-token` Secrets with it.

use super::{ClusterClient, ClusterConnector, ClusterError, SecretData};
use crate::connection::ConnectionConfig;
use crate::constants::{
    DEFAULT_CLUSTER_CONNECT_TIMEOUT_SECS, DEFAULT_CLUSTER_READ_TIMEOUT_SECS, MANAGED_BY_LABEL,
    MANAGED_BY_VALUE, SERVICE_ACCOUNT_NAME_ANNOTATION, SERVICE_ACCOUNT_TOKEN_SECRET_TYPE,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const CLUSTER_ENTRY_NAME: &str = "target";
const USER_ENTRY_NAME: &str = "k8s-secrets-engine";

/// Connector creating kube-rs clients from the stored connection profile
#[derive(Debug, Clone)]
pub struct KubeConnector {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Default for KubeConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CLUSTER_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_CLUSTER_READ_TIMEOUT_SECS),
        }
    }
}

impl KubeConnector {
    #[must_use]
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }

    /// In-memory kubeconfig equivalent to the connection profile
    fn kubeconfig(config: &ConnectionConfig) -> Result<Kubeconfig, ClusterError> {
        // Decode up front so a bad CA surfaces as such rather than as a TLS error
        config.ca_pem()?;

        let mut cluster = serde_json::json!({ "server": config.api_url });
        let ca = config.ca_cert_base64.trim();
        if !ca.is_empty() {
            cluster["certificate-authority-data"] = serde_json::Value::String(ca.to_string());
        }

        serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Config",
            "clusters": [{ "name": CLUSTER_ENTRY_NAME, "cluster": cluster }],
            "users": [{ "name": USER_ENTRY_NAME, "user": { "token": config.token } }],
            "contexts": [{
                "name": USER_ENTRY_NAME,
                "context": { "cluster": CLUSTER_ENTRY_NAME, "user": USER_ENTRY_NAME }
            }],
            "current-context": USER_ENTRY_NAME,
        }))
        .map_err(|e| ClusterError::Connect(format!("invalid connection profile: {e}")))
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn ClusterClient>, ClusterError> {
        let kubeconfig = Self::kubeconfig(config)?;
        let mut kube_config =
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| ClusterError::Connect(e.to_string()))?;
        kube_config.connect_timeout = Some(self.connect_timeout);
        kube_config.read_timeout = Some(self.read_timeout);

        let client =
            Client::try_from(kube_config).map_err(|e| ClusterError::Connect(e.to_string()))?;
        Ok(Arc::new(KubeClusterClient::new(client)))
    }
}

/// Cluster client backed by kube-rs
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Secret manifest requesting a token for `service_account`
#[must_use]
pub fn token_secret_manifest(name: &str, service_account: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations: Some(BTreeMap::from([(
                SERVICE_ACCOUNT_NAME_ANNOTATION.to_string(),
                service_account.to_string(),
            )])),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                MANAGED_BY_VALUE.to_string(),
            )])),
            ..Default::default()
        },
        type_: Some(SERVICE_ACCOUNT_TOKEN_SECRET_TYPE.to_string()),
        ..Default::default()
    }
}

fn api_error(
    operation: &'static str,
    namespace: &str,
    name: &str,
    err: &kube::Error,
) -> ClusterError {
    ClusterError::Api {
        operation,
        namespace: namespace.to_string(),
        name: name.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn create_token_secret(
        &self,
        namespace: &str,
        name: &str,
        service_account: &str,
    ) -> Result<(), ClusterError> {
        let secret = token_secret_manifest(name, service_account);
        self.secrets(namespace)
            .create(&PostParams::default(), &secret)
            .await
            .map_err(|e| api_error("create", namespace, name, &e))?;
        Ok(())
    }

    async fn get_secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<SecretData, ClusterError> {
        match self.secrets(namespace).get(name).await {
            Ok(secret) => Ok(secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(key, value)| (key, value.0))
                .collect()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Err(ClusterError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(api_error("get", namespace, name, &e)),
        }
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        match self
            .secrets(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                debug!(namespace = %namespace, secret_name = %name, "secret already absent");
                Ok(())
            }
            Err(e) => Err(api_error("delete", namespace, name, &e)),
        }
    }

    async fn server_version(&self) -> Result<String, ClusterError> {
        self.client
            .apiserver_version()
            .await
            .map(|info| info.git_version)
            .map_err(|e| ClusterError::Version(e.to_string()))
    }
}
