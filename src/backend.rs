//! # Backend
//!
//! The operation surface the host dispatches into: config and binding CRUD,
//! issuance, the lease callbacks and the recovery callbacks. Requests are typed
//! structs decoded once at the transport boundary.

use crate::binding::{Binding, BindingRegistry, BindingWriteRequest};
use crate::cluster::ClusterConnector;
use crate::connection::{ConfigStore, ConfigView, ConfigWriteRequest};
use crate::error::{Error, Result};
use crate::issuer::{NameGenerator, PollSettings, SecretIssuer};
use crate::lease::{IssuedLease, LeaseLifecycle};
use crate::recovery::{Recovery, RollbackReport};
use crate::storage::Storage;
use crate::wal::{RecoveryLog, RecoveryRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Issuance request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    /// Requested lease TTL in seconds; the configured default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

/// Host recovery callback payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRequest {
    pub kind: String,
    pub payload: serde_json::Value,
}

#[derive(Debug)]
pub struct BackendBuilder {
    storage: Arc<dyn Storage>,
    connector: Arc<dyn ClusterConnector>,
    poll: PollSettings,
    names: Option<NameGenerator>,
    prefix: Option<String>,
}

impl BackendBuilder {
    #[must_use]
    pub fn poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    #[must_use]
    pub fn names(mut self, names: NameGenerator) -> Self {
        self.names = Some(names);
        self
    }

    #[must_use]
    pub fn secret_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Backend {
        let config = ConfigStore::new(Arc::clone(&self.storage));
        let wal = RecoveryLog::new(Arc::clone(&self.storage));
        let lifecycle = LeaseLifecycle::new(config.clone(), Arc::clone(&self.connector));

        let mut issuer =
            SecretIssuer::new(wal.clone(), Arc::clone(&self.connector)).with_poll(self.poll);
        if let Some(names) = self.names {
            issuer = issuer.with_names(names);
        }
        if let Some(prefix) = self.prefix {
            issuer = issuer.with_prefix(prefix);
        }

        Backend {
            bindings: BindingRegistry::new(self.storage),
            recovery: Recovery::new(wal, lifecycle.clone()),
            config,
            connector: self.connector,
            issuer,
            lifecycle,
        }
    }
}

/// Dynamic ServiceAccount token backend
#[derive(Debug)]
pub struct Backend {
    config: ConfigStore,
    bindings: BindingRegistry,
    connector: Arc<dyn ClusterConnector>,
    issuer: SecretIssuer,
    lifecycle: LeaseLifecycle,
    recovery: Recovery,
}

impl Backend {
    pub fn builder(
        storage: Arc<dyn Storage>,
        connector: Arc<dyn ClusterConnector>,
    ) -> BackendBuilder {
        BackendBuilder {
            storage,
            connector,
            poll: PollSettings::default(),
            names: None,
            prefix: None,
        }
    }

    // Config

    pub async fn read_config(&self) -> Result<Option<ConfigView>> {
        Ok(self.config.get().await?.map(|config| config.view()))
    }

    /// Merge `request` into the stored profile, validate and persist it
    ///
    /// The merged profile must pass local checks and must be able to reach the
    /// cluster; otherwise the stored profile is left as it was.
    pub async fn write_config(&self, request: ConfigWriteRequest) -> Result<ConfigView> {
        let merged = request.merge_into(self.config.get().await?);
        merged.validate()?;

        let probe = async {
            let client = self.connector.connect(&merged).await?;
            client.server_version().await
        };
        let version = probe.await.map_err(|e| {
            Error::Validation(format!("Unable to configure, validation error, {e}"))
        })?;

        self.config.put(&merged).await?;
        info!(
            api_url = %merged.api_url,
            server_version = %version,
            ttl_secs = merged.default_ttl.as_secs(),
            max_ttl_secs = merged.max_ttl.as_secs(),
            "connection profile written"
        );
        Ok(merged.view())
    }

    pub async fn delete_config(&self) -> Result<()> {
        self.config.delete().await?;
        info!("connection profile deleted");
        Ok(())
    }

    // Bindings

    pub async fn read_binding(&self, name: &str) -> Result<Option<Binding>> {
        self.bindings.get(name).await
    }

    pub async fn write_binding(&self, name: &str, request: BindingWriteRequest) -> Result<Binding> {
        let binding = self.bindings.write(name, request).await?;
        info!(
            binding = %binding.name,
            namespace = %binding.namespace,
            service_account = %binding.service_account_name,
            "binding written"
        );
        Ok(binding)
    }

    pub async fn delete_binding(&self, name: &str) -> Result<()> {
        self.bindings.delete(name).await?;
        info!(binding = %name, "binding deleted");
        Ok(())
    }

    pub async fn list_bindings(&self) -> Result<Vec<String>> {
        self.bindings.list().await
    }

    // Issuance and lease callbacks

    pub async fn issue(
        &self,
        name: &str,
        request: IssueRequest,
        cancel: &CancellationToken,
    ) -> Result<IssuedLease> {
        let binding = self.bindings.lookup(name).await?;
        let config = self.config.require().await?;
        self.issuer
            .create(
                &binding,
                &config,
                request.ttl.map(Duration::from_secs),
                cancel,
            )
            .await
    }

    pub async fn renew(&self, lease: IssuedLease) -> Result<IssuedLease> {
        self.lifecycle.renew(lease).await
    }

    pub async fn revoke(&self, lease: &IssuedLease) -> Result<()> {
        self.lifecycle.revoke(lease).await
    }

    // Recovery callbacks

    pub async fn replay(&self, request: ReplayRequest) -> Result<()> {
        let record = RecoveryRecord::decode(&request.kind, request.payload)?;
        self.recovery.replay(&record).await
    }

    /// Sweep the log; runs with the issuance gate held so in-flight intents are never touched
    pub async fn rollback(&self, min_age: Duration) -> Result<RollbackReport> {
        let _permit = self.issuer.gate().acquire().await;
        self.recovery.rollback(min_age).await
    }
}
