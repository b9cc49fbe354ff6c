//! # Lease Lifecycle
//!
//! Renew and revoke of issued token Secrets.
//!
//! A lease's TTL is host-side bookkeeping: it says how long the credential counts
//! as checked out, not how long the cluster token is valid. Renewing therefore
//! only restamps `ttl`/`max_ttl` from the current connection profile and never
//! touches the cluster. Revoking deletes the Secret recorded in the lease's
//! internal data, and succeeds when that Secret is already gone.

use crate::cluster::ClusterConnector;
use crate::connection::ConfigStore;
use crate::error::Result;
use crate::observability::metrics;
use crate::wal::ProvisioningIntent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Client-visible credential data
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseData {
    pub token: String,
    pub namespace: String,
    /// Cluster CA bundle, base64 encoded
    #[serde(rename = "CA_base64")]
    pub ca_base64: String,
}

impl std::fmt::Debug for LeaseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseData")
            .field("token", &"***")
            .field("namespace", &self.namespace)
            .field("ca_base64", &self.ca_base64)
            .finish()
    }
}

/// Data needed to locate the cluster Secret again; never shown to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInternal {
    #[serde(rename = "secret-name")]
    pub secret_name: String,
    pub namespace: String,
}

impl From<ProvisioningIntent> for LeaseInternal {
    fn from(intent: ProvisioningIntent) -> Self {
        Self {
            secret_name: intent.name,
            namespace: intent.namespace,
        }
    }
}

/// Lease as held by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedLease {
    pub data: LeaseData,
    #[serde(with = "crate::serde_secs")]
    pub ttl: Duration,
    #[serde(with = "crate::serde_secs")]
    pub max_ttl: Duration,
    pub internal: LeaseInternal,
    pub issued_at: DateTime<Utc>,
}

/// Lease as returned to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseResponse {
    pub data: LeaseData,
    /// Lease TTL in seconds
    pub lease_duration: u64,
    /// Maximum lease TTL in seconds
    pub max_ttl: u64,
    pub renewable: bool,
}

impl IssuedLease {
    #[must_use]
    pub fn response(&self) -> LeaseResponse {
        LeaseResponse {
            data: self.data.clone(),
            lease_duration: self.ttl.as_secs(),
            max_ttl: self.max_ttl.as_secs(),
            renewable: true,
        }
    }
}

/// Renew/revoke handler
#[derive(Clone, Debug)]
pub struct LeaseLifecycle {
    config: ConfigStore,
    connector: Arc<dyn ClusterConnector>,
}

impl LeaseLifecycle {
    pub fn new(config: ConfigStore, connector: Arc<dyn ClusterConnector>) -> Self {
        Self { config, connector }
    }

    /// Restamp `ttl`/`max_ttl` from the current connection profile
    pub async fn renew(&self, mut lease: IssuedLease) -> Result<IssuedLease> {
        let config = self.config.require().await?;
        lease.ttl = config.default_ttl;
        lease.max_ttl = config.max_ttl;

        metrics::increment_leases_renewed();
        info!(
            namespace = %lease.internal.namespace,
            secret_name = %lease.internal.secret_name,
            ttl_secs = lease.ttl.as_secs(),
            "renewed lease"
        );
        Ok(lease)
    }

    /// Delete the Secret behind `lease`
    pub async fn revoke(&self, lease: &IssuedLease) -> Result<()> {
        self.revoke_internal(&lease.internal).await
    }

    /// Delete the Secret identified by `internal`; an absent Secret counts as revoked
    pub async fn revoke_internal(&self, internal: &LeaseInternal) -> Result<()> {
        let config = self.config.require().await?;
        let client = self.connector.connect(&config).await?;
        client
            .delete_secret(&internal.namespace, &internal.secret_name)
            .await?;

        metrics::increment_secrets_revoked();
        info!(
            namespace = %internal.namespace,
            secret_name = %internal.secret_name,
            "revoked secret"
        );
        Ok(())
    }
}
