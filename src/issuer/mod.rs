//! # Secret Issuer
//!
//! Provisions one ServiceAccount token Secret per issuance request.
//!
//! ## Provisioning protocol
//!
//! 1. Enforce the TTL policy (`requested <= max_ttl`, default `default_ttl`)
//! 2. Take the [`IssuanceGate`]; every later step runs with the gate held
//! 3. Append a [`ProvisioningIntent`] to the [`RecoveryLog`]
//! 4. Ask the cluster for the token Secret
//! 5. Read the Secret back until the token controller has populated it, up to
//!    [`PollSettings::attempts`] reads spaced by [`PollSettings::interval`]
//! 6. Clear the intent and return the lease
//!
//! A failure after step 3 leaves the intent in the log: replaying it revokes the
//! Secret whether or not it was ever created.

mod gate;
mod names;

pub use gate::{IssuanceGate, IssuancePermit};
pub use names::NameGenerator;

use crate::binding::Binding;
use crate::cluster::{ClusterClient, ClusterConnector, SecretData};
use crate::connection::ConnectionConfig;
use crate::constants::{
    DEFAULT_ISSUE_POLL_ATTEMPTS, DEFAULT_ISSUE_POLL_INTERVAL_MS, DEFAULT_SECRET_NAME_PREFIX,
};
use crate::error::{Error, Result};
use crate::lease::{IssuedLease, LeaseData, LeaseInternal};
use crate::observability::metrics;
use crate::wal::{ProvisioningIntent, RecoveryLog, RecoveryRecord};
use base64::Engine;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bounds of the wait for a created Secret to be populated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Number of reads, at least one
    pub attempts: u32,
    /// Delay between two reads
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ISSUE_POLL_ATTEMPTS,
            interval: Duration::from_millis(DEFAULT_ISSUE_POLL_INTERVAL_MS),
        }
    }
}

impl PollSettings {
    #[must_use]
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
        }
    }
}

/// Lease TTL granted for `requested` under `config`
pub fn effective_ttl(config: &ConnectionConfig, requested: Option<Duration>) -> Result<Duration> {
    match requested {
        Some(requested) if requested > config.max_ttl => Err(Error::PolicyViolation {
            max: config.max_ttl,
            requested,
        }),
        Some(requested) => Ok(requested),
        None => Ok(config.default_ttl),
    }
}

/// Orchestrates provisioning attempts
#[derive(Debug)]
pub struct SecretIssuer {
    wal: RecoveryLog,
    connector: Arc<dyn ClusterConnector>,
    gate: IssuanceGate,
    names: NameGenerator,
    poll: PollSettings,
    prefix: String,
}

impl SecretIssuer {
    pub fn new(wal: RecoveryLog, connector: Arc<dyn ClusterConnector>) -> Self {
        Self {
            wal,
            connector,
            gate: IssuanceGate::new(),
            names: NameGenerator::from_entropy(),
            poll: PollSettings::default(),
            prefix: DEFAULT_SECRET_NAME_PREFIX.to_string(),
        }
    }

    #[must_use]
    pub fn with_names(mut self, names: NameGenerator) -> Self {
        self.names = names;
        self
    }

    #[must_use]
    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn gate(&self) -> &IssuanceGate {
        &self.gate
    }

    /// Issue a token Secret for `binding`
    ///
    /// `cancel` interrupts the wait for the gate and the sleeps between reads;
    /// an intent already in the log stays there.
    pub async fn create(
        &self,
        binding: &Binding,
        config: &ConnectionConfig,
        requested_ttl: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<IssuedLease> {
        let start = Instant::now();
        let result = self.provision(binding, config, requested_ttl, cancel).await;
        match &result {
            Ok(_) => {
                metrics::increment_secrets_issued();
                metrics::observe_issue_duration(start.elapsed().as_secs_f64());
            }
            Err(e) => metrics::increment_issue_failures(e.reason()),
        }
        result
    }

    async fn provision(
        &self,
        binding: &Binding,
        config: &ConnectionConfig,
        requested_ttl: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<IssuedLease> {
        let ttl = effective_ttl(config, requested_ttl)?;

        let _permit = tokio::select! {
            permit = self.gate.acquire() => permit,
            () = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let client = self.connector.connect(config).await?;
        let intent = ProvisioningIntent {
            name: self
                .names
                .generate(&self.prefix, &binding.service_account_name),
            namespace: binding.namespace.clone(),
        };

        let wal_id = self
            .wal
            .append(RecoveryRecord::Secret(intent.clone()))
            .await?;
        debug!(
            wal_id = %wal_id,
            namespace = %intent.namespace,
            secret_name = %intent.name,
            "recorded provisioning intent"
        );

        client
            .create_token_secret(
                &intent.namespace,
                &intent.name,
                &binding.service_account_name,
            )
            .await?;

        let data = self.await_populated(client.as_ref(), &intent, cancel).await?;

        if let Err(e) = self.wal.clear(&wal_id).await {
            warn!(
                wal_id = %wal_id,
                namespace = %intent.namespace,
                secret_name = %intent.name,
                error = %e,
                "secret created but intent could not be cleared"
            );
            return Err(e);
        }

        info!(
            binding = %binding.name,
            namespace = %intent.namespace,
            secret_name = %intent.name,
            ttl_secs = ttl.as_secs(),
            "issued service account token"
        );

        Ok(IssuedLease {
            data: lease_data(&data),
            ttl,
            max_ttl: config.max_ttl,
            internal: LeaseInternal::from(intent),
            issued_at: Utc::now(),
        })
    }

    async fn await_populated(
        &self,
        client: &dyn ClusterClient,
        intent: &ProvisioningIntent,
        cancel: &CancellationToken,
    ) -> Result<SecretData> {
        for attempt in 1..=self.poll.attempts {
            metrics::increment_poll_attempts();
            let data = client
                .get_secret_data(&intent.namespace, &intent.name)
                .await?;
            if !data.is_empty() {
                return Ok(data);
            }

            debug!(
                attempt,
                namespace = %intent.namespace,
                secret_name = %intent.name,
                "secret not populated yet"
            );
            if attempt < self.poll.attempts {
                tokio::select! {
                    () = tokio::time::sleep(self.poll.interval) => {}
                    () = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
        }

        Err(Error::ConsistencyTimeout {
            namespace: intent.namespace.clone(),
            secret_name: intent.name.clone(),
            attempts: self.poll.attempts,
        })
    }
}

fn lease_data(data: &SecretData) -> LeaseData {
    let text = |key: &str| {
        data.get(key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    };
    LeaseData {
        token: text("token"),
        namespace: text("namespace"),
        ca_base64: data
            .get("ca.crt")
            .map(|ca| base64::engine::general_purpose::STANDARD.encode(ca))
            .unwrap_or_default(),
    }
}
