//! # Recovery Log
//!
//! Write-ahead log of in-flight provisioning intents.
//!
//! An intent is appended before the cluster is touched and cleared only once the
//! created Secret has been confirmed populated. Anything still in the log after a
//! crash or a failed issuance is replayed by the host into a revoke, so every
//! interrupted creation converges to "Secret absent".
//!
//! Entries live at `wal/<uuid>` as JSON:
//!
//! ```json
//! { "kind": "secret", "data": { "name": "vault-web-k3j9x0qa", "namespace": "apps" }, "created_at": "..." }
//! ```

use crate::constants::{WAL_KIND_SECRET, WAL_STORAGE_PREFIX};
use crate::error::{Error, Result};
use crate::storage::{self, Storage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Intent to create one token Secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningIntent {
    /// Generated Secret name
    pub name: String,
    pub namespace: String,
}

/// Recovery record types, one variant per WAL kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryRecord {
    Secret(ProvisioningIntent),
}

impl RecoveryRecord {
    /// Decode a host-supplied `(kind, payload)` pair
    pub fn decode(kind: &str, payload: serde_json::Value) -> Result<Self> {
        match kind {
            WAL_KIND_SECRET => Ok(RecoveryRecord::Secret(serde_json::from_value(payload)?)),
            other => Err(Error::UnknownRecoveryKind(other.to_string())),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RecoveryRecord::Secret(_) => WAL_KIND_SECRET,
        }
    }

    /// Payload stored alongside the kind
    pub fn payload(&self) -> Result<serde_json::Value> {
        match self {
            RecoveryRecord::Secret(intent) => Ok(serde_json::to_value(intent)?),
        }
    }
}

/// Opaque position of an entry in the log
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalId(String);

impl WalId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn storage_key(&self) -> String {
        format!("{WAL_STORAGE_PREFIX}{}", self.0)
    }
}

impl From<String> for WalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for WalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    kind: String,
    data: serde_json::Value,
    created_at: DateTime<Utc>,
}

/// Entry read back from the log
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    pub id: WalId,
    pub record: RecoveryRecord,
    pub created_at: DateTime<Utc>,
}

/// Append-only log of provisioning intents
#[derive(Clone, Debug)]
pub struct RecoveryLog {
    storage: Arc<dyn Storage>,
}

impl RecoveryLog {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Durably record `record`; nothing external has happened if this fails
    pub async fn append(&self, record: RecoveryRecord) -> Result<WalId> {
        let id = WalId::generate();
        let entry = StoredEntry {
            kind: record.kind().to_string(),
            data: record.payload()?,
            created_at: Utc::now(),
        };
        storage::put_json(self.storage.as_ref(), &id.storage_key(), &entry).await?;
        Ok(id)
    }

    /// Remove a committed entry; clearing an absent entry succeeds
    pub async fn clear(&self, id: &WalId) -> Result<()> {
        self.storage
            .delete(&id.storage_key())
            .await
            .map_err(|source| Error::WalCommit {
                id: id.to_string(),
                source,
            })
    }

    pub async fn get(&self, id: &WalId) -> Result<Option<WalEntry>> {
        let stored: Option<StoredEntry> =
            storage::get_json(self.storage.as_ref(), &id.storage_key()).await?;
        let Some(stored) = stored else {
            return Ok(None);
        };
        Ok(Some(WalEntry {
            id: id.clone(),
            record: RecoveryRecord::decode(&stored.kind, stored.data)?,
            created_at: stored.created_at,
        }))
    }

    /// Ids of all uncleared entries
    pub async fn list(&self) -> Result<Vec<WalId>> {
        Ok(self
            .storage
            .list(WAL_STORAGE_PREFIX)
            .await?
            .into_iter()
            .map(WalId)
            .collect())
    }

    /// Entries at least `min_age` old at `now`, oldest first
    ///
    /// An entry that cannot be read or decoded never blocks the others; its id
    /// is returned in [`Pending::unreadable`] and it stays in the log.
    pub async fn pending(&self, min_age: Duration, now: DateTime<Utc>) -> Result<Pending> {
        let min_age = chrono::Duration::from_std(min_age).unwrap_or(chrono::Duration::MAX);
        let mut pending = Pending::default();
        for id in self.list().await? {
            match self.get(&id).await {
                Ok(Some(entry)) => {
                    if now.signed_duration_since(entry.created_at) >= min_age {
                        pending.entries.push(entry);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(wal_id = %id, error = %e, "skipping unreadable WAL entry");
                    pending.unreadable.push(id);
                }
            }
        }
        pending.entries.sort_by_key(|entry| entry.created_at);
        Ok(pending)
    }
}

/// Result of [`RecoveryLog::pending`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pending {
    pub entries: Vec<WalEntry>,
    pub unreadable: Vec<WalId>,
}
