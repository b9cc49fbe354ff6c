//! # Recovery
//!
//! Turns uncommitted provisioning intents back into "Secret absent".
//!
//! The host calls [`Recovery::replay`] for each WAL entry it finds uncleared, or
//! [`Recovery::rollback`] to sweep every entry older than a minimum age. Each
//! record variant has one handler; for a Secret intent the handler is a revoke of
//! the intent's name and namespace, which succeeds whether or not the Secret was
//! ever created.

use crate::error::Result;
use crate::lease::{LeaseInternal, LeaseLifecycle};
use crate::observability::metrics;
use crate::wal::{RecoveryLog, RecoveryRecord, WalId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of a rollback sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    /// Entries replayed and cleared
    pub replayed: Vec<WalId>,
    /// Entries whose replay failed; they stay in the log
    pub failed: Vec<WalId>,
}

#[derive(Clone, Debug)]
pub struct Recovery {
    wal: RecoveryLog,
    lifecycle: LeaseLifecycle,
}

impl Recovery {
    pub fn new(wal: RecoveryLog, lifecycle: LeaseLifecycle) -> Self {
        Self { wal, lifecycle }
    }

    /// Undo the effect of one uncommitted record
    pub async fn replay(&self, record: &RecoveryRecord) -> Result<()> {
        let result = match record {
            RecoveryRecord::Secret(intent) => {
                self.lifecycle
                    .revoke_internal(&LeaseInternal::from(intent.clone()))
                    .await
            }
        };

        match &result {
            Ok(()) => {
                metrics::increment_wal_replayed("revoked");
                info!(kind = record.kind(), ?record, "replayed recovery record");
            }
            Err(e) => {
                metrics::increment_wal_replayed("failed");
                warn!(kind = record.kind(), ?record, error = %e, "failed to replay recovery record");
            }
        }
        result
    }

    /// Replay and clear every entry at least `min_age` old
    ///
    /// An entry whose replay or clear fails stays in the log for the next sweep
    /// and is listed in [`RollbackReport::failed`], as is any entry that cannot
    /// be decoded. Only a failure to list the log aborts the sweep.
    pub async fn rollback(&self, min_age: Duration) -> Result<RollbackReport> {
        let pending = self.wal.pending(min_age, Utc::now()).await?;
        let mut report = RollbackReport {
            failed: pending.unreadable,
            ..Default::default()
        };
        for entry in pending.entries {
            if self.replay(&entry.record).await.is_err() {
                report.failed.push(entry.id);
                continue;
            }
            match self.wal.clear(&entry.id).await {
                Ok(()) => report.replayed.push(entry.id),
                Err(e) => {
                    warn!(wal_id = %entry.id, error = %e, "replayed entry could not be cleared");
                    report.failed.push(entry.id);
                }
            }
        }

        info!(
            replayed = report.replayed.len(),
            failed = report.failed.len(),
            "rollback sweep finished"
        );
        Ok(report)
    }
}
