//! # Errors
//!
//! Error type shared by every engine operation.
//!
//! Errors fall into two groups:
//! - **user errors** (validation, not found, unconfigured, policy violation) are
//!   reported to the client as a response message and never mutate state
//! - **hard failures** (storage, cluster, consistency timeout, WAL commit) mean the
//!   operation did not complete; any WAL intent written before the failure stays
//!   in place for recovery

use crate::cluster::ClusterError;
use crate::storage::StorageError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("backend is not configured, write the connection settings to 'config' first")]
    Unconfigured,

    #[error("Max TTL configured to '{}', you try to create TTL '{}'", .max.as_secs(), .requested.as_secs())]
    PolicyViolation { max: Duration, requested: Duration },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("secret {namespace}/{secret_name} was not populated after {attempts} attempts")]
    ConsistencyTimeout {
        namespace: String,
        secret_name: String,
        attempts: u32,
    },

    #[error("failed to commit WAL entry {id}: {source}")]
    WalCommit {
        id: String,
        #[source]
        source: StorageError,
    },

    #[error("unknown kind to rollback: {0}")]
    UnknownRecoveryKind(String),

    #[error("failed to decode record: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the error is a client-facing response error rather than a hard failure
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::NotFound(_)
                | Error::Unconfigured
                | Error::PolicyViolation { .. }
        )
    }

    /// Short, stable label used for metrics
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Unconfigured => "unconfigured",
            Error::PolicyViolation { .. } => "policy_violation",
            Error::Storage(_) => "storage",
            Error::Cluster(_) => "cluster",
            Error::ConsistencyTimeout { .. } => "consistency_timeout",
            Error::WalCommit { .. } => "wal_commit",
            Error::UnknownRecoveryKind(_) => "unknown_recovery_kind",
            Error::Codec(_) => "codec",
            Error::Cancelled => "cancelled",
        }
    }
}
