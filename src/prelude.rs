//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use k8s_secrets_engine::prelude::*;
//! ```

pub use crate::backend::{Backend, BackendBuilder, IssueRequest, ReplayRequest};
pub use crate::binding::{Binding, BindingRegistry, BindingWriteRequest};
pub use crate::cluster::{ClusterClient, ClusterConnector, ClusterError, SecretData};
pub use crate::connection::{ConfigStore, ConfigView, ConfigWriteRequest, ConnectionConfig};
pub use crate::error::{Error, Result};
pub use crate::issuer::{IssuanceGate, NameGenerator, PollSettings, SecretIssuer};
pub use crate::lease::{IssuedLease, LeaseData, LeaseInternal, LeaseLifecycle, LeaseResponse};
pub use crate::recovery::{Recovery, RollbackReport};
pub use crate::storage::{Storage, StorageError};
pub use crate::wal::{Pending, ProvisioningIntent, RecoveryLog, RecoveryRecord, WalId};
