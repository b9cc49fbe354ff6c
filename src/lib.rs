//! # k8s-secrets-engine
//!
//! Dynamic Kubernetes ServiceAccount token issuance with crash-safe provisioning
//! and lease lifecycle management.
//!
//! The engine issues token Secrets for named bindings and reacts to the renew and
//! revoke callbacks of an external lease manager. Every issuance is recorded in a
//! write-ahead log before the cluster is touched, so an interrupted creation can
//! always be rolled back into "Secret absent".
//!
//! - [`backend::Backend`]: operation surface (config, bindings, issue, renew,
//!   revoke, replay, rollback)
//! - [`issuer::SecretIssuer`]: provisioning protocol and consistency poll
//! - [`lease::LeaseLifecycle`]: renew and revoke
//! - [`wal::RecoveryLog`] and [`recovery::Recovery`]: crash recovery
//! - [`server`]: HTTP transport, metrics and probes

pub mod backend;
pub mod binding;
pub mod cluster;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod issuer;
pub mod lease;
pub mod observability;
pub mod prelude;
pub mod recovery;
mod serde_secs;
pub mod server;
pub mod storage;
pub mod wal;

pub use error::{Error, Result};
