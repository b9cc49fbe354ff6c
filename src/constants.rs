//! # Constants
//!
//! Shared constants used throughout the engine.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for the operation surface, metrics and health probes
pub const DEFAULT_LISTEN_PORT: u16 = 8200;

/// Prefix of every cluster Secret created by the engine
pub const DEFAULT_SECRET_NAME_PREFIX: &str = "vault";

/// Alphabet for the random suffix appended to generated Secret names
pub const SECRET_NAME_SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of the random suffix appended to generated Secret names
pub const SECRET_NAME_SUFFIX_LEN: usize = 8;

/// Number of reads performed while waiting for the token controller to populate a Secret
pub const DEFAULT_ISSUE_POLL_ATTEMPTS: u32 = 5;

/// Delay between two reads of a freshly created Secret (milliseconds)
pub const DEFAULT_ISSUE_POLL_INTERVAL_MS: u64 = 1000;

/// Default lease TTL written on the first config write (seconds)
pub const DEFAULT_TTL_SECS: u64 = 1800;

/// Default maximum lease TTL written on the first config write (seconds)
pub const DEFAULT_MAX_TTL_SECS: u64 = 3600;

/// Minimum age of a WAL entry before the rollback sweep replays it (seconds)
pub const DEFAULT_WAL_ROLLBACK_MIN_AGE_SECS: u64 = 300;

/// Storage key of the connection profile
pub const CONFIG_STORAGE_KEY: &str = "config";

/// Storage prefix of binding records (`sa/<name>`)
pub const BINDING_STORAGE_PREFIX: &str = "sa/";

/// Storage prefix of write-ahead log entries (`wal/<id>`)
pub const WAL_STORAGE_PREFIX: &str = "wal/";

/// WAL kind recorded for in-flight Secret provisioning
pub const WAL_KIND_SECRET: &str = "secret";

/// Type of the Secrets the engine asks the cluster to populate
pub const SERVICE_ACCOUNT_TOKEN_SECRET_TYPE: &str = "kubernetes.io/service-account-token";

/// Annotation binding a token Secret to its ServiceAccount
pub const SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubernetes.io/service-account.name";

/// Label marking Secrets created by the engine
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY_VALUE: &str = "k8s-secrets-engine";

/// Connect timeout for cluster clients (seconds)
pub const DEFAULT_CLUSTER_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Read timeout for cluster clients (seconds)
pub const DEFAULT_CLUSTER_READ_TIMEOUT_SECS: u64 = 30;
