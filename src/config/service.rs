//! # Service Configuration
//!
//! Process-level settings loaded from environment variables.

use crate::constants::*;
use crate::issuer::PollSettings;
use std::path::PathBuf;
use std::time::Duration;

/// Process-level configuration
///
/// All settings have defaults and can be overridden via environment variables;
/// the CLI applies its flags on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Port of the HTTP operation surface, metrics and probes
    pub listen_port: u16,
    /// Directory of the durable store; in-memory storage when unset
    pub storage_dir: Option<PathBuf>,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Reads of a freshly created Secret before giving up
    pub issue_poll_attempts: u32,
    /// Delay between two reads (milliseconds)
    pub issue_poll_interval_ms: u64,
    /// Minimum age of a WAL entry before the rollback sweep replays it (seconds)
    pub wal_rollback_min_age_secs: u64,
    /// Prefix of generated Secret names
    pub secret_name_prefix: String,
    /// Enable metrics collection
    pub enable_metrics: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
            storage_dir: None,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            issue_poll_attempts: DEFAULT_ISSUE_POLL_ATTEMPTS,
            issue_poll_interval_ms: DEFAULT_ISSUE_POLL_INTERVAL_MS,
            wal_rollback_min_age_secs: DEFAULT_WAL_ROLLBACK_MIN_AGE_SECS,
            secret_name_prefix: DEFAULT_SECRET_NAME_PREFIX.to_string(),
            enable_metrics: true,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            listen_port: env_var_or_default("LISTEN_PORT", DEFAULT_LISTEN_PORT),
            storage_dir: std::env::var_os("STORAGE_DIR")
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            issue_poll_attempts: env_var_or_default(
                "ISSUE_POLL_ATTEMPTS",
                DEFAULT_ISSUE_POLL_ATTEMPTS,
            ),
            issue_poll_interval_ms: env_var_or_default(
                "ISSUE_POLL_INTERVAL_MS",
                DEFAULT_ISSUE_POLL_INTERVAL_MS,
            ),
            wal_rollback_min_age_secs: env_var_or_default(
                "WAL_ROLLBACK_MIN_AGE_SECS",
                DEFAULT_WAL_ROLLBACK_MIN_AGE_SECS,
            ),
            secret_name_prefix: env_var_or_default_str(
                "SECRET_NAME_PREFIX",
                DEFAULT_SECRET_NAME_PREFIX,
            ),
            enable_metrics: env_var_or_default_bool("ENABLE_METRICS", true),
        }
    }

    #[must_use]
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings::new(
            self.issue_poll_attempts,
            Duration::from_millis(self.issue_poll_interval_ms),
        )
    }

    /// Get WAL rollback minimum age duration
    #[must_use]
    pub fn wal_rollback_min_age(&self) -> Duration {
        Duration::from_secs(self.wal_rollback_min_age_secs)
    }

    /// Tracing filter directive derived from `log_level`
    #[must_use]
    pub fn log_filter(&self) -> String {
        format!("k8s_secrets_engine={}", self.log_level.to_lowercase())
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
