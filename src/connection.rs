//! # Connection Profile
//!
//! The single record describing how to reach the cluster (API URL, bearer token,
//! CA bundle) and the default/maximum lease TTLs handed out for issued Secrets.
//!
//! The record is stored under the `config` key and is always written whole:
//! a config write merges the request into the current record (or the defaults
//! when none exists) and replaces the stored value.

use crate::constants::{CONFIG_STORAGE_KEY, DEFAULT_MAX_TTL_SECS, DEFAULT_TTL_SECS};
use crate::error::{Error, Result};
use crate::storage::{self, Storage};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Connection profile for the target cluster
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Bearer token with permission to create, get and delete Secrets
    pub token: String,
    /// HTTPS endpoint of the API server
    pub api_url: String,
    /// API server CA bundle, base64 encoded PEM
    #[serde(rename = "ca")]
    pub ca_cert_base64: String,
    /// Lease TTL used when a request does not ask for one
    #[serde(rename = "ttl", with = "crate::serde_secs")]
    pub default_ttl: Duration,
    /// Upper bound for requested lease TTLs
    #[serde(with = "crate::serde_secs")]
    pub max_ttl: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: String::new(),
            ca_cert_base64: String::new(),
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            max_ttl: Duration::from_secs(DEFAULT_MAX_TTL_SECS),
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("token", &"***")
            .field("api_url", &self.api_url)
            .field("ca_cert_base64", &self.ca_cert_base64)
            .field("default_ttl", &self.default_ttl)
            .field("max_ttl", &self.max_ttl)
            .finish()
    }
}

impl ConnectionConfig {
    /// Decoded CA bundle
    pub fn ca_pem(&self) -> std::result::Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(self.ca_cert_base64.trim())
    }

    /// Local consistency checks that do not need the cluster
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl > self.max_ttl {
            return Err(Error::Validation(format!(
                "Unable to configure, validation error, ttl '{}' exceeds max-ttl '{}'",
                self.default_ttl.as_secs(),
                self.max_ttl.as_secs()
            )));
        }
        if let Err(e) = self.ca_pem() {
            return Err(Error::Validation(format!(
                "Unable to configure, validation error, unable to decode CA: {e}"
            )));
        }
        Ok(())
    }

    /// Client-visible view of the record (the token is never read back)
    #[must_use]
    pub fn view(&self) -> ConfigView {
        ConfigView {
            api_url: self.api_url.clone(),
            ca: self.ca_cert_base64.clone(),
            ttl: self.default_ttl.as_secs(),
            max_ttl: self.max_ttl.as_secs(),
        }
    }
}

/// Response of a config read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigView {
    #[serde(rename = "api-url")]
    pub api_url: String,
    #[serde(rename = "CA")]
    pub ca: String,
    pub ttl: u64,
    #[serde(rename = "max-ttl")]
    pub max_ttl: u64,
}

/// Config write request; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigWriteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, rename = "api-url", alias = "api_url", skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, rename = "CA", alias = "ca", skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
    /// Default lease TTL in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Maximum lease TTL in seconds
    #[serde(default, rename = "max-ttl", alias = "max_ttl", skip_serializing_if = "Option::is_none")]
    pub max_ttl: Option<u64>,
}

impl ConfigWriteRequest {
    /// Merge the request into `current`, or into the defaults when nothing is stored yet
    #[must_use]
    pub fn merge_into(self, current: Option<ConnectionConfig>) -> ConnectionConfig {
        let mut config = current.unwrap_or_default();
        if let Some(token) = self.token {
            config.token = token;
        }
        if let Some(api_url) = self.api_url {
            config.api_url = api_url;
        }
        if let Some(ca) = self.ca {
            config.ca_cert_base64 = ca;
        }
        if let Some(ttl) = self.ttl {
            config.default_ttl = Duration::from_secs(ttl);
        }
        if let Some(max_ttl) = self.max_ttl {
            config.max_ttl = Duration::from_secs(max_ttl);
        }
        config
    }
}

/// Storage of the connection profile
#[derive(Clone, Debug)]
pub struct ConfigStore {
    storage: Arc<dyn Storage>,
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn get(&self) -> Result<Option<ConnectionConfig>> {
        Ok(storage::get_json(self.storage.as_ref(), CONFIG_STORAGE_KEY).await?)
    }

    /// Current profile, or [`Error::Unconfigured`] when none has been written
    pub async fn require(&self) -> Result<ConnectionConfig> {
        self.get().await?.ok_or(Error::Unconfigured)
    }

    pub async fn put(&self, config: &ConnectionConfig) -> Result<()> {
        Ok(storage::put_json(self.storage.as_ref(), CONFIG_STORAGE_KEY, config).await?)
    }

    pub async fn delete(&self) -> Result<()> {
        Ok(self.storage.delete(CONFIG_STORAGE_KEY).await?)
    }
}
