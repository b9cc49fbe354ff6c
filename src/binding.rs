//! # Bindings
//!
//! A binding maps a logical name to a ServiceAccount in a cluster namespace.
//! Issuance requests refer to bindings by name; the engine creates token Secrets
//! for the bound ServiceAccount. Permissions stay in the cluster and are not
//! managed here.

use crate::constants::BINDING_STORAGE_PREFIX;
use crate::error::{Error, Result};
use crate::storage::{self, Storage};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

static BINDING_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w(([\w.-]+)?\w)?$").expect("binding name pattern is a valid regex")
});

/// Named mapping to a cluster ServiceAccount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub namespace: String,
    #[serde(rename = "service-account-name")]
    pub service_account_name: String,
}

/// Binding write request
///
/// Creating a binding requires both `namespace` and `service_account_name`;
/// updating one patches only the fields present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingWriteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(
        default,
        rename = "service-account-name",
        alias = "service_account_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub service_account_name: Option<String>,
}

/// Validate a binding name against the host's generic name pattern
pub fn validate_binding_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("name is required".to_string()));
    }
    if !BINDING_NAME_PATTERN.is_match(name) {
        return Err(Error::Validation(format!("invalid binding name '{name}'")));
    }
    Ok(())
}

fn storage_key(name: &str) -> String {
    format!("{BINDING_STORAGE_PREFIX}{name}")
}

/// Storage of bindings under `sa/<name>`
#[derive(Clone, Debug)]
pub struct BindingRegistry {
    storage: Arc<dyn Storage>,
}

impl BindingRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn get(&self, name: &str) -> Result<Option<Binding>> {
        validate_binding_name(name)?;
        Ok(storage::get_json(self.storage.as_ref(), &storage_key(name)).await?)
    }

    /// Resolve a binding for issuance, failing with a client-facing not-found error
    pub async fn lookup(&self, name: &str) -> Result<Binding> {
        self.get(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("ServiceAccount '{name}' not found")))
    }

    /// Create or patch a binding
    pub async fn write(&self, name: &str, request: BindingWriteRequest) -> Result<Binding> {
        let binding = match self.get(name).await? {
            Some(mut existing) => {
                if let Some(namespace) = request.namespace {
                    existing.namespace = namespace;
                }
                if let Some(service_account_name) = request.service_account_name {
                    existing.service_account_name = service_account_name;
                }
                existing
            }
            None => {
                let namespace = request
                    .namespace
                    .ok_or_else(|| Error::Validation("namespace is required".to_string()))?;
                let service_account_name = request.service_account_name.ok_or_else(|| {
                    Error::Validation("service-account-name is required".to_string())
                })?;
                Binding {
                    name: name.to_string(),
                    namespace,
                    service_account_name,
                }
            }
        };

        storage::put_json(self.storage.as_ref(), &storage_key(name), &binding).await?;
        Ok(binding)
    }

    /// Delete a binding; deleting an unknown name succeeds
    pub async fn delete(&self, name: &str) -> Result<()> {
        validate_binding_name(name)?;
        Ok(self.storage.delete(&storage_key(name)).await?)
    }

    /// Names of all bindings, in ascending order
    pub async fn list(&self) -> Result<Vec<String>> {
        Ok(self.storage.list(BINDING_STORAGE_PREFIX).await?)
    }
}
