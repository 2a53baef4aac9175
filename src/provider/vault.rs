//! Vault-style KV reference backend.
//!
//! Minimal KV version 2 wire client over reqwest:
//! - `GET /v1/<mount>/data/<path>` reads a secret document; the value is the
//!   field named after the ref's terminal name.
//! - `GET /v1/<mount>/metadata/<path>?list=true` lists child keys; entries
//!   with a trailing `/` are directories and are excluded.
//! - `POST /v1/<mount>/data/<path>` writes `{"data": {<name>: <value>}}`.
//!
//! The mount point is fixed to `secret`, the default KV v2 mount.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::SyncError;
use crate::model::{SecretQuery, SecretRef};
use crate::provider::{
    Provider, ProviderConfig, StoreClient, StoreReader, StoreWriter, VaultConfig,
};

const DEFAULT_MOUNT: &str = "secret";
const TOKEN_HEADER: &str = "X-Vault-Token";

pub struct VaultProvider;

#[async_trait]
impl Provider for VaultProvider {
    fn name(&self) -> &'static str {
        "vault"
    }

    fn validate(&self, config: &ProviderConfig) -> Result<(), SyncError> {
        let ProviderConfig::Vault(vault) = config else {
            return Err(SyncError::BackendValidation {
                backend: "vault",
                reason: "vault backend not configured".into(),
            });
        };
        if vault.address.is_empty() {
            return Err(SyncError::BackendValidation {
                backend: "vault",
                reason: "empty address".into(),
            });
        }
        if vault.token.as_deref().unwrap_or_default().is_empty()
            && vault.token_path.as_deref().unwrap_or_default().is_empty()
        {
            return Err(SyncError::BackendValidation {
                backend: "vault",
                reason: "one of token or tokenPath required".into(),
            });
        }
        Ok(())
    }

    async fn new_client(&self, config: &ProviderConfig) -> Result<Arc<dyn StoreClient>, SyncError> {
        self.validate(config)?;
        match config {
            ProviderConfig::Vault(vault) => Ok(Arc::new(VaultStore::new(vault).await?)),
            _ => Err(SyncError::BackendValidation {
                backend: "vault",
                reason: "vault backend not configured".into(),
            }),
        }
    }
}

/// KV read response: `{"data": {"data": {...}, "metadata": {...}}}`.
#[derive(Debug, Deserialize)]
struct KvReadResponse {
    data: Option<KvReadData>,
}

#[derive(Debug, Deserialize)]
struct KvReadData {
    data: Option<serde_json::Map<String, Value>>,
}

/// KV list response: `{"data": {"keys": ["a", "dir/"]}}`.
#[derive(Debug, Deserialize)]
struct KvListResponse {
    data: Option<KvListData>,
}

#[derive(Debug, Deserialize)]
struct KvListData {
    keys: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct KvWriteRequest {
    data: serde_json::Map<String, Value>,
}

pub struct VaultStore {
    http_client: Client,
    address: String,
    token: String,
    mount: String,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("address", &self.address)
            .field("mount", &self.mount)
            .finish_non_exhaustive()
    }
}

impl VaultStore {
    pub async fn new(config: &VaultConfig) -> Result<Self, SyncError> {
        let token = match config.token.as_deref() {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => {
                let path = config.token_path.as_deref().unwrap_or_default();
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read token file {path}"))?;
                raw.trim().to_string()
            }
        };

        let http_client = Client::builder()
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            http_client,
            address: config.address.trim_end_matches('/').to_string(),
            token,
            mount: DEFAULT_MOUNT.to_string(),
        })
    }

    fn url(&self, segment: &str, path: &str) -> String {
        format!("{}/v1/{}/{}/{}", self.address, self.mount, segment, path)
    }

    /// Document path for a ref: the ref's path components, or the terminal
    /// name when the ref has no path. The terminal name addresses a field
    /// inside the document.
    fn document_path(secret_ref: &SecretRef) -> String {
        let path = secret_ref.path();
        if path.is_empty() {
            secret_ref.name().to_string()
        } else {
            path.join("/")
        }
    }
}

#[async_trait]
impl StoreReader for VaultStore {
    async fn get_secret(&self, secret_ref: &SecretRef) -> Result<Vec<u8>, SyncError> {
        let mut request = self
            .http_client
            .get(self.url("data", &Self::document_path(secret_ref)))
            .header(TOKEN_HEADER, &self.token);
        if let Some(version) = &secret_ref.version {
            request = request.query(&[("version", version)]);
        }

        let response = request.send().await.context("vault get request failed")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SyncError::KeyNotFound);
        }
        let response = response
            .error_for_status()
            .context("vault get request failed")?;

        let body: KvReadResponse = response
            .json()
            .await
            .context("failed to parse vault get response")?;
        let fields = body
            .data
            .and_then(|data| data.data)
            .ok_or_else(|| SyncError::BackendIo(anyhow!("vault get returned empty data")))?;

        match fields.get(secret_ref.name()) {
            Some(Value::String(value)) => Ok(value.clone().into_bytes()),
            Some(value) => Ok(value.to_string().into_bytes()),
            None => Err(SyncError::BackendIo(anyhow!(
                "could not find {} in get response",
                secret_ref.name()
            ))),
        }
    }

    async fn list_secret_keys(&self, query: &SecretQuery) -> Result<Vec<SecretRef>, SyncError> {
        let matcher = Regex::new(&query.key.regexp)
            .map_err(|err| SyncError::BackendIo(anyhow!("invalid key regexp: {err}")))?;
        let query_path = query
            .path
            .as_deref()
            .unwrap_or_default()
            .trim_matches('/')
            .to_string();

        let response = self
            .http_client
            .get(self.url("metadata", &query_path))
            .query(&[("list", "true")])
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await
            .context("vault list request failed")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SyncError::KeyNotFound);
        }
        let response = response
            .error_for_status()
            .context("vault list request failed")?;

        let body: KvListResponse = response
            .json()
            .await
            .context("failed to parse vault list response")?;
        let keys = body
            .data
            .and_then(|data| data.keys)
            .ok_or_else(|| SyncError::BackendIo(anyhow!("vault list returned empty data")))?;

        let mut refs = Vec::new();
        for name in keys {
            // Entries with a trailing '/' are directories, not keys.
            if name.ends_with('/') {
                continue;
            }
            let key = if query_path.is_empty() {
                name
            } else {
                format!("{query_path}/{name}")
            };
            if matcher.is_match(&key) {
                refs.push(SecretRef::new(key));
            }
        }
        Ok(refs)
    }
}

#[async_trait]
impl StoreWriter for VaultStore {
    async fn set_secret(&self, secret_ref: &SecretRef, value: &[u8]) -> Result<(), SyncError> {
        let mut data = serde_json::Map::new();
        data.insert(
            secret_ref.name().to_string(),
            json!(String::from_utf8_lossy(value)),
        );

        let response = self
            .http_client
            .post(self.url("data", &Self::document_path(secret_ref)))
            .header(TOKEN_HEADER, &self.token)
            .json(&KvWriteRequest { data })
            .send()
            .await
            .context("vault set request failed")?;
        response
            .error_for_status()
            .context("vault set request failed")?;

        Ok(())
    }
}
