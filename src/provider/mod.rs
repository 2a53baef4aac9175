//! Store backends.
//!
//! A backend is addressed by a discriminator string (`"vault"`, `"file"`) and
//! sits behind the [`Provider`] factory trait. Clients implement the
//! [`StoreReader`] / [`StoreWriter`] contract; both must be safe for
//! concurrent callers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SyncError;
use crate::model::{SecretQuery, SecretRef};

pub mod file;
pub mod vault;

pub use file::FileProvider;
pub use vault::VaultProvider;

/// Read operations of a secret backend.
#[async_trait]
pub trait StoreReader: Send + Sync {
    /// Returns a single secret. Fails with [`SyncError::KeyNotFound`] on miss.
    async fn get_secret(&self, secret_ref: &SecretRef) -> Result<Vec<u8>, SyncError>;

    /// Lists terminal keys matching the query. Directory entries are excluded
    /// and duplicates must not appear; order is unspecified.
    async fn list_secret_keys(&self, query: &SecretQuery) -> Result<Vec<SecretRef>, SyncError>;
}

/// Write operations of a secret backend. Writing the same bytes twice is
/// permitted.
#[async_trait]
pub trait StoreWriter: Send + Sync {
    async fn set_secret(&self, secret_ref: &SecretRef, value: &[u8]) -> Result<(), SyncError>;
}

/// Unified read and write ops for one backend.
pub trait StoreClient: StoreReader + StoreWriter {}

impl<T: StoreReader + StoreWriter> StoreClient for T {}

impl std::fmt::Debug for dyn StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn StoreClient")
    }
}

/// Factory and validator behind a backend discriminator.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The discriminator this provider registers under.
    fn name(&self) -> &'static str;

    /// Checks the backend-specific configuration for completeness.
    fn validate(&self, config: &ProviderConfig) -> Result<(), SyncError>;

    /// Constructs a store client from validated configuration.
    async fn new_client(&self, config: &ProviderConfig) -> Result<Arc<dyn StoreClient>, SyncError>;
}

/// Store access mode. `ReadWrite` satisfies both single modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorePermissions {
    Read,
    Write,
    #[default]
    ReadWrite,
}

impl StorePermissions {
    pub fn can_read(self) -> bool {
        matches!(self, StorePermissions::Read | StorePermissions::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, StorePermissions::Write | StorePermissions::ReadWrite)
    }
}

/// A configured secret store: access mode plus backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretStoreConfig {
    #[serde(default)]
    pub permissions: StorePermissions,

    pub provider: ProviderConfig,
}

/// Vault-style KV backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
    pub address: String,

    #[serde(default)]
    pub unseal_keys_path: Option<String>,

    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub auth_path: Option<String>,

    /// File to read the client token from when `token` is not set inline.
    #[serde(default)]
    pub token_path: Option<String>,

    #[serde(default)]
    pub token: Option<String>,
}

/// Filesystem backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub dir_path: std::path::PathBuf,
}

/// Backend selection: exactly one sub-object must be populated in the wire
/// form. Zero or multiple populated sub-objects are rejected during
/// deserialization, so every constructed value is already valid.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderConfig {
    #[serde(rename = "vault")]
    Vault(VaultConfig),
    #[serde(rename = "file")]
    File(FileConfig),
}

impl ProviderConfig {
    /// Backend discriminator used as the registry key.
    pub fn discriminator(&self) -> &'static str {
        match self {
            ProviderConfig::Vault(_) => "vault",
            ProviderConfig::File(_) => "file",
        }
    }
}

impl<'de> Deserialize<'de> for ProviderConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ProviderConfigVisitor;

        impl<'de> Visitor<'de> for ProviderConfigVisitor {
            type Value = ProviderConfig;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a provider config object with exactly one of vault or file")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut vault: Option<VaultConfig> = None;
                let mut file: Option<FileConfig> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "vault" => {
                            if vault.is_some() {
                                return Err(de::Error::duplicate_field("vault"));
                            }
                            vault = Some(map.next_value()?);
                        }
                        "file" => {
                            if file.is_some() {
                                return Err(de::Error::duplicate_field("file"));
                            }
                            file = Some(map.next_value()?);
                        }
                        _ => {
                            let _: IgnoredAny = map.next_value()?;
                        }
                    }
                }

                match (vault, file) {
                    (Some(config), None) => Ok(ProviderConfig::Vault(config)),
                    (None, Some(config)) => Ok(ProviderConfig::File(config)),
                    (None, None) => Err(de::Error::missing_field("vault or file")),
                    _ => Err(de::Error::custom("multiple provider backends specified")),
                }
            }
        }

        deserializer.deserialize_map(ProviderConfigVisitor)
    }
}

/// Name-keyed table of backend providers.
///
/// Registration is write-once: registering the same discriminator twice is a
/// fatal configuration error. The registry is a value held by whoever owns
/// the process, initialized once and read-only afterwards.
pub struct ProviderRegistry {
    providers: RwLock<HashMap<&'static str, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// A registry with the built-in backends registered.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(FileProvider));
        registry.register(Arc::new(VaultProvider));
        registry
    }

    /// Registers a provider under its discriminator.
    ///
    /// # Panics
    ///
    /// Panics if the discriminator is already registered.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let name = provider.name();
        let mut providers = self.providers.write().expect("provider registry poisoned");
        if providers.contains_key(name) {
            panic!("store backend {name} already registered");
        }
        providers.insert(name, provider);
    }

    /// Looks up the provider for a backend configuration.
    pub fn get(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>, SyncError> {
        let providers = self.providers.read().expect("provider registry poisoned");
        providers
            .get(config.discriminator())
            .cloned()
            .ok_or_else(|| SyncError::UnknownBackend(config.discriminator().to_string()))
    }

    /// Composes lookup, validation and client construction.
    pub async fn new_client(
        &self,
        config: &SecretStoreConfig,
    ) -> Result<Arc<dyn StoreClient>, SyncError> {
        let provider = self.get(&config.provider)?;
        provider.validate(&config.provider)?;
        provider.new_client(&config.provider).await
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
