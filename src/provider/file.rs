//! Filesystem reference backend.
//!
//! Each ref maps to a regular file at `<root>/<path components>/<name>`.
//! Listing walks the tree, normalizes OS separators to `/`, and applies the
//! query regex to the slash-normalized key relative to the store root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use regex::Regex;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::SyncError;
use crate::model::{SecretQuery, SecretRef};
use crate::provider::{
    Provider, ProviderConfig, StoreClient, StoreReader, StoreWriter,
};

pub struct FileProvider;

#[async_trait]
impl Provider for FileProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    fn validate(&self, config: &ProviderConfig) -> Result<(), SyncError> {
        let ProviderConfig::File(file) = config else {
            return Err(SyncError::BackendValidation {
                backend: "file",
                reason: "file backend not configured".into(),
            });
        };
        if file.dir_path.as_os_str().is_empty() {
            return Err(SyncError::BackendValidation {
                backend: "file",
                reason: "empty dirPath".into(),
            });
        }
        Ok(())
    }

    async fn new_client(&self, config: &ProviderConfig) -> Result<Arc<dyn StoreClient>, SyncError> {
        self.validate(config)?;
        match config {
            ProviderConfig::File(file) => Ok(Arc::new(FileStore {
                root: file.dir_path.clone(),
            })),
            _ => Err(SyncError::BackendValidation {
                backend: "file",
                reason: "file backend not configured".into(),
            }),
        }
    }
}

/// Store client over a directory tree. Versions are not supported by this
/// backend; the `version` of a ref is ignored.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file_path(&self, secret_ref: &SecretRef) -> PathBuf {
        let mut path = self.root.clone();
        for component in secret_ref.path() {
            path.push(component);
        }
        path.push(secret_ref.name());
        path
    }

    /// Slash-normalized key of a walked file, relative to the store root.
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let components: Vec<&str> = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(components.join("/"))
    }
}

#[async_trait]
impl StoreReader for FileStore {
    async fn get_secret(&self, secret_ref: &SecretRef) -> Result<Vec<u8>, SyncError> {
        let path = self.file_path(secret_ref);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(SyncError::KeyNotFound),
            Err(err) => Err(SyncError::BackendIo(
                anyhow!(err).context(format!("failed to read {}", path.display())),
            )),
        }
    }

    async fn list_secret_keys(&self, query: &SecretQuery) -> Result<Vec<SecretRef>, SyncError> {
        let matcher = Regex::new(&query.key.regexp)
            .map_err(|err| SyncError::BackendIo(anyhow!("invalid key regexp: {err}")))?;

        let list_root = match &query.path {
            Some(path) => self.root.join(path.trim_matches('/')),
            None => self.root.clone(),
        };
        if !list_root.exists() {
            warn!(path = %list_root.display(), "query path does not exist");
            return Ok(Vec::new());
        }

        let mut refs = Vec::new();
        for entry in WalkDir::new(&list_root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = self.key_for(entry.path()) else {
                continue;
            };
            if matcher.is_match(&key) {
                refs.push(SecretRef::new(key));
            }
        }
        Ok(refs)
    }
}

#[async_trait]
impl StoreWriter for FileStore {
    async fn set_secret(&self, secret_ref: &SecretRef, value: &[u8]) -> Result<(), SyncError> {
        let path = self.file_path(secret_ref);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create dir {}", parent.display()))?;
        }
        tokio::fs::write(&path, value)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .await
                .with_context(|| format!("failed to chmod {}", path.display()))?;
        }

        Ok(())
    }
}
