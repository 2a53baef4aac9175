//! Loading of store-config and sync-plan documents.
//!
//! Both documents are YAML; JSON is accepted as well since the parser treats
//! it as a YAML subset. Actions are validated at load time so malformed plans
//! fail at setup instead of mid-run.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

use crate::model::SyncPlan;
use crate::provider::SecretStoreConfig;

/// Wire form of the store-config document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreConfigFile {
    secrets_store: SecretStoreConfig,
}

/// Loads a store config from a `secretsStore` document.
pub fn load_store_config(path: &Path) -> Result<SecretStoreConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read store config {}", path.display()))?;
    let file: StoreConfigFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse store config {}", path.display()))?;
    Ok(file.secrets_store)
}

/// Loads a sync plan and validates its actions.
pub fn load_sync_plan(path: &Path) -> Result<SyncPlan> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read sync plan {}", path.display()))?;
    let plan: SyncPlan = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse sync plan {}", path.display()))?;

    ensure!(!plan.sync.is_empty(), "sync plan has no actions");
    for (id, action) in plan.sync.iter().enumerate() {
        action
            .validate()
            .with_context(|| format!("invalid sync action {id}"))?;
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderConfig;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(contents.as_bytes()).expect("write");
        path
    }

    #[test]
    fn loads_yaml_store_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(
            &dir,
            "store.yml",
            "secretsStore:\n  permissions: Read\n  provider:\n    file:\n      dirPath: /tmp/source\n",
        );
        let config = load_store_config(&path).expect("loads");
        assert!(config.permissions.can_read());
        assert!(!config.permissions.can_write());
        assert!(matches!(config.provider, ProviderConfig::File(_)));
    }

    #[test]
    fn loads_json_store_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(
            &dir,
            "store.json",
            r#"{"secretsStore": {"provider": {"vault": {"address": "http://127.0.0.1:8200", "token": "root"}}}}"#,
        );
        let config = load_store_config(&path).expect("loads");
        assert!(matches!(config.provider, ProviderConfig::Vault(_)));
    }

    #[test]
    fn plan_without_actions_is_a_setup_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(&dir, "plan.yml", "sync: []\n");
        assert!(load_sync_plan(&path).is_err());
    }

    #[test]
    fn malformed_action_fails_at_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(
            &dir,
            "plan.yml",
            "sync:\n  - target:\n      key: out\n",
        );
        assert!(load_sync_plan(&path).is_err());
    }

    #[test]
    fn valid_plan_loads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(
            &dir,
            "plan.yml",
            "schedule: \"@daily\"\nsync:\n  - secretRef:\n      key: a\n",
        );
        let plan = load_sync_plan(&path).expect("loads");
        assert_eq!(plan.schedule.as_deref(), Some("@daily"));
        assert_eq!(plan.sync.len(), 1);
    }
}
