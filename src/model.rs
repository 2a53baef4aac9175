//! Data model for sync plans.
//!
//! These types mirror the wire format of the sync plan document (YAML, also
//! accepted as JSON). The "exactly one populated" rules of the wire format are
//! checked at construction time via [`SyncAction::validate`]; the accessors
//! ([`SyncAction::from`], [`SyncAction::target_shape`], [`SecretSource::selector`])
//! return the validated tagged view used by the planner.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// A pointer to one secret in a store.
///
/// `key` is a slash-delimited path ending in a terminal name. Two refs are
/// equal iff both `key` and `version` compare equal; a missing version and a
/// present version are distinct. Equality defines the collision granularity
/// during orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl SecretRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version: None,
        }
    }

    fn sanitized_key(&self) -> &str {
        self.key.trim_matches('/')
    }

    /// Path components before the terminal name, e.g. `/a/b/c` -> `["a", "b"]`.
    pub fn path(&self) -> Vec<&str> {
        let mut parts: Vec<&str> = self.sanitized_key().split('/').collect();
        parts.pop();
        parts
    }

    /// Terminal name, e.g. `/a/b/c` -> `"c"`.
    pub fn name(&self) -> &str {
        self.sanitized_key().split('/').next_back().unwrap_or("")
    }
}

/// A lazy multi-ref description. Evaluation re-lists on every use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretQuery {
    /// Root path for the listing. Store root when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    pub key: Query,
}

/// Matcher applied to post-list key strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Anchor-free regular expression.
    pub regexp: String,
}

/// A named selector used inside multi-source actions. The name becomes a
/// template field; exactly one of `secret_ref` / `secret_query` is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSource {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_query: Option<SecretQuery>,
}

/// Validated view over a [`SecretSource`].
#[derive(Debug, Clone, Copy)]
pub enum SourceSelector<'a> {
    Ref(&'a SecretRef),
    Query(&'a SecretQuery),
}

impl SecretSource {
    pub fn selector(&self) -> Result<SourceSelector<'_>, SyncError> {
        match (&self.secret_ref, &self.secret_query) {
            (Some(secret_ref), None) => Ok(SourceSelector::Ref(secret_ref)),
            (None, Some(query)) => Ok(SourceSelector::Query(query)),
            (None, None) => Err(SyncError::InvalidPlan(format!(
                "source {:?} has neither secretRef nor secretQuery",
                self.name
            ))),
            (Some(_), Some(_)) => Err(SyncError::InvalidPlan(format!(
                "source {:?} has both secretRef and secretQuery",
                self.name
            ))),
        }
    }
}

/// Write destination shape. At most one of `key` / `key_prefix`; both absent
/// means "write at the source ref", which is only valid for ref actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,
}

/// Validated view over an action's target.
#[derive(Debug, Clone, Copy)]
pub enum TargetShape<'a> {
    /// No target configured; write intents keep the source ref.
    Origin,
    Key(&'a str),
    KeyPrefix(&'a str),
}

/// Transformation applied to fetched material before writing.
///
/// Exactly one of `raw_data` (string template producing bytes) or `data`
/// (map of string templates producing a JSON object of the same keys).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,
}

impl SyncTemplate {
    pub fn is_empty(&self) -> bool {
        self.raw_data.is_none() && self.data.as_ref().is_none_or(BTreeMap::is_empty)
    }
}

/// Validated view over an action's fetch side.
#[derive(Debug, Clone, Copy)]
pub enum ActionFrom<'a> {
    Ref(&'a SecretRef),
    Query(&'a SecretQuery),
    Sources(&'a [SecretSource]),
}

/// One unit of work: read these, optionally template, write there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_query: Option<SecretQuery>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_sources: Vec<SecretSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<SyncTarget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flatten: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<SyncTemplate>,
}

impl SyncAction {
    /// Checks the "exactly one populated" wire rules. The planner calls this
    /// before dispatch; config loading calls it so malformed plans fail at
    /// setup rather than mid-run.
    pub fn validate(&self) -> Result<(), SyncError> {
        let populated = [
            self.secret_ref.is_some(),
            self.secret_query.is_some(),
            !self.secret_sources.is_empty(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if populated != 1 {
            return Err(SyncError::InvalidPlan(format!(
                "exactly one of secretRef, secretQuery, secretSources required, found {populated}"
            )));
        }

        if let Some(target) = &self.target {
            if target.key.is_some() && target.key_prefix.is_some() {
                return Err(SyncError::InvalidPlan(
                    "target cannot have both key and keyPrefix".into(),
                ));
            }
        }

        let mut names = std::collections::HashSet::new();
        for source in &self.secret_sources {
            source.selector()?;
            if !names.insert(source.name.as_str()) {
                return Err(SyncError::InvalidPlan(format!(
                    "duplicate source name {:?}",
                    source.name
                )));
            }
        }

        Ok(())
    }

    pub fn from(&self) -> Result<ActionFrom<'_>, SyncError> {
        match (&self.secret_ref, &self.secret_query, &self.secret_sources) {
            (Some(secret_ref), None, sources) if sources.is_empty() => {
                Ok(ActionFrom::Ref(secret_ref))
            }
            (None, Some(query), sources) if sources.is_empty() => Ok(ActionFrom::Query(query)),
            (None, None, sources) if !sources.is_empty() => Ok(ActionFrom::Sources(sources)),
            _ => Err(SyncError::InvalidPlan(
                "exactly one of secretRef, secretQuery, secretSources required".into(),
            )),
        }
    }

    pub fn target_shape(&self) -> Result<TargetShape<'_>, SyncError> {
        match &self.target {
            None => Ok(TargetShape::Origin),
            Some(target) => match (&target.key, &target.key_prefix) {
                (Some(key), None) => Ok(TargetShape::Key(key)),
                (None, Some(prefix)) => Ok(TargetShape::KeyPrefix(prefix)),
                (None, None) => Ok(TargetShape::Origin),
                (Some(_), Some(_)) => Err(SyncError::InvalidPlan(
                    "target cannot have both key and keyPrefix".into(),
                )),
            },
        }
    }

    /// Template to apply, with an empty template treated as absent.
    pub fn effective_template(&self) -> Option<&SyncTemplate> {
        self.template
            .as_ref()
            .filter(|template| !template.is_empty())
    }
}

/// The top-level plan document: a scheduled list of actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlan {
    /// CRON schedule. One-shot when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    /// Per-run audit records are appended here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log_path: Option<String>,

    #[serde(default)]
    pub sync: Vec<SyncAction>,
}

impl SyncPlan {
    /// Audit log destination, defaulting to `<OS temp>/sync-audit.log`.
    pub fn audit_log_file(&self) -> PathBuf {
        match &self.audit_log_path {
            Some(path) => PathBuf::from(path),
            None => std::env::temp_dir().join("sync-audit.log"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_path_and_name_derivation() {
        let secret_ref = SecretRef::new("/a/b/c");
        assert_eq!(secret_ref.path(), vec!["a", "b"]);
        assert_eq!(secret_ref.name(), "c");

        let flat = SecretRef::new("token");
        assert!(flat.path().is_empty());
        assert_eq!(flat.name(), "token");

        let trailing = SecretRef::new("db/creds/");
        assert_eq!(trailing.path(), vec!["db"]);
        assert_eq!(trailing.name(), "creds");
    }

    #[test]
    fn ref_equality_includes_version() {
        let unversioned = SecretRef::new("a/b");
        let versioned = SecretRef {
            key: "a/b".into(),
            version: Some("2".into()),
        };
        assert_ne!(unversioned, versioned);
        assert_eq!(unversioned, SecretRef::new("a/b"));
    }

    #[test]
    fn action_requires_exactly_one_from() {
        let empty = SyncAction::default();
        assert!(matches!(empty.validate(), Err(SyncError::InvalidPlan(_))));

        let both = SyncAction {
            secret_ref: Some(SecretRef::new("a")),
            secret_query: Some(SecretQuery {
                path: None,
                key: Query { regexp: ".*".into() },
            }),
            ..Default::default()
        };
        assert!(matches!(both.validate(), Err(SyncError::InvalidPlan(_))));

        let single = SyncAction {
            secret_ref: Some(SecretRef::new("a")),
            ..Default::default()
        };
        assert!(single.validate().is_ok());
    }

    #[test]
    fn action_rejects_ambiguous_target() {
        let action = SyncAction {
            secret_ref: Some(SecretRef::new("a")),
            target: Some(SyncTarget {
                key: Some("x".into()),
                key_prefix: Some("y/".into()),
            }),
            ..Default::default()
        };
        assert!(matches!(action.validate(), Err(SyncError::InvalidPlan(_))));
    }

    #[test]
    fn action_rejects_duplicate_source_names() {
        let action = SyncAction {
            secret_sources: vec![
                SecretSource {
                    name: "db".into(),
                    secret_ref: Some(SecretRef::new("a")),
                    secret_query: None,
                },
                SecretSource {
                    name: "db".into(),
                    secret_ref: Some(SecretRef::new("b")),
                    secret_query: None,
                },
            ],
            ..Default::default()
        };
        assert!(matches!(action.validate(), Err(SyncError::InvalidPlan(_))));
    }

    #[test]
    fn empty_target_means_origin() {
        let action = SyncAction {
            secret_ref: Some(SecretRef::new("a")),
            target: Some(SyncTarget::default()),
            ..Default::default()
        };
        assert!(matches!(action.target_shape(), Ok(TargetShape::Origin)));
    }

    #[test]
    fn empty_template_is_absent() {
        let action = SyncAction {
            secret_ref: Some(SecretRef::new("a")),
            template: Some(SyncTemplate::default()),
            ..Default::default()
        };
        assert!(action.effective_template().is_none());

        let templated = SyncAction {
            template: Some(SyncTemplate {
                raw_data: Some("{{Data}}".into()),
                data: None,
            }),
            ..action
        };
        assert!(templated.effective_template().is_some());
    }

    #[test]
    fn plan_deserializes_from_yaml() {
        let plan: SyncPlan = serde_yaml::from_str(
            r#"
schedule: "@hourly"
sync:
  - secretRef:
      key: /source/credentials/password
    target:
      key: /target/password
  - secretQuery:
      path: payments
      key:
        regexp: .*
    target:
      keyPrefix: billing/
  - secretSources:
      - name: app
        secretRef:
          key: app/token
    target:
      key: composed
    template:
      data:
        token: "{{Data.app}}"
"#,
        )
        .expect("plan should parse");

        assert_eq!(plan.schedule.as_deref(), Some("@hourly"));
        assert_eq!(plan.sync.len(), 3);
        for action in &plan.sync {
            action.validate().expect("actions should validate");
        }
        assert!(matches!(
            plan.sync[1].target_shape(),
            Ok(TargetShape::KeyPrefix("billing/"))
        ));
    }

    #[test]
    fn audit_log_path_defaults_to_temp() {
        let plan = SyncPlan::default();
        assert_eq!(
            plan.audit_log_file(),
            std::env::temp_dir().join("sync-audit.log")
        );

        let custom = SyncPlan {
            audit_log_path: Some("/var/log/sync-audit.log".into()),
            ..Default::default()
        };
        assert_eq!(
            custom.audit_log_file(),
            PathBuf::from("/var/log/sync-audit.log")
        );
    }
}
