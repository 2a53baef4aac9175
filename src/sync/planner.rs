//! Turns one sync action into write intents.
//!
//! Dispatch is driven by the action's fetch variant and target shape:
//!
//! | from      | target    | flatten       | template | intents                       |
//! |-----------|-----------|---------------|----------|-------------------------------|
//! | ref       | absent    | -             | optional | 1, at the source ref          |
//! | ref       | key       | -             | optional | 1, version inherited          |
//! | query     | keyPrefix | must be false | optional | n, prefix + terminal name     |
//! | query     | key       | required      | required | 1, payload keyed by name      |
//! | sources   | key       | -             | required | 1, payload keyed by source    |
//!
//! Any other combination is rejected with [`SyncError::InvalidPlan`]. Shape
//! checks run before any fetch so a structurally bad action fails the same
//! way whether or not its source keys exist.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::error::SyncError;
use crate::model::{ActionFrom, SecretQuery, SecretRef, SecretSource, SyncAction, TargetShape};
use crate::sync::processor::{Processor, SourceData};
use crate::sync::template::{self, to_lower_camel};

fn payload_string(data: &[u8]) -> Value {
    json!(String::from_utf8_lossy(data))
}

pub(crate) async fn plan_action(
    processor: &Processor<'_>,
    action: &SyncAction,
) -> Result<HashMap<SecretRef, Vec<u8>>, SyncError> {
    action.validate()?;

    match action.from()? {
        ActionFrom::Ref(from_ref) => plan_from_ref(processor, action, from_ref).await,
        ActionFrom::Query(query) => plan_from_query(processor, action, query).await,
        ActionFrom::Sources(sources) => plan_from_sources(processor, action, sources).await,
    }
}

async fn plan_from_ref(
    processor: &Processor<'_>,
    action: &SyncAction,
    from_ref: &SecretRef,
) -> Result<HashMap<SecretRef, Vec<u8>>, SyncError> {
    let mut sync_ref = from_ref.clone();
    match action.target_shape()? {
        TargetShape::Origin => {}
        TargetShape::Key(key) => sync_ref.key = key.to_string(),
        TargetShape::KeyPrefix(_) => {
            return Err(SyncError::InvalidPlan(
                "cannot use target.keyPrefix with secretRef".into(),
            ));
        }
    }

    let data = processor.fetch_from_ref(from_ref).await?;
    let value = match action.effective_template() {
        Some(sync_template) => template::render(sync_template, &payload_string(&data))?,
        None => data,
    };

    Ok(HashMap::from([(sync_ref, value)]))
}

async fn plan_from_query(
    processor: &Processor<'_>,
    action: &SyncAction,
    query: &SecretQuery,
) -> Result<HashMap<SecretRef, Vec<u8>>, SyncError> {
    match action.target_shape()? {
        TargetShape::Key(key) => {
            if !action.flatten.unwrap_or(false) {
                return Err(SyncError::InvalidPlan(
                    "flatten required for secretQuery with target.key".into(),
                ));
            }
            let Some(sync_template) = action.effective_template() else {
                return Err(SyncError::InvalidPlan(
                    "template required for secretQuery with target.key".into(),
                ));
            };

            let fetched = processor.fetch_from_query(query).await?;
            let mut payload = serde_json::Map::new();
            for (secret_ref, data) in &fetched {
                payload.insert(to_lower_camel(secret_ref.name()), payload_string(data));
            }

            let value = template::render(sync_template, &Value::Object(payload))?;
            Ok(HashMap::from([(SecretRef::new(key), value)]))
        }

        TargetShape::KeyPrefix(prefix) => {
            if action.flatten.unwrap_or(false) {
                return Err(SyncError::InvalidPlan(
                    "cannot use flatten for secretQuery with target.keyPrefix".into(),
                ));
            }

            let fetched = processor.fetch_from_query(query).await?;
            let mut intents = HashMap::new();
            for (secret_ref, data) in fetched {
                let value = match action.effective_template() {
                    Some(sync_template) => {
                        template::render(sync_template, &payload_string(&data))?
                    }
                    None => data,
                };
                let sync_ref = SecretRef {
                    key: format!("{prefix}{}", secret_ref.name()),
                    version: secret_ref.version,
                };
                intents.insert(sync_ref, value);
            }
            Ok(intents)
        }

        TargetShape::Origin => Err(SyncError::InvalidPlan(
            "target required for secretQuery".into(),
        )),
    }
}

async fn plan_from_sources(
    processor: &Processor<'_>,
    action: &SyncAction,
    sources: &[SecretSource],
) -> Result<HashMap<SecretRef, Vec<u8>>, SyncError> {
    let TargetShape::Key(key) = action.target_shape()? else {
        return Err(SyncError::InvalidPlan(
            "target.key required for secretSources".into(),
        ));
    };
    let Some(sync_template) = action.effective_template() else {
        return Err(SyncError::InvalidPlan(
            "template required for secretSources".into(),
        ));
    };

    let fetched = processor.fetch_from_sources(sources).await?;
    let mut payload = serde_json::Map::new();
    for (name, data) in &fetched {
        let entry = match data {
            SourceData::Ref(value) => payload_string(value),
            SourceData::Query(values) => {
                let mut nested = serde_json::Map::new();
                for (secret_ref, value) in values {
                    nested.insert(to_lower_camel(secret_ref.name()), payload_string(value));
                }
                Value::Object(nested)
            }
        };
        payload.insert(to_lower_camel(name), entry);
    }

    let value = template::render(sync_template, &Value::Object(payload))?;
    Ok(HashMap::from([(SecretRef::new(key), value)]))
}
