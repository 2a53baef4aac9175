//! Synchronization engine.
//!
//! [`sync`] runs in two phases. Planning fans out over all actions
//! concurrently and fails fast: a collision on a target ref or a structurally
//! invalid action aborts the invocation, while any other per-action failure
//! drops just that action with a warning. Writing fans out over the collected
//! intents and is best-effort: every intent runs to completion so the
//! returned [`SyncStatus`] reports a meaningful partial result.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::SyncError;
use crate::model::{SecretRef, SyncAction};
use crate::provider::{StoreReader, StoreWriter};

mod planner;
mod processor;
pub mod template;

use planner::plan_action;
use processor::Processor;

/// Outcome of one sync invocation.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// Number of keys marked for sync.
    pub total: u32,
    /// Number of successful writes.
    pub synced: u32,
    /// Whether every planned write succeeded.
    pub success: bool,
    /// Human-readable status message.
    pub status: String,
    /// Completion timestamp.
    pub synced_at: DateTime<Utc>,
}

/// Synchronizes keys from source to target based on the provided actions.
pub async fn sync(
    source: &dyn StoreReader,
    target: &dyn StoreWriter,
    actions: &[SyncAction],
) -> Result<SyncStatus, SyncError> {
    if actions.is_empty() {
        return Err(SyncError::InvalidPlan("no actions provided".into()));
    }

    let processor = Processor::new(source);

    // Phase 1: plan all actions concurrently and union their write intents.
    // A second intent for the same (key, version) aborts the invocation;
    // dropping the stream cancels the planning still in flight.
    let mut intents: HashMap<SecretRef, Vec<u8>> = HashMap::new();
    {
        let mut planning: FuturesUnordered<_> = actions
            .iter()
            .enumerate()
            .map(|(id, action)| {
                let processor = &processor;
                async move { (id, plan_action(processor, action).await) }
            })
            .collect();

        while let Some((id, planned)) = planning.next().await {
            match planned {
                Ok(action_intents) => {
                    for (secret_ref, value) in action_intents {
                        if intents.contains_key(&secret_ref) {
                            return Err(SyncError::DuplicateWriteIntent(secret_ref.key));
                        }
                        intents.insert(secret_ref, value);
                    }
                }
                Err(err) if err.is_structural() => return Err(err),
                Err(err) => {
                    warn!(id, error = %err, "failed to fetch sync action");
                }
            }
        }
    }

    // Phase 2: write every intent concurrently, best-effort.
    let writes = intents.iter().map(|(secret_ref, value)| async move {
        if value.is_empty() {
            warn!(key = %secret_ref.key, error = %SyncError::EmptyValue, "skipped sync action");
            return false;
        }
        match target.set_secret(secret_ref, value).await {
            Ok(()) => {
                info!(key = %secret_ref.key, "successfully synced action");
                true
            }
            Err(SyncError::KeyNotFound) => {
                warn!(key = %secret_ref.key, "skipped sync action: key not found");
                false
            }
            Err(err) => {
                error!(key = %secret_ref.key, error = %err, "failed to sync action");
                false
            }
        }
    });
    let outcomes = futures::future::join_all(writes).await;

    let total = intents.len() as u32;
    let synced = outcomes.into_iter().filter(|written| *written).count() as u32;

    Ok(SyncStatus {
        total,
        synced,
        success: total == synced,
        status: format!("Synced {synced} out of total {total} keys"),
        synced_at: Utc::now(),
    })
}
