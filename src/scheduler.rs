//! Drives the sync engine once or on a CRON schedule.
//!
//! The CRON dialect accepts standard 5-field expressions plus the `@hourly`
//! style shorthands; an invalid expression is treated as "no schedule". Ticks
//! that arrive while an invocation is still running coalesce, because the
//! next fire time is computed only after the previous run completes.

use std::str::FromStr;

use anyhow::Result;
use chrono::Utc;
use cron::Schedule;
use tracing::{info, warn};

use crate::audit;
use crate::model::SyncPlan;
use crate::provider::{StoreReader, StoreWriter};
use crate::sync;

/// Convert a standard 5-field cron expression to the 7-field format expected
/// by the `cron` crate: seconds are pinned to `0`, the year is open.
fn normalize_cron(expression: &str) -> String {
    if expression.starts_with('@') {
        return expression.to_string();
    }
    let field_count = expression.split_whitespace().count();
    if field_count == 5 {
        format!("0 {expression} *")
    } else {
        expression.to_string()
    }
}

/// Parses a schedule, downgrading invalid expressions to `None`.
pub fn parse_schedule(expression: &str) -> Option<Schedule> {
    match Schedule::from_str(&normalize_cron(expression)) {
        Ok(schedule) => Some(schedule),
        Err(err) => {
            warn!(schedule = expression, error = %err, "invalid schedule, running once");
            None
        }
    }
}

/// Runs the plan once, or repeatedly when it carries a valid schedule.
///
/// Scheduled runs exit cleanly on interrupt; a structural sync error aborts
/// with the error either way.
pub async fn run(
    source: &dyn StoreReader,
    target: &dyn StoreWriter,
    plan: &SyncPlan,
) -> Result<()> {
    let schedule = plan.schedule.as_deref().and_then(parse_schedule);

    let Some(schedule) = schedule else {
        let status = sync::sync(source, target, &plan.sync).await?;
        info!("{}", status.status);
        audit::record(&plan.audit_log_file(), &status);
        return Ok(());
    };

    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            return Ok(());
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping");
                return Ok(());
            }
            _ = tokio::time::sleep(wait) => {}
        }

        info!("handling a new sync request");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping");
                return Ok(());
            }
            synced = sync::sync(source, target, &plan.sync) => {
                let status = synced?;
                info!("{}", status.status);
                audit::record(&plan.audit_log_file(), &status);
            }
        }
    }
}
