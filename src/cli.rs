//! Command-line surface.
//!
//! ```bash
//! # One-shot sync between two stores
//! secret-store-sync sync --source source.yml --target target.yml --syncjob plan.yml
//!
//! # Recurring sync, overriding the plan schedule
//! secret-store-sync sync --source source.yml --target target.yml --syncjob plan.yml \
//!     --schedule "0 * * * *"
//! ```

use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::{Parser, Subcommand};

use crate::provider::ProviderRegistry;
use crate::{config, scheduler};

#[derive(Parser)]
#[command(name = "secret-store-sync")]
#[command(about = "Synchronizes secrets from a source to a target store", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize secrets from a source to a target store based on a sync plan
    Sync {
        /// Source store config file. This is the store the data is fetched from
        #[arg(long)]
        source: PathBuf,

        /// Target store config file. This is the store the data is synced to
        #[arg(long)]
        target: PathBuf,

        /// Sync plan file describing what to fetch, transform and write
        #[arg(long)]
        syncjob: PathBuf,

        /// Sync periodically using a CRON schedule. Overrides the plan schedule
        #[arg(long)]
        schedule: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Sync {
                source,
                target,
                syncjob,
                schedule,
            } => run_sync(&source, &target, &syncjob, schedule).await,
        }
    }
}

async fn run_sync(
    source: &std::path::Path,
    target: &std::path::Path,
    syncjob: &std::path::Path,
    schedule: Option<String>,
) -> Result<()> {
    let registry = ProviderRegistry::with_defaults();

    let source_config = config::load_store_config(source)?;
    ensure!(
        source_config.permissions.can_read(),
        "source store requires Read permissions, got {:?}",
        source_config.permissions
    );
    let source_client = registry.new_client(&source_config).await?;

    let target_config = config::load_store_config(target)?;
    ensure!(
        target_config.permissions.can_write(),
        "target store requires Write permissions, got {:?}",
        target_config.permissions
    );
    let target_client = registry.new_client(&target_config).await?;

    let mut plan = config::load_sync_plan(syncjob)?;
    if let Some(schedule) = schedule {
        plan.schedule = Some(schedule);
    }

    scheduler::run(source_client.as_ref(), target_client.as_ref(), &plan).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sync_requires_store_flags() {
        let missing = Cli::try_parse_from(["secret-store-sync", "sync", "--source", "s.yml"]);
        assert!(missing.is_err());

        let parsed = Cli::try_parse_from([
            "secret-store-sync",
            "sync",
            "--source",
            "s.yml",
            "--target",
            "t.yml",
            "--syncjob",
            "plan.yml",
        ]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn schedule_flag_is_optional() {
        let parsed = Cli::try_parse_from([
            "secret-store-sync",
            "sync",
            "--source",
            "s.yml",
            "--target",
            "t.yml",
            "--syncjob",
            "plan.yml",
            "--schedule",
            "@hourly",
        ])
        .expect("parses");
        let Commands::Sync { schedule, .. } = parsed.command;
        assert_eq!(schedule.as_deref(), Some("@hourly"));
    }
}
