use anyhow::Result;
use clap::Parser;

use secret_store_sync::cli::Cli;
use secret_store_sync::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init()?;
    Cli::parse().run().await
}
