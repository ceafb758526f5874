//! Sync command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{error, info};

use crate::config::Config;
use crate::sync::{RunSummary, SyncJob};

use super::{build_aggregator, connect_client};

/// Run the sync command
pub async fn run(dry_run: bool, config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    if config.sources.is_empty() {
        anyhow::bail!("No feeds configured. Check your configuration.");
    }

    let client = connect_client(&config).await?;
    let aggregator = build_aggregator(&config)?;
    let job = SyncJob::new(client, aggregator, config.sources.clone());

    if dry_run {
        info!("Dry run: the IP set will not be modified");
    }

    let result = job.run(dry_run).await;
    let summary = RunSummary::from_result(&result);
    println!("{}", serde_json::to_string(&summary)?);

    match result {
        Ok(report) if summary.is_success() => {
            info!(
                "Sync complete: {} addresses written, {} stored",
                report.updated_count, report.stored_count
            );
            Ok(())
        }
        Ok(_) => {
            error!("Every feed failed; the IP set was not extended");
            anyhow::bail!("All {} feeds failed to download", config.sources.len())
        }
        Err(e) => {
            error!("Sync failed at {} stage", e.stage());
            Err(e).context("Sync failed")
        }
    }
}
