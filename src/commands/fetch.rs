//! Fetch command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::utils::format_count;

use super::build_aggregator;

/// Download all feeds and print what they contain
pub async fn run(list: bool, config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let aggregator = build_aggregator(&config)?;
    let aggregation = aggregator.aggregate(&config.sources).await;

    if list {
        for entry in &aggregation.entries {
            println!("{}", entry);
        }
        return Ok(());
    }

    println!();
    println!("{:<20} {:>10} {:>10}", "FEED", "ENTRIES", "LINES");
    for source in &aggregation.sources {
        println!(
            "{:<20} {:>10} {:>10}",
            source.name,
            format_count(source.entries),
            format_count(source.lines)
        );
    }
    for failure in &aggregation.failures {
        println!("{:<20} {:>10}   {}", failure.feed, "FAILED", failure.cause);
    }
    println!();
    println!(
        "[OK] {} unique entries from {}/{} feeds",
        format_count(aggregation.entries.len()),
        aggregation.sources.len(),
        config.sources.len()
    );

    Ok(())
}
