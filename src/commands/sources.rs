//! Sources command implementation.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;

/// List configured feeds
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;

    println!();
    println!("{:<20} {:<14} URL", "NAME", "LINE PREFIX");
    for source in &config.sources {
        println!(
            "{:<20} {:<14} {}",
            source.name,
            source.line_prefix.as_deref().unwrap_or("-"),
            source.url
        );
    }
    println!();

    Ok(())
}
