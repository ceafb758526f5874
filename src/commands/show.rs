//! Show command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::utils::format_count;

use super::connect_client;

/// Print the current state of the managed IP set
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let client = connect_client(&config).await?;
    let ip_set = client.read().await?;

    println!();
    println!("Name:        {}", ip_set.name);
    println!("Id:          {}", ip_set.id);
    println!("ARN:         {}", ip_set.arn);
    println!(
        "Description: {}",
        ip_set.description.as_deref().unwrap_or("-")
    );
    println!(
        "Addresses:   {} / {}",
        format_count(ip_set.addresses.len()),
        format_count(client.capacity())
    );
    println!();

    Ok(())
}
