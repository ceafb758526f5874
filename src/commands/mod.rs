//! CLI command implementations.

pub mod fetch;
pub mod show;
pub mod sources;
pub mod sync;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::aggregator::Aggregator;
use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::managed_set::ManagedSetClient;
use crate::store::Wafv2Store;

/// Build the feed aggregator from configuration
pub(crate) fn build_aggregator(config: &Config) -> Result<Aggregator> {
    let fetcher = Fetcher::new(&config.fetch)?;
    Ok(Aggregator::new(
        Box::new(fetcher),
        config.fetch.retry_policy(),
        config.fetch.max_concurrent,
    ))
}

/// Connect to the configured IP set. The AWS client is built once here.
pub(crate) async fn connect_client(config: &Config) -> Result<ManagedSetClient> {
    let key = config.ip_set_key().context("Invalid IP set configuration")?;
    let store = Wafv2Store::connect(config.aws_max_attempts, config.aws_timeout()).await;
    Ok(ManagedSetClient::new(Arc::new(store), key, config.capacity))
}
