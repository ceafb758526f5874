//! Union of all configured feeds.
//!
//! A failing feed never aborts the run: it is retried according to the
//! [`RetryPolicy`], then recorded and skipped. The caller gets the union of
//! everything that could be fetched plus the list of failures.

use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SourceSpec;
use crate::error::FeedFetchError;
use crate::fetcher::{FeedFetch, FeedResult};
use crate::parser::CidrSet;
use crate::utils::format_count;

/// Retry policy for feed downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per feed (at least one is always made)
    pub attempts: u32,
    /// Delay before the first retry; doubled for each further retry
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    fn backoff(&self, retry: u32) -> Duration {
        self.delay
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

/// Per-feed contribution to an aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    pub name: String,
    pub entries: usize,
    pub lines: usize,
}

/// Outcome of fetching every configured feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub entries: CidrSet,
    pub sources: Vec<SourceSummary>,
    pub failures: Vec<FeedFetchError>,
}

impl Aggregation {
    fn add(&mut self, result: FeedResult) {
        self.sources.push(SourceSummary {
            name: result.name,
            entries: result.entries.len(),
            lines: result.lines,
        });
        self.entries.extend(result.entries);
    }
}

/// Drives a [`FeedFetch`] across all sources
pub struct Aggregator {
    fetcher: Box<dyn FeedFetch>,
    retry: RetryPolicy,
    max_concurrent: usize,
}

impl Aggregator {
    pub fn new(fetcher: Box<dyn FeedFetch>, retry: RetryPolicy, max_concurrent: usize) -> Self {
        Self {
            fetcher,
            retry,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Fetch all sources concurrently and union their entries
    pub async fn aggregate(&self, sources: &[SourceSpec]) -> Aggregation {
        let fetches = sources.iter().map(|source| self.fetch_with_retry(source));
        let results: Vec<_> = stream::iter(fetches)
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut aggregation = Aggregation::default();
        for result in results {
            match result {
                Ok(feed) => aggregation.add(feed),
                Err(e) => {
                    warn!("{}", e);
                    aggregation.failures.push(e);
                }
            }
        }

        // Completion order is arbitrary
        aggregation.sources.sort_by(|a, b| a.name.cmp(&b.name));
        aggregation.failures.sort_by(|a, b| a.feed.cmp(&b.feed));

        info!(
            "Aggregated {} entries from {}/{} feeds",
            format_count(aggregation.entries.len()),
            aggregation.sources.len(),
            sources.len()
        );

        aggregation
    }

    async fn fetch_with_retry(&self, source: &SourceSpec) -> Result<FeedResult, FeedFetchError> {
        let mut last_error = None;

        for attempt in 0..self.retry.attempts.max(1) {
            if attempt > 0 {
                let delay = self.retry.backoff(attempt);
                debug!("Retry {} after {:?} for {}", attempt, delay, source.name);
                tokio::time::sleep(delay).await;
            }

            match self.fetcher.fetch(source).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    debug!("Attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FeedFetchError::new(&source.name, "no attempt made")))
    }
}
