//! The synchronization run: read, aggregate, merge, write, report.
//!
//! Merging is a monotonic union. Entries already in the managed set are
//! never removed, so a feed outage or a parser regression can only ever
//! fail to add addresses.

use serde::Serialize;
use tracing::{info, warn};

use crate::aggregator::{Aggregator, SourceSummary};
use crate::config::SourceSpec;
use crate::error::{FeedFetchError, SyncError};
use crate::managed_set::ManagedSetClient;
use crate::parser::CidrSet;
use crate::utils::{format_count, format_entries};

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Size of the merged set that was written
    pub updated_count: usize,
    /// Size of the set as read back after the write
    pub stored_count: usize,
    /// Feed entries that were not in the set before this run
    pub newly_added: CidrSet,
    pub sources: Vec<SourceSummary>,
    pub failures: Vec<FeedFetchError>,
    pub sources_total: usize,
    pub dry_run: bool,
}

impl SyncReport {
    pub fn all_sources_failed(&self) -> bool {
        self.sources_total > 0 && self.failures.len() == self.sources_total
    }
}

/// `current ∪ candidate`
pub fn merge(current: &CidrSet, candidate: &CidrSet) -> CidrSet {
    current.union(candidate).cloned().collect()
}

pub struct SyncJob {
    client: ManagedSetClient,
    aggregator: Aggregator,
    sources: Vec<SourceSpec>,
}

impl SyncJob {
    pub fn new(client: ManagedSetClient, aggregator: Aggregator, sources: Vec<SourceSpec>) -> Self {
        Self {
            client,
            aggregator,
            sources,
        }
    }

    /// Run one reconciliation. With `dry_run` nothing is written.
    pub async fn run(&self, dry_run: bool) -> Result<SyncReport, SyncError> {
        let current = self.client.read().await?.addresses;
        info!(
            "IP set {} currently holds {} addresses",
            self.client.key().id,
            format_count(current.len())
        );

        let aggregation = self.aggregator.aggregate(&self.sources).await;
        let merged = merge(&current, &aggregation.entries);
        let newly_added: CidrSet = aggregation.entries.difference(&current).cloned().collect();

        let stored_count = if dry_run {
            info!(
                "[DRY-RUN] Would write {} addresses (capacity {})",
                format_count(merged.len()),
                format_count(self.client.capacity())
            );
            merged.len()
        } else {
            self.client.write(&merged).await?.addresses.len()
        };

        info!("newly added: {}", format_entries(&newly_added));
        if !aggregation.failures.is_empty() {
            warn!(
                "{} of {} feeds failed: {}",
                aggregation.failures.len(),
                self.sources.len(),
                aggregation
                    .failures
                    .iter()
                    .map(|f| f.feed.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Ok(SyncReport {
            updated_count: merged.len(),
            stored_count,
            newly_added,
            sources: aggregation.sources,
            failures: aggregation.failures,
            sources_total: self.sources.len(),
            dry_run,
        })
    }
}

/// Machine-readable outcome printed for the invoker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newly_added_count: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_feeds: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

impl RunSummary {
    pub fn from_result(result: &Result<SyncReport, SyncError>) -> Self {
        match result {
            Ok(report) => {
                let failed_feeds: Vec<String> =
                    report.failures.iter().map(|f| f.feed.clone()).collect();
                if report.all_sources_failed() {
                    Self {
                        status: "failure",
                        updated_count: Some(report.updated_count),
                        newly_added_count: Some(0),
                        failed_feeds,
                        stage: Some("feeds"),
                        error: Some("every feed failed to download".to_string()),
                        dry_run: report.dry_run,
                    }
                } else {
                    Self {
                        status: "success",
                        updated_count: Some(report.updated_count),
                        newly_added_count: Some(report.newly_added.len()),
                        failed_feeds,
                        stage: None,
                        error: None,
                        dry_run: report.dry_run,
                    }
                }
            }
            Err(e) => Self {
                status: "failure",
                updated_count: None,
                newly_added_count: None,
                failed_feeds: Vec::new(),
                stage: Some(e.stage()),
                error: Some(e.to_string()),
                dry_run: false,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::stub::StaticFeeds;
    use crate::aggregator::RetryPolicy;
    use crate::config::Scope;
    use crate::parser::CidrEntry;
    use crate::store::mock::InMemoryStore;
    use crate::store::IpSetKey;
    use std::sync::Arc;

    fn key() -> IpSetKey {
        IpSetKey {
            scope: Scope::Regional,
            name: "blocked-ip-lists".to_string(),
            id: "a1b2c3d4".to_string(),
        }
    }

    fn set(items: &[&str]) -> CidrSet {
        items.iter().map(|s| CidrEntry::from_remote(s)).collect()
    }

    fn sources(names: &[&str]) -> Vec<SourceSpec> {
        names
            .iter()
            .map(|n| SourceSpec::new(n, &format!("https://feeds.example.com/{}", n)))
            .collect()
    }

    fn job(store: Arc<InMemoryStore>, feeds: StaticFeeds, names: &[&str], capacity: usize) -> SyncJob {
        SyncJob::new(
            ManagedSetClient::new(store, key(), capacity),
            Aggregator::new(Box::new(feeds), RetryPolicy::none(), 4),
            sources(names),
        )
    }

    #[tokio::test]
    async fn test_merge_scenario() {
        let store = Arc::new(InMemoryStore::new(&key(), &["1.2.3.0/24"]));
        let feeds = StaticFeeds::default()
            .with("a", "1.2.3.0/24\n")
            .with("b", "5.6.7.8\n");

        let report = job(store.clone(), feeds, &["a", "b"], 100)
            .run(false)
            .await
            .unwrap();

        assert_eq!(report.newly_added, set(&["5.6.7.8/32"]));
        assert_eq!(report.updated_count, 2);
        assert_eq!(report.stored_count, 2);
        assert_eq!(
            store.addresses(),
            vec!["1.2.3.0/24".to_string(), "5.6.7.8/32".to_string()]
        );
    }

    #[tokio::test]
    async fn test_existing_entries_are_never_dropped() {
        let store = Arc::new(InMemoryStore::new(&key(), &["10.0.0.0/8", "2001:db8::/32", "odd-entry"]));
        let feeds = StaticFeeds::default().with("a", "5.6.7.8\n");

        let report = job(store.clone(), feeds, &["a"], 100).run(false).await.unwrap();

        let stored: CidrSet = store.addresses().iter().map(|a| CidrEntry::from_remote(a)).collect();
        assert!(set(&["10.0.0.0/8", "2001:db8::/32", "odd-entry"]).is_subset(&stored));
        assert_eq!(report.updated_count, 4);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let store = Arc::new(InMemoryStore::new(&key(), &["1.2.3.0/24"]));
        let feeds = StaticFeeds::default()
            .with("a", "1.2.3.0/24\n")
            .with("b", "5.6.7.8\n");
        let job = job(store.clone(), feeds, &["a", "b"], 100);

        let first = job.run(false).await.unwrap();
        let second = job.run(false).await.unwrap();

        assert_eq!(first.newly_added.len(), 1);
        assert!(second.newly_added.is_empty());
        assert_eq!(second.updated_count, first.updated_count);
    }

    #[tokio::test]
    async fn test_failed_feed_does_not_abort_run() {
        let store = Arc::new(InMemoryStore::new(&key(), &[]));
        let feeds = StaticFeeds::default().with("good", "5.6.7.8\n");

        let report = job(store.clone(), feeds, &["broken", "good"], 100)
            .run(false)
            .await
            .unwrap();

        assert_eq!(report.newly_added, set(&["5.6.7.8/32"]));
        assert_eq!(report.failures, vec![FeedFetchError::new("broken", "HTTP 503 Service Unavailable")]);
        assert!(!report.all_sources_failed());
        assert_eq!(store.addresses(), vec!["5.6.7.8/32".to_string()]);
    }

    #[tokio::test]
    async fn test_conflict_aborts_without_commit() {
        let store = Arc::new(InMemoryStore::new(&key(), &["1.2.3.0/24"]));
        let feeds = StaticFeeds::default().with("a", "5.6.7.8\n");
        let job = job(store.clone(), feeds, &["a"], 100);

        // The first read is the run's own; the concurrent writer strikes
        // between the write's token read and the update.
        let current = job.client.read().await.unwrap();
        store.steal_next_lock();
        let err = job.client.write(&merge(&current.addresses, &set(&["5.6.7.8/32"]))).await;

        assert_eq!(err.unwrap_err().stage(), "conflict");
        assert_eq!(store.addresses(), vec!["1.2.3.0/24".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_commit_during_run_is_conflict() {
        let store = Arc::new(InMemoryStore::new(&key(), &["1.2.3.0/24"]));
        let feeds = StaticFeeds::default().with("a", "5.6.7.8\n");
        // Lands after the run's own read, before the write's token read
        store.commit_after_next_read(&["7.7.7.7/32"]);

        let err = job(store.clone(), feeds, &["a"], 100).run(false).await.unwrap_err();

        assert_eq!(err.stage(), "conflict");
        assert_eq!(
            store.addresses(),
            vec!["1.2.3.0/24".to_string(), "7.7.7.7/32".to_string()]
        );
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_capacity_exceeded_aborts_run() {
        let store = Arc::new(InMemoryStore::new(&key(), &["1.2.3.0/24"]));
        let feeds = StaticFeeds::default().with("a", "5.6.7.8\n9.9.9.9\n");

        let err = job(store.clone(), feeds, &["a"], 2).run(false).await.unwrap_err();
        assert_eq!(err.stage(), "capacity");
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_read_error_aborts_run() {
        let store = Arc::new(InMemoryStore::new(&key(), &[]));
        store.fail_reads();
        let feeds = StaticFeeds::default().with("a", "5.6.7.8\n");

        let err = job(store, feeds, &["a"], 100).run(false).await.unwrap_err();
        assert_eq!(err.stage(), "read");
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = Arc::new(InMemoryStore::new(&key(), &["1.2.3.0/24"]));
        let feeds = StaticFeeds::default().with("a", "5.6.7.8\n");

        let report = job(store.clone(), feeds, &["a"], 100).run(true).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.updated_count, 2);
        assert_eq!(report.stored_count, 2);
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_all_feeds_failed() {
        let store = Arc::new(InMemoryStore::new(&key(), &["1.2.3.0/24"]));
        let report = job(store, StaticFeeds::default(), &["a", "b"], 100)
            .run(false)
            .await
            .unwrap();
        assert!(report.all_sources_failed());
        assert_eq!(report.updated_count, 1);

        let summary = RunSummary::from_result(&Ok(report));
        assert!(!summary.is_success());
        assert_eq!(summary.stage, Some("feeds"));
    }

    #[test]
    fn test_merge_is_superset_of_current() {
        let current = set(&["1.2.3.0/24", "10.0.0.0/8"]);
        let candidate = set(&["5.6.7.8/32", "10.0.0.0/8"]);
        let merged = merge(&current, &candidate);
        assert!(current.is_subset(&merged));
        assert!(candidate.is_subset(&merged));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_summary_success_json() {
        let report = SyncReport {
            updated_count: 2,
            stored_count: 2,
            newly_added: set(&["5.6.7.8/32"]),
            sources: vec![],
            failures: vec![],
            sources_total: 1,
            dry_run: false,
        };
        let json = serde_json::to_value(RunSummary::from_result(&Ok(report))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "success", "updated_count": 2, "newly_added_count": 1})
        );
    }

    #[test]
    fn test_summary_failure_json() {
        let err = SyncError::ConcurrencyConflict {
            id: "a1b2c3d4".to_string(),
        };
        let json = serde_json::to_value(RunSummary::from_result(&Err(err))).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["stage"], "conflict");
        assert!(json.get("updated_count").is_none());
    }
}
