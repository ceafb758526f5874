//! Error types for ipset-sync.

use thiserror::Error;

/// A single feed could not be fetched. Non-fatal: the aggregator records it
/// and carries on with the remaining sources.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to fetch {feed}: {cause}")]
pub struct FeedFetchError {
    pub feed: String,
    pub cause: String,
}

impl FeedFetchError {
    pub fn new(feed: impl Into<String>, cause: impl ToString) -> Self {
        Self {
            feed: feed.into(),
            cause: cause.to_string(),
        }
    }
}

/// Errors reported by an [`IpSetStore`](crate::store::IpSetStore) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("IP set not found: {0}")]
    NotFound(String),

    #[error("Lock token rejected: {0}")]
    StaleLockToken(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("API error: {0}")]
    Api(String),
}

/// Fatal errors of a synchronization run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Failed to read IP set {id}: {reason}")]
    Read { id: String, reason: String },

    #[error("IP set {id} was modified by another writer; nothing was committed")]
    ConcurrencyConflict { id: String },

    #[error("IP set {id} capacity exceeded: {requested} addresses (max: {capacity})")]
    CapacityExceeded {
        id: String,
        requested: usize,
        capacity: usize,
    },

    #[error("Failed to update IP set {id}: {reason}")]
    Write { id: String, reason: String },
}

impl SyncError {
    /// Short name of the stage that failed, for machine-readable output.
    pub fn stage(&self) -> &'static str {
        match self {
            SyncError::Read { .. } => "read",
            SyncError::ConcurrencyConflict { .. } => "conflict",
            SyncError::CapacityExceeded { .. } => "capacity",
            SyncError::Write { .. } => "write",
        }
    }
}
