//! Client for the managed IP set.
//!
//! Reads return the current addresses with their lock token. Writes are a
//! compare-and-swap: the set is re-read for a fresh token immediately before
//! the update. Both a token rejected by the store and entries that appeared
//! since the caller's read surface as [`SyncError::ConcurrencyConflict`]
//! rather than being retried.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{StoreError, SyncError};
use crate::parser::{CidrEntry, CidrSet};
use crate::store::{IpSetKey, IpSetStore, RemoteIpSet};
use crate::utils::format_count;

/// Snapshot of the managed IP set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedIpSet {
    pub id: String,
    pub name: String,
    pub arn: String,
    pub description: Option<String>,
    pub lock_token: String,
    pub addresses: CidrSet,
}

impl From<RemoteIpSet> for ManagedIpSet {
    fn from(remote: RemoteIpSet) -> Self {
        Self {
            addresses: remote
                .addresses
                .iter()
                .map(|a| CidrEntry::from_remote(a))
                .collect(),
            id: remote.id,
            name: remote.name,
            arn: remote.arn,
            description: remote.description,
            lock_token: remote.lock_token,
        }
    }
}

pub struct ManagedSetClient {
    store: Arc<dyn IpSetStore>,
    key: IpSetKey,
    capacity: usize,
}

impl ManagedSetClient {
    pub fn new(store: Arc<dyn IpSetStore>, key: IpSetKey, capacity: usize) -> Self {
        Self {
            store,
            key,
            capacity,
        }
    }

    pub fn key(&self) -> &IpSetKey {
        &self.key
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Read the current state of the set
    pub async fn read(&self) -> Result<ManagedIpSet, SyncError> {
        let remote = self
            .store
            .get_ip_set(&self.key)
            .await
            .map_err(|e| SyncError::Read {
                id: self.key.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(remote.into())
    }

    /// Replace the set's addresses, guarded by a freshly read lock token.
    ///
    /// `addresses` must contain everything the set holds at the time of the
    /// write. If another writer added entries since the caller's read, the
    /// write is refused as a conflict rather than dropping them.
    ///
    /// Returns the state read back after the update.
    pub async fn write(&self, addresses: &CidrSet) -> Result<ManagedIpSet, SyncError> {
        if addresses.len() > self.capacity {
            return Err(self.capacity_exceeded(addresses.len()));
        }

        let fresh = self.read().await?;
        if !fresh.addresses.is_subset(addresses) {
            let missing = fresh.addresses.difference(addresses).count();
            warn!(
                "IP set {} changed since it was read ({} entries not in the update)",
                self.key.id, missing
            );
            return Err(SyncError::ConcurrencyConflict {
                id: self.key.id.clone(),
            });
        }

        // WAFv2 rejects empty descriptions
        let description = fresh.description.filter(|d| !d.is_empty());
        debug!(
            "Updating IP set {} with description: {:?}",
            self.key.id, description
        );

        let payload: Vec<String> = addresses.iter().map(|a| a.as_str().to_string()).collect();
        let next_token = self
            .store
            .update_ip_set(&self.key, description, payload, fresh.lock_token)
            .await
            .map_err(|e| match e {
                StoreError::StaleLockToken(_) => SyncError::ConcurrencyConflict {
                    id: self.key.id.clone(),
                },
                StoreError::LimitExceeded(_) => self.capacity_exceeded(addresses.len()),
                other => SyncError::Write {
                    id: self.key.id.clone(),
                    reason: other.to_string(),
                },
            })?;
        debug!("IP set {} updated, next lock token {}", self.key.id, next_token);

        let stored = self.read().await?;
        info!(
            "IP set {} now holds {} addresses",
            stored.name,
            format_count(stored.addresses.len())
        );
        Ok(stored)
    }

    fn capacity_exceeded(&self, requested: usize) -> SyncError {
        SyncError::CapacityExceeded {
            id: self.key.id.clone(),
            requested,
            capacity: self.capacity,
        }
    }
}
