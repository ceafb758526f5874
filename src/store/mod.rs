//! Remote IP set storage (AWS WAFv2).

mod wafv2;

use anyhow::Result;
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

pub use wafv2::Wafv2Store;

use crate::config::Scope;
use crate::error::StoreError;

/// Identifies a managed IP set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpSetKey {
    pub scope: Scope,
    pub name: String,
    pub id: String,
}

impl IpSetKey {
    /// Build a key from an IP set ARN.
    ///
    /// WAFv2 ARNs end in `.../ipset/<name>/<id>`; the id is the last segment.
    pub fn from_arn(scope: Scope, name: &str, arn: &str) -> Result<Self> {
        let id = match arn.rsplit_once('/') {
            Some((_, id)) if !id.is_empty() => id,
            _ => anyhow::bail!("Invalid IP set ARN (no id segment): {}", arn),
        };
        Ok(Self {
            scope,
            name: name.to_string(),
            id: id.to_string(),
        })
    }
}

/// Raw IP set state as returned by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIpSet {
    pub id: String,
    pub name: String,
    pub arn: String,
    pub description: Option<String>,
    pub addresses: Vec<String>,
    pub lock_token: String,
}

/// Read and compare-and-swap access to a remote IP set.
///
/// Implementations own their transport client and its retry policy; one
/// instance is built per process and shared.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IpSetStore: Send + Sync {
    /// Fetch the set together with its current lock token
    async fn get_ip_set(&self, key: &IpSetKey) -> Result<RemoteIpSet, StoreError>;

    /// Replace the set's addresses if `lock_token` is still current.
    /// Returns the next lock token.
    async fn update_ip_set(
        &self,
        key: &IpSetKey,
        description: Option<String>,
        addresses: Vec<String>,
        lock_token: String,
    ) -> Result<String, StoreError>;
}
