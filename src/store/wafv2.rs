//! AWS WAFv2 IP set backend.

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_wafv2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_wafv2::types::Scope as WafScope;
use aws_sdk_wafv2::Client;
use std::error::Error as StdError;
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;

use super::{IpSetKey, IpSetStore, RemoteIpSet};
use crate::config::Scope;
use crate::error::StoreError;

/// WAFv2-backed IP set store
pub struct Wafv2Store {
    client: Client,
}

impl Wafv2Store {
    /// Build a store from the default AWS credential/region chain.
    ///
    /// `max_attempts` bounds the SDK's own retries (standard mode, with
    /// exponential backoff) for every API call; `operation_timeout` caps each
    /// call including those retries.
    pub async fn connect(max_attempts: u32, operation_timeout: Duration) -> Self {
        let retry_config = RetryConfig::standard().with_max_attempts(max_attempts);
        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(operation_timeout)
            .build();
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(retry_config)
            .timeout_config(timeout_config)
            .load()
            .await;
        Self::from_client(Client::new(&sdk_config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn waf_scope(scope: Scope) -> WafScope {
    match scope {
        Scope::Regional => WafScope::Regional,
        Scope::Cloudfront => WafScope::Cloudfront,
    }
}

/// Map an SDK failure onto the store error taxonomy.
///
/// Only the service message is kept; the full error chain goes to the debug log.
fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + StdError + 'static,
    R: Debug + 'static,
{
    debug!("{} failed: {}", operation, DisplayErrorContext(&err));

    let (code, message) = match err.as_service_error() {
        Some(service_err) => (
            service_err.code().map(str::to_string),
            service_err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| service_err.to_string()),
        ),
        None => (None, format!("{} request failed: {}", operation, err)),
    };

    match code.as_deref() {
        Some("WAFNonexistentItemException") => StoreError::NotFound(message),
        Some("WAFOptimisticLockException") => StoreError::StaleLockToken(message),
        Some("WAFLimitsExceededException") => StoreError::LimitExceeded(message),
        _ => StoreError::Api(message),
    }
}

#[async_trait]
impl IpSetStore for Wafv2Store {
    async fn get_ip_set(&self, key: &IpSetKey) -> Result<RemoteIpSet, StoreError> {
        let output = self
            .client
            .get_ip_set()
            .scope(waf_scope(key.scope))
            .name(&key.name)
            .id(&key.id)
            .send()
            .await
            .map_err(|e| classify("GetIPSet", e))?;

        let ip_set = output
            .ip_set()
            .ok_or_else(|| StoreError::NotFound(key.id.clone()))?;
        let lock_token = output
            .lock_token()
            .ok_or_else(|| StoreError::Api("GetIPSet returned no lock token".to_string()))?;

        Ok(RemoteIpSet {
            id: ip_set.id().to_string(),
            name: ip_set.name().to_string(),
            arn: ip_set.arn().to_string(),
            description: ip_set.description().map(str::to_string),
            addresses: ip_set.addresses().to_vec(),
            lock_token: lock_token.to_string(),
        })
    }

    async fn update_ip_set(
        &self,
        key: &IpSetKey,
        description: Option<String>,
        addresses: Vec<String>,
        lock_token: String,
    ) -> Result<String, StoreError> {
        let output = self
            .client
            .update_ip_set()
            .scope(waf_scope(key.scope))
            .name(&key.name)
            .id(&key.id)
            .set_description(description)
            .set_addresses(Some(addresses))
            .lock_token(lock_token)
            .send()
            .await
            .map_err(|e| classify("UpdateIPSet", e))?;

        Ok(output.next_lock_token().unwrap_or_default().to_string())
    }
}
