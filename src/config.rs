//! Configuration management for ipset-sync.
//!
//! Settings come from an optional YAML file; the target IP set can be
//! overridden through the environment (`IP_SETS_ARN`, `IP_SETS_NAME`,
//! `IP_SET_SCOPE`), which is how scheduled deployments usually pass it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::aggregator::RetryPolicy;
use crate::store::IpSetKey;

pub const ENV_IP_SET_ARN: &str = "IP_SETS_ARN";
pub const ENV_IP_SET_NAME: &str = "IP_SETS_NAME";
pub const ENV_IP_SET_SCOPE: &str = "IP_SET_SCOPE";

/// WAFv2 allows at most 10,000 addresses per IP set
pub const MAX_IP_SET_CAPACITY: usize = 10_000;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ARN of the managed IP set
    pub ip_set_arn: String,

    /// Name of the managed IP set
    pub ip_set_name: String,

    /// WAFv2 scope (regional, cloudfront)
    pub scope: Scope,

    /// Maximum number of addresses the IP set may hold
    pub capacity: usize,

    /// Attempts per AWS API call (SDK standard retry mode)
    pub aws_max_attempts: u32,

    /// Timeout for a single AWS API operation, retries included
    pub aws_timeout_secs: u64,

    /// Threat-intelligence feeds
    pub sources: Vec<SourceSpec>,

    /// HTTP settings for feed downloads
    pub fetch: FetchSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip_set_arn: String::new(),
            ip_set_name: String::new(),
            scope: Scope::Regional,
            capacity: MAX_IP_SET_CAPACITY,
            aws_max_attempts: 5,
            aws_timeout_secs: 60,
            sources: default_sources(),
            fetch: FetchSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file (if present) and the environment
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Config::default()
        };

        config.apply_env(|name| env::var(name).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(arn) = lookup(ENV_IP_SET_ARN).filter(|v| !v.is_empty()) {
            self.ip_set_arn = arn;
        }
        if let Some(name) = lookup(ENV_IP_SET_NAME).filter(|v| !v.is_empty()) {
            self.ip_set_name = name;
        }
        if let Some(scope) = lookup(ENV_IP_SET_SCOPE).filter(|v| !v.is_empty()) {
            self.scope = scope
                .parse::<Scope>()
                .map_err(|e: String| anyhow::anyhow!("{}: {}", ENV_IP_SET_SCOPE, e))?;
        }
        Ok(())
    }

    /// Validate configuration values (everything except the target IP set)
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 || self.capacity > MAX_IP_SET_CAPACITY {
            anyhow::bail!(
                "Invalid capacity {}. Must be between 1 and {}",
                self.capacity,
                MAX_IP_SET_CAPACITY
            );
        }

        if self.aws_max_attempts == 0 {
            anyhow::bail!("aws_max_attempts must be at least 1");
        }

        if self.aws_timeout_secs == 0 {
            anyhow::bail!("aws_timeout_secs must be at least 1");
        }

        if self.fetch.attempts == 0 {
            anyhow::bail!("fetch.attempts must be at least 1");
        }

        if self.fetch.max_concurrent == 0 {
            anyhow::bail!("fetch.max_concurrent must be at least 1");
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if !source.url.starts_with("https://") {
                anyhow::bail!("Source '{}' URL must use HTTPS: {}", source.name, source.url);
            }
            if !names.insert(source.name.as_str()) {
                anyhow::bail!("Duplicate source name '{}'", source.name);
            }
        }

        Ok(())
    }

    pub fn aws_timeout(&self) -> Duration {
        Duration::from_secs(self.aws_timeout_secs)
    }

    /// Resolve the managed IP set this configuration targets
    pub fn ip_set_key(&self) -> Result<IpSetKey> {
        if self.ip_set_arn.is_empty() {
            anyhow::bail!(
                "No IP set ARN configured. Set ip_set_arn or {}",
                ENV_IP_SET_ARN
            );
        }
        if self.ip_set_name.is_empty() {
            anyhow::bail!(
                "No IP set name configured. Set ip_set_name or {}",
                ENV_IP_SET_NAME
            );
        }
        IpSetKey::from_arn(self.scope, &self.ip_set_name, &self.ip_set_arn)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Regional resources (ALB, API Gateway, AppSync, ...)
    #[default]
    Regional,
    /// CloudFront distributions
    Cloudfront,
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "regional" => Ok(Scope::Regional),
            "cloudfront" => Ok(Scope::Cloudfront),
            other => Err(format!(
                "invalid scope '{}'. Valid values: regional, cloudfront",
                other
            )),
        }
    }
}

/// A threat-intelligence feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    pub url: String,
    /// Only lines starting with this literal token are considered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_prefix: Option<String>,
}

impl SourceSpec {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            line_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.line_prefix = Some(prefix.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchSettings {
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Attempts per feed before it is reported as failed
    pub attempts: u32,
    /// Initial backoff between attempts (doubled each retry)
    pub retry_delay_ms: u64,
    /// Maximum body size per feed
    pub max_feed_bytes: usize,
    /// Maximum feeds downloaded concurrently
    pub max_concurrent: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            attempts: 3,
            retry_delay_ms: 2000,
            max_feed_bytes: 10 * 1024 * 1024,
            max_concurrent: 4,
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

fn default_sources() -> Vec<SourceSpec> {
    vec![
        SourceSpec::new("spamhaus_drop", "https://www.spamhaus.org/drop/drop.txt"),
        SourceSpec::new("spamhaus_edrop", "https://www.spamhaus.org/drop/edrop.txt"),
        SourceSpec::new("tor_exit", "https://check.torproject.org/exit-addresses")
            .with_prefix("ExitAddress"),
        SourceSpec::new(
            "emerging_threats",
            "https://rules.emergingthreats.net/fwrules/emerging-Block-IPs.txt",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const ARN: &str = "arn:aws:wafv2:ap-northeast-1:123456789012:regional/ipset/blocked-ip-lists/a1b2c3d4-5678-90ab-cdef-EXAMPLE11111";

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scope, Scope::Regional);
        assert_eq!(config.capacity, MAX_IP_SET_CAPACITY);
        assert_eq!(config.aws_max_attempts, 5);
        assert_eq!(config.aws_timeout(), Duration::from_secs(60));
        assert_eq!(config.sources.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_sources() {
        let sources = default_sources();
        let tor = sources.iter().find(|s| s.name == "tor_exit").unwrap();
        assert_eq!(tor.line_prefix.as_deref(), Some("ExitAddress"));
        assert!(sources
            .iter()
            .filter(|s| s.name != "tor_exit")
            .all(|s| s.line_prefix.is_none()));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env_from(&[
                (ENV_IP_SET_ARN, ARN),
                (ENV_IP_SET_NAME, "blocked-ip-lists"),
                (ENV_IP_SET_SCOPE, "CLOUDFRONT"),
            ]))
            .unwrap();
        assert_eq!(config.ip_set_arn, ARN);
        assert_eq!(config.ip_set_name, "blocked-ip-lists");
        assert_eq!(config.scope, Scope::Cloudfront);
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let mut config = Config {
            ip_set_name: "from-file".to_string(),
            ..Default::default()
        };
        config.apply_env(env_from(&[(ENV_IP_SET_NAME, "")])).unwrap();
        assert_eq!(config.ip_set_name, "from-file");
    }

    #[test]
    fn test_invalid_env_scope() {
        let mut config = Config::default();
        let result = config.apply_env(env_from(&[(ENV_IP_SET_SCOPE, "global")]));
        assert!(result.unwrap_err().to_string().contains("invalid scope"));
    }

    #[test]
    fn test_ip_set_key_from_config() {
        let config = Config {
            ip_set_arn: ARN.to_string(),
            ip_set_name: "blocked-ip-lists".to_string(),
            ..Default::default()
        };
        let key = config.ip_set_key().unwrap();
        assert_eq!(key.id, "a1b2c3d4-5678-90ab-cdef-EXAMPLE11111");
        assert_eq!(key.name, "blocked-ip-lists");
        assert_eq!(key.scope, Scope::Regional);
    }

    #[test]
    fn test_ip_set_key_requires_arn_and_name() {
        let config = Config::default();
        assert!(config.ip_set_key().unwrap_err().to_string().contains("ARN"));

        let config = Config {
            ip_set_arn: ARN.to_string(),
            ..Default::default()
        };
        assert!(config.ip_set_key().unwrap_err().to_string().contains("name"));
    }

    #[test]
    fn test_validation_http_url_rejected() {
        let mut config = Config::default();
        config.sources[0].url = "http://www.spamhaus.org/drop/drop.txt".to_string();
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("HTTPS"));
    }

    #[test]
    fn test_validation_duplicate_source_names() {
        let mut config = Config::default();
        config.sources[1].name = config.sources[0].name.clone();
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("Duplicate"));
    }

    #[test]
    fn test_validation_capacity_bounds() {
        let config = Config {
            capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            capacity: MAX_IP_SET_CAPACITY + 1,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("capacity"));
    }

    #[test]
    fn test_validation_zero_attempts() {
        let config = Config {
            aws_max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            aws_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            fetch: FetchSettings {
                attempts: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
ip_set_arn: "{}"
ip_set_name: blocked-ip-lists
capacity: 5000
sources:
  - name: tor_exit
    url: https://check.torproject.org/exit-addresses
    line_prefix: ExitAddress
fetch:
  attempts: 1
"#,
            ARN
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.capacity, 5000);
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.fetch.attempts, 1);
        // Unspecified fields keep their defaults
        assert_eq!(config.fetch.timeout_secs, 30);
        assert_eq!(config.aws_max_attempts, 5);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.sources, default_sources());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "capacity: [not, a, number]").unwrap();
        let result = Config::load(file.path());
        assert!(result.unwrap_err().to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.sources, config.sources);
        assert_eq!(parsed.fetch, config.fetch);
    }

    #[test]
    fn test_retry_policy_from_settings() {
        let policy = FetchSettings::default().retry_policy();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.delay, Duration::from_millis(2000));
    }
}
