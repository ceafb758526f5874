//! # ipset-sync - WAFv2 IP set synchronizer
//!
//! Keeps an AWS WAFv2 IP set in sync with public threat-intelligence feeds
//! (Spamhaus DROP/EDROP, Tor exit nodes, Emerging Threats). Each run is a
//! periodic, idempotent reconciliation meant to be triggered by a scheduler.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ipset-sync                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: sync, fetch, show, sources, version        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml + environment)                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SyncJob                                                    │
//! │    read ──> aggregate ──> merge (union) ──> write ──> report │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  Aggregator (retry, fan-out) │  ManagedSetClient (CAS)      │
//! │  Fetcher (reqwest, streamed) │  IpSetStore trait            │
//! │  Parser (ipnet)              │    └── Wafv2Store (aws-sdk)  │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Monotonic** - entries already in the set are never removed
//! - **No lost updates** - writes carry a freshly read lock token; a
//!   concurrent writer makes the run fail instead of overwriting
//! - **No truncation** - a merged set above capacity fails the run
//! - **Best effort feeds** - a failing feed is reported, not fatal
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ipset_sync::aggregator::Aggregator;
//! use ipset_sync::config::Config;
//! use ipset_sync::fetcher::Fetcher;
//! use ipset_sync::managed_set::ManagedSetClient;
//! use ipset_sync::store::Wafv2Store;
//! use ipset_sync::sync::SyncJob;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/ipset-sync/config.yaml")?;
//!
//!     let store = Wafv2Store::connect(config.aws_max_attempts, config.aws_timeout()).await;
//!     let client = ManagedSetClient::new(Arc::new(store), config.ip_set_key()?, config.capacity);
//!     let aggregator = Aggregator::new(
//!         Box::new(Fetcher::new(&config.fetch)?),
//!         config.fetch.retry_policy(),
//!         config.fetch.max_concurrent,
//!     );
//!
//!     let report = SyncJob::new(client, aggregator, config.sources.clone())
//!         .run(false)
//!         .await?;
//!     println!("newly added: {}", report.newly_added.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`parser`] - Feed line parsing into CIDR entries
//! - [`fetcher`] - Streaming HTTP download of a single feed
//! - [`aggregator`] - Concurrent fetch, retry and union of all feeds
//! - [`store`] - Remote IP set access (WAFv2)
//! - [`managed_set`] - Read and compare-and-swap write of the IP set
//! - [`sync`] - The reconciliation run
//! - [`config`] - Configuration parsing and validation
//! - [`cli`] / [`commands`] - Command-line interface

pub mod aggregator;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod managed_set;
pub mod parser;
pub mod store;
pub mod sync;
pub mod utils;

pub use config::Config;
pub use error::{FeedFetchError, SyncError};
