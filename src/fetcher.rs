//! HTTP fetcher for threat-intelligence feeds.
//!
//! Feed bodies are streamed and parsed line by line, so memory use is bounded
//! by the largest line rather than the size of the feed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use std::fmt::Display;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::config::{FetchSettings, SourceSpec};
use crate::error::FeedFetchError;
use crate::parser::{extract_entry, CidrSet};
use crate::utils::{format_bytes, format_count};

/// Result of fetching one feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedResult {
    pub name: String,
    pub entries: CidrSet,
    /// Lines read from the feed (matching or not)
    pub lines: usize,
    /// Lines skipped because they were not valid UTF-8
    pub undecodable_lines: usize,
}

/// Anything that can turn a [`SourceSpec`] into a set of entries
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FeedFetch: Send + Sync {
    async fn fetch(&self, source: &SourceSpec) -> Result<FeedResult, FeedFetchError>;
}

/// HTTP client for fetching feeds.
///
/// A single GET per call; retries are the aggregator's business.
pub struct Fetcher {
    client: Client,
    max_feed_bytes: usize,
}

impl Fetcher {
    /// Create a new fetcher
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .user_agent(format!("ipset-sync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            max_feed_bytes: settings.max_feed_bytes,
        })
    }
}

// Note: Default is intentionally not implemented for Fetcher
// because new() can fail and we want explicit error handling.

#[async_trait]
impl FeedFetch for Fetcher {
    async fn fetch(&self, source: &SourceSpec) -> Result<FeedResult, FeedFetchError> {
        debug!("GET {}", source.url);

        let response = self
            .client
            .get(&source.url)
            .send()
            .await
            .map_err(|e| FeedFetchError::new(&source.name, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedFetchError::new(&source.name, format!("HTTP {}", status)));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_bytes as u64 {
                return Err(FeedFetchError::new(
                    &source.name,
                    format!(
                        "Response too large: {} (max: {})",
                        format_bytes(content_length),
                        format_bytes(self.max_feed_bytes as u64)
                    ),
                ));
            }
        }

        let result = read_feed(source, response.bytes_stream(), self.max_feed_bytes).await?;

        info!(
            "Fetched {} - {} entries from {} lines",
            source.name,
            format_count(result.entries.len()),
            format_count(result.lines)
        );

        Ok(result)
    }
}

/// Parse a feed body delivered as a stream of byte chunks.
///
/// Chunks may split lines anywhere; `\r\n` endings are accepted and lines
/// that are not valid UTF-8 are skipped. Fails once more than `max_bytes`
/// have been received.
pub async fn read_feed<S, B, E>(
    source: &SourceSpec,
    stream: S,
    max_bytes: usize,
) -> Result<FeedResult, FeedFetchError>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut lines = FeedLines::new(source);
    let mut received = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FeedFetchError::new(&source.name, e))?;
        let chunk = chunk.as_ref();
        received += chunk.len();
        if received > max_bytes {
            return Err(FeedFetchError::new(
                &source.name,
                format!(
                    "Downloaded content too large: more than {}",
                    format_bytes(max_bytes as u64)
                ),
            ));
        }
        lines.push(chunk);
    }

    Ok(lines.finish())
}

/// Incremental line splitter feeding the parser
struct FeedLines<'a> {
    prefix: Option<&'a str>,
    pending: Vec<u8>,
    result: FeedResult,
}

impl<'a> FeedLines<'a> {
    fn new(source: &'a SourceSpec) -> Self {
        Self {
            prefix: source.line_prefix.as_deref(),
            pending: Vec::new(),
            result: FeedResult {
                name: source.name.clone(),
                ..Default::default()
            },
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let mut start = 0;
        for (i, byte) in chunk.iter().enumerate() {
            if *byte != b'\n' {
                continue;
            }
            if self.pending.is_empty() {
                self.line(&chunk[start..i]);
            } else {
                self.pending.extend_from_slice(&chunk[start..i]);
                let line = std::mem::take(&mut self.pending);
                self.line(&line);
                // Keep the allocation for the next split line
                self.pending = line;
                self.pending.clear();
            }
            start = i + 1;
        }
        self.pending.extend_from_slice(&chunk[start..]);
    }

    fn line(&mut self, raw: &[u8]) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        self.result.lines += 1;
        match std::str::from_utf8(raw) {
            Ok(text) => self.result.entries.extend(extract_entry(text, self.prefix)),
            Err(_) => {
                debug!(
                    "{}: skipping undecodable line {}",
                    self.result.name, self.result.lines
                );
                self.result.undecodable_lines += 1;
            }
        }
    }

    fn finish(mut self) -> FeedResult {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.line(&line);
        }
        self.result
    }
}
