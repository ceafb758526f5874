//! Line parser for threat-intelligence feeds.
//!
//! Feeds come in several flavours: bare CIDR lists (Emerging Threats),
//! CIDRs followed by a `; SBL...` reference (Spamhaus DROP/EDROP), and
//! labelled lines such as `ExitAddress 1.2.3.4 2024-01-01 12:00:00` (Tor).
//! All of them reduce to "optional label, then an IPv4 address with an
//! optional prefix length at the start of the line".

use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// A canonical CIDR entry in `address/prefix` form.
///
/// Two entries are equal iff their strings are equal; host bits are not
/// masked, so `1.2.3.4/24` and `1.2.3.0/24` are distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CidrEntry(String);

/// Set of CIDR entries, ordered for stable output.
pub type CidrSet = BTreeSet<CidrEntry>;

impl CidrEntry {
    /// Wrap an address read back from the remote set.
    ///
    /// Remote entries are never dropped, so anything that is not a bare IP
    /// address is carried through verbatim.
    pub fn from_remote(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.contains('/') {
            return Self(trimmed.to_string());
        }
        match trimmed.parse::<IpAddr>() {
            Ok(ip) => Self(IpNet::from(ip).to_string()),
            Err(_) => Self(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<Ipv4Net> for CidrEntry {
    fn from(net: Ipv4Net) -> Self {
        Self(net.to_string())
    }
}

impl fmt::Display for CidrEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the CIDR entries found on a single feed line.
///
/// Lines that do not match yield an empty set.
pub fn extract(line: &str, prefix: Option<&str>) -> CidrSet {
    extract_entry(line, prefix).into_iter().collect()
}

/// Extract the (at most one) CIDR entry at the start of `line`.
///
/// When `prefix` is set, the line must begin with that literal token;
/// whitespace between the token and the address is optional.
pub fn extract_entry(line: &str, prefix: Option<&str>) -> Option<CidrEntry> {
    let mut rest = line.trim();
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        rest = rest.strip_prefix(prefix)?;
    }
    let rest = rest.trim_start();

    // Address token ends at the first character that can't be part of it
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '/'))
        .unwrap_or(rest.len());

    parse_token(&rest[..end]).map(CidrEntry::from)
}

/// Extract all entries from a whole feed body.
pub fn extract_lines(content: &str, prefix: Option<&str>) -> CidrSet {
    content
        .lines()
        .filter_map(|line| extract_entry(line, prefix))
        .collect()
}

fn parse_token(token: &str) -> Option<Ipv4Net> {
    if token.is_empty() {
        return None;
    }
    let (addr, prefix_len) = match token.split_once('/') {
        Some((addr, len)) => (addr, parse_prefix_len(len)?),
        None => (token, 32),
    };
    let addr: Ipv4Addr = addr.parse().ok()?;
    Ipv4Net::new(addr, prefix_len).ok()
}

/// Prefix lengths are plain decimals 0-32 without leading zeros.
fn parse_prefix_len(s: &str) -> Option<u8> {
    if s.is_empty() || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok().filter(|len| *len <= 32)
}
