//! Common formatting helpers.
//!
//! - [`format_count`] - Format counts with K/M suffix (1.5K, 2.3M)
//! - [`format_bytes`] - Format byte sizes (KB, MB, GB)
//! - [`format_entries`] - Render a list of entries as `[a, b, c]`

use std::fmt::Display;

/// Format a count with K/M suffix for compact display.
///
/// # Examples
/// ```
/// use ipset_sync::utils::format_count;
/// assert_eq!(format_count(500), "500");
/// assert_eq!(format_count(1500), "1.5K");
/// assert_eq!(format_count(1_500_000), "1.5M");
/// ```
pub fn format_count(count: usize) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

/// Format bytes in human-readable form (KB, MB, GB).
///
/// # Examples
/// ```
/// use ipset_sync::utils::format_bytes;
/// assert_eq!(format_bytes(1024), "1.0 KB");
/// assert_eq!(format_bytes(10 * 1024 * 1024), "10.0 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Render every item as `[a, b, c]`.
///
/// # Examples
/// ```
/// use ipset_sync::utils::format_entries;
/// assert_eq!(format_entries(["1.2.3.0/24", "5.6.7.8/32"]), "[1.2.3.0/24, 5.6.7.8/32]");
/// assert_eq!(format_entries(Vec::<String>::new()), "[]");
/// ```
pub fn format_entries<I>(items: I) -> String
where
    I: IntoIterator,
    I::Item: Display,
{
    let items: Vec<String> = items.into_iter().map(|item| item.to_string()).collect();
    format!("[{}]", items.join(", "))
}
