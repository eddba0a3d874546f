//! Utility functions for thermex-core.
//!
//! This module contains shared utility functions used across the crate.

use std::sync::{Mutex, MutexGuard, PoisonError};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Lock a std mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stable identifier derived from the hood's host.
///
/// # Example
///
/// ```
/// use thermex_core::util::unique_id_for_host;
///
/// assert_eq!(unique_id_for_host("192.168.1.50"), "thermex_192_168_1_50");
/// ```
pub fn unique_id_for_host(host: &str) -> String {
    format!("thermex_{}", host.replace('.', "_"))
}

/// Fractional seconds since the Unix epoch.
pub fn unix_seconds(dt: OffsetDateTime) -> f64 {
    dt.unix_timestamp_nanos() as f64 / 1_000_000_000.0
}

/// Format a timestamp as RFC 3339, falling back to the Unix timestamp.
pub fn format_rfc3339(dt: OffsetDateTime) -> String {
    dt.format(&Rfc3339)
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

/// Shorten a string for log and diagnostics output.
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_id_for_host() {
        assert_eq!(unique_id_for_host("10.0.0.1"), "thermex_10_0_0_1");
        assert_eq!(unique_id_for_host("hood.local"), "thermex_hood_local");
    }

    #[test]
    fn test_format_rfc3339() {
        let dt = OffsetDateTime::from_unix_timestamp(0).unwrap();
        assert_eq!(format_rfc3339(dt), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[test]
    fn test_unix_seconds() {
        let dt = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
            + time::Duration::milliseconds(500);
        assert_eq!(unix_seconds(dt), 1_700_000_000.5);
    }
}
