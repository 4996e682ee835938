//! Deterministic key construction and TTL policy.

use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use chrono::{Datelike, Utc};
use std::time::Duration;

/// Parameters that identify a cache entry.
#[derive(Debug, Clone)]
pub struct KeyParams<'a> {
    pub community_id: Option<&'a str>,
    pub dashboard_type: &'a str,
    pub date_basis: &'a str,
    pub block_start_date: Option<&'a str>,
    pub block_end_date: Option<&'a str>,
}

fn short(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Build the deterministic key `isd_{communityIdShort}_{dashboardType}_
/// {dateBasis}_{startShort}_{endShort}`.
///
/// Pure: identical inputs yield identical keys regardless of locale,
/// timezone, or process.
pub fn build_key(params: &KeyParams) -> String {
    let community_short = params
        .community_id
        .map(|c| short(c, 8))
        .unwrap_or_else(|| "global".to_string());
    let start_short = params
        .block_start_date
        .map(|d| short(d, 10))
        .unwrap_or_else(|| "default".to_string());
    let end_short = params
        .block_end_date
        .map(|d| short(d, 10))
        .unwrap_or_else(|| "default".to_string());

    format!(
        "isd_{}_{}_{}_{}_{}",
        community_short, params.dashboard_type, params.date_basis, start_short, end_short
    )
}

/// Parse a leading 4-digit year from a `blockStartDate`-shaped string.
///
/// Returns `None` if the input is absent or malformed - a malformed date
/// yields `year = None` rather than a parse error.
pub fn year_of(block_start_date: Option<&str>) -> Option<i32> {
    let s = block_start_date?;
    if s.len() < 4 {
        return None;
    }
    let candidate = &s[0..4];
    if !candidate.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    candidate.parse::<i32>().ok()
}

/// Compare `year` to the UTC calendar year at evaluation time.
pub fn is_current_year(year: Option<i32>) -> bool {
    match year {
        Some(y) => y == Utc::now().year(),
        None => false,
    }
}

/// TTL for an entry of the given year. A `None` year is treated as
/// past-year: see DESIGN.md for the rationale behind resolving the open
/// question this way.
pub fn ttl_for(year: Option<i32>, config: &CacheConfig) -> Duration {
    if is_current_year(year) {
        config.ttl_current_year
    } else {
        config.ttl_past_year
    }
}

/// An entry is valid iff `(now - entry.timestamp) < TTL(entry.year)`,
/// strict inequality so a read landing exactly on the TTL boundary counts
/// as expired.
pub fn is_valid(entry: &CacheEntry, now_ms: i64, config: &CacheConfig) -> bool {
    let ttl = ttl_for(entry.year, config);
    let age_ms = now_ms.saturating_sub(entry.timestamp);
    age_ms < ttl.as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic() {
        let params = KeyParams {
            community_id: Some("test-community-123"),
            dashboard_type: "community",
            date_basis: "added",
            block_start_date: Some("2024-01-01"),
            block_end_date: Some("2024-01-31"),
        };
        assert_eq!(
            build_key(&params),
            "isd_test-com_community_added_2024-01-01_2024-01-31"
        );
    }

    #[test]
    fn key_defaults_missing_parts() {
        let params = KeyParams {
            community_id: None,
            dashboard_type: "global",
            date_basis: "created",
            block_start_date: None,
            block_end_date: None,
        };
        assert_eq!(
            build_key(&params),
            "isd_global_global_created_default_default"
        );
    }

    #[test]
    fn year_extraction() {
        assert_eq!(year_of(Some("2024-01-01")), Some(2024));
        assert_eq!(year_of(Some("not-a-date")), None);
        assert_eq!(year_of(None), None);
        assert_eq!(year_of(Some("20x")), None);
    }

    #[test]
    fn current_year_entry_freshness_boundary() {
        let config = CacheConfig::default();
        let current_year = Utc::now().year();
        let mut entry = CacheEntry {
            key: "k".into(),
            data: crate::entry::PayloadVariant::Plain(serde_json::json!(null)),
            object_size: 0,
            timestamp: 0,
            last_accessed: 0,
            fingerprint: crate::entry::RequestFingerprint {
                community_id: None,
                dashboard_type: "d".into(),
                date_basis: "b".into(),
                block_start_date: None,
                block_end_date: None,
            },
            year: Some(current_year),
            server_fetch_timestamp: Some(0),
            version: crate::entry::ENTRY_VERSION.into(),
        };
        entry.timestamp = 0;

        let thirty_minutes = Duration::from_secs(30 * 60).as_millis() as i64;
        assert!(is_valid(&entry, thirty_minutes, &config), "30 minutes in should still be fresh");

        let two_hours = Duration::from_secs(2 * 60 * 60).as_millis() as i64;
        assert!(!is_valid(&entry, two_hours, &config), "2 hours in should be expired");
    }

    #[test]
    fn past_year_entry_freshness_boundary() {
        let config = CacheConfig::default();
        let current_year = Utc::now().year();
        let entry = CacheEntry {
            key: "k".into(),
            data: crate::entry::PayloadVariant::Plain(serde_json::json!(null)),
            object_size: 0,
            timestamp: 0,
            last_accessed: 0,
            fingerprint: crate::entry::RequestFingerprint {
                community_id: None,
                dashboard_type: "d".into(),
                date_basis: "b".into(),
                block_start_date: None,
                block_end_date: None,
            },
            year: Some(current_year - 1),
            server_fetch_timestamp: None,
            version: crate::entry::ENTRY_VERSION.into(),
        };

        let thirty_days = Duration::from_secs(30 * 24 * 60 * 60).as_millis() as i64;
        assert!(is_valid(&entry, thirty_days, &config), "30 days in should still be fresh");

        let two_years = Duration::from_secs(2 * 365 * 24 * 60 * 60).as_millis() as i64;
        assert!(!is_valid(&entry, two_years, &config), "2 years in should be expired");
    }

    #[test]
    fn ttl_boundary_is_expired() {
        let config = CacheConfig::default();
        let entry = CacheEntry {
            key: "k".into(),
            data: crate::entry::PayloadVariant::Plain(serde_json::json!(null)),
            object_size: 0,
            timestamp: 0,
            last_accessed: 0,
            fingerprint: crate::entry::RequestFingerprint {
                community_id: None,
                dashboard_type: "d".into(),
                date_basis: "b".into(),
                block_start_date: None,
                block_end_date: None,
            },
            year: Some(2000),
            server_fetch_timestamp: None,
            version: crate::entry::ENTRY_VERSION.into(),
        };
        let ttl_ms = config.ttl_past_year.as_millis() as i64;
        assert!(!is_valid(&entry, ttl_ms, &config));
        assert!(is_valid(&entry, ttl_ms - 1, &config));
    }

    proptest::proptest! {
        /// `build_key` is pure and deterministic: identical inputs always
        /// yield the identical key, for
        /// arbitrary ASCII identifier-shaped inputs.
        #[test]
        fn build_key_is_deterministic_for_arbitrary_inputs(
            community_id in "[a-z0-9-]{0,20}",
            dashboard_type in "[a-z]{1,12}",
            date_basis in "[a-z]{1,12}",
            start in "[0-9]{4}-[0-9]{2}-[0-9]{2}",
            end in "[0-9]{4}-[0-9]{2}-[0-9]{2}",
        ) {
            let params = KeyParams {
                community_id: Some(&community_id),
                dashboard_type: &dashboard_type,
                date_basis: &date_basis,
                block_start_date: Some(&start),
                block_end_date: Some(&end),
            };
            let first = build_key(&params);
            let second = build_key(&params);
            proptest::prop_assert_eq!(first, second);
        }
    }
}
