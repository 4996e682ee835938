//! Configuration knobs recognized by the engine.

use std::path::PathBuf;
use std::time::Duration;

/// Schema version of the `stats_cache` object store. Bumped whenever a
/// secondary index is added.
pub const SCHEMA_VERSION: u32 = 1;

/// Configuration for a [`crate::worker::CacheWorker`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Eviction threshold. Must be >= 1.
    pub max_entries: usize,

    /// TTL for entries whose `year` is the current UTC calendar year.
    pub ttl_current_year: Duration,

    /// TTL for entries whose `year` is a past year (or absent, per the
    /// open-question resolution documented in DESIGN.md).
    pub ttl_past_year: Duration,

    /// Directory backing the durable sled store.
    pub store_path: PathBuf,

    /// Schema version to open the store at.
    pub schema_version: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 20,
            ttl_current_year: Duration::from_secs(60 * 60),
            ttl_past_year: Duration::from_secs(60 * 60 * 24 * 365),
            store_path: PathBuf::from("./stats-cache"),
            schema_version: SCHEMA_VERSION,
        }
    }
}

impl CacheConfig {
    /// Clamp `max_entries` to a sane minimum so the eviction loop can never
    /// spin forever on a misconfigured capacity of zero.
    pub fn normalized(mut self) -> Self {
        self.max_entries = self.max_entries.max(1);
        self
    }
}
