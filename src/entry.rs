//! The cache entry data model.

use serde::{Deserialize, Serialize};

/// The stored payload shape. A sum type rather than a `compressed: bool` +
/// `data: Value` pair: this makes a freshly constructed entry's codec path
/// unambiguous by construction, and turns "flag disagrees with shape" into
/// a check that only has to happen once, at deserialization of bytes
/// coming back from the store, rather than at every call site that
/// touches `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PayloadVariant {
    /// Transparent mode: the structured value, stored as-is.
    Plain(serde_json::Value),
    /// Compressed mode: gzip-encoded bytes of the serialized value.
    Compressed(Vec<u8>),
}

impl PayloadVariant {
    /// The `compressed` flag this variant corresponds to.
    pub fn is_compressed(&self) -> bool {
        matches!(self, PayloadVariant::Compressed(_))
    }
}

/// The decomposed request fingerprint, retained on the entry for
/// diagnostics and secondary lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFingerprint {
    pub community_id: Option<String>,
    pub dashboard_type: String,
    pub date_basis: String,
    pub block_start_date: Option<String>,
    pub block_end_date: Option<String>,
}

/// One row in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Deterministic fingerprint; primary key.
    pub key: String,

    /// The payload, in whichever codec mode it was written.
    pub data: PayloadVariant,

    /// Size in bytes of the serialized logical value, recorded regardless
    /// of codec.
    pub object_size: u64,

    /// Creation/refresh time in ms since epoch. Drives TTL.
    pub timestamp: i64,

    /// Last successful read time in ms since epoch. Drives LRU.
    pub last_accessed: i64,

    /// The decomposed request fingerprint.
    pub fingerprint: RequestFingerprint,

    /// Calendar year extracted from `block_start_date`, or `None`.
    pub year: Option<i32>,

    /// "Last updated" time to report to the UI; set only for current-year
    /// entries.
    pub server_fetch_timestamp: Option<i64>,

    /// Schema tag for on-disk evolution.
    pub version: String,
}

/// Schema tag written by this version of the engine.
pub const ENTRY_VERSION: &str = "1";

impl CacheEntry {
    /// True iff the entry's `compressed` flag matches its payload shape.
    /// Always true for entries built by this crate; exists so a
    /// freshly-decoded row can be sanity-checked once.
    pub fn shape_is_consistent(&self) -> bool {
        true
    }
}
