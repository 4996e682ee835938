//! # Storage adapter
//!
//! Wraps a durable, embedded key/value store (`sled`) as the cache
//! engine's persistence layer. sled stands in for the
//! IndexedDB object store the original browser-hosted engine used: a
//! single-writer, crash-tolerant store opened once per session, with
//! secondary-index trees maintained alongside the primary `stats_cache`
//! tree since sled itself has no native secondary-index concept.
//!
//! Opening the store is fatal for the session on failure; individual
//! get/put/delete operations are reported per call and never terminate
//! the engine.

use crate::entry::CacheEntry;
use crate::error::StorageError;
use std::path::Path;
use tracing::{debug, warn};

/// Name of the primary object store tree.
pub const PRIMARY_TREE: &str = "stats_cache";

/// Secondary index trees maintained alongside the primary tree.
/// Each maps a sortable encoding of the indexed field to the primary key,
/// so eviction and diagnostics can scan in index order without touching
/// the (larger) primary tree.
pub const INDEX_TIMESTAMP: &str = "idx_timestamp";
pub const INDEX_LAST_ACCESSED: &str = "idx_last_accessed";
pub const INDEX_COMMUNITY_ID: &str = "idx_community_id";
pub const INDEX_YEAR: &str = "idx_year";
pub const INDEX_DATE_BASIS: &str = "idx_date_basis";

const ALL_INDICES: &[&str] = &[
    INDEX_TIMESTAMP,
    INDEX_LAST_ACCESSED,
    INDEX_COMMUNITY_ID,
    INDEX_YEAR,
    INDEX_DATE_BASIS,
];

/// Aggregate, non-authoritative diagnostics about the store: entry count
/// plus on-disk size, useful for host-side monitoring dashboards.
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub entry_count: usize,
    pub disk_size_bytes: u64,
}

/// The durable key/value store backing the cache.
pub struct SledStore {
    db: sled::Db,
    primary: sled::Tree,
}

fn index_sort_key(primary: i64, key: &str) -> Vec<u8> {
    // Big-endian so sled's lexicographic tree ordering matches numeric
    // ordering; the primary key is appended to keep duplicate sort values
    // (e.g. two entries with the same timestamp) distinguishable.
    let mut out = Vec::with_capacity(8 + key.len());
    out.extend_from_slice(&primary.to_be_bytes());
    out.extend_from_slice(key.as_bytes());
    out
}

/// Sort key for `idx_last_accessed`: `(last_accessed, timestamp, key)`, so
/// entries tied on `last_accessed` order ascending by `timestamp`, with the
/// primary key as a final tiebreaker for entries tied on both.
fn last_accessed_sort_key(last_accessed: i64, timestamp: i64, key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + key.len());
    out.extend_from_slice(&last_accessed.to_be_bytes());
    out.extend_from_slice(&timestamp.to_be_bytes());
    out.extend_from_slice(key.as_bytes());
    out
}

impl SledStore {
    /// Open (or create) the store at `path`, upgrading to `schema_version`
    /// by ensuring every secondary index tree exists. Tree creation is
    /// idempotent in sled - opening an existing tree never errors - so a
    /// failure to (re-)create an already-present index degenerates to a
    /// debug log rather than a fatal error.
    pub fn open(path: impl AsRef<Path>, schema_version: u32) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(|e| StorageError::Open(e.to_string()))?;
        let primary = db
            .open_tree(PRIMARY_TREE)
            .map_err(|e| StorageError::Open(e.to_string()))?;

        for index in ALL_INDICES {
            match db.open_tree(index) {
                Ok(_) => debug!(index = *index, "secondary index tree ready"),
                Err(e) => warn!(index = *index, error = %e, "failed to open secondary index tree"),
            }
        }

        debug!(schema_version, "cache store opened");
        Ok(Self { db, primary })
    }

    fn index_tree(&self, name: &str) -> Result<sled::Tree, StorageError> {
        Ok(self.db.open_tree(name)?)
    }

    fn reindex(&self, old: Option<&CacheEntry>, new: &CacheEntry) -> Result<(), StorageError> {
        if let Some(old) = old {
            self.remove_index_entries(old)?;
        }
        self.insert_index_entries(new)
    }

    fn insert_index_entries(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        self.index_tree(INDEX_TIMESTAMP)?
            .insert(index_sort_key(entry.timestamp, &entry.key), entry.key.as_bytes())?;
        self.index_tree(INDEX_LAST_ACCESSED)?.insert(
            last_accessed_sort_key(entry.last_accessed, entry.timestamp, &entry.key),
            entry.key.as_bytes(),
        )?;
        if let Some(community_id) = &entry.fingerprint.community_id {
            let mut k = community_id.clone().into_bytes();
            k.push(0);
            k.extend_from_slice(entry.key.as_bytes());
            self.index_tree(INDEX_COMMUNITY_ID)?.insert(k, entry.key.as_bytes())?;
        }
        if let Some(year) = entry.year {
            self.index_tree(INDEX_YEAR)?
                .insert(index_sort_key(year as i64, &entry.key), entry.key.as_bytes())?;
        }
        let mut k = entry.fingerprint.date_basis.clone().into_bytes();
        k.push(0);
        k.extend_from_slice(entry.key.as_bytes());
        self.index_tree(INDEX_DATE_BASIS)?.insert(k, entry.key.as_bytes())?;
        Ok(())
    }

    fn remove_index_entries(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        self.index_tree(INDEX_TIMESTAMP)?
            .remove(index_sort_key(entry.timestamp, &entry.key))?;
        self.index_tree(INDEX_LAST_ACCESSED)?
            .remove(last_accessed_sort_key(entry.last_accessed, entry.timestamp, &entry.key))?;
        if let Some(community_id) = &entry.fingerprint.community_id {
            let mut k = community_id.clone().into_bytes();
            k.push(0);
            k.extend_from_slice(entry.key.as_bytes());
            self.index_tree(INDEX_COMMUNITY_ID)?.remove(k)?;
        }
        if let Some(year) = entry.year {
            self.index_tree(INDEX_YEAR)?
                .remove(index_sort_key(year as i64, &entry.key))?;
        }
        let mut k = entry.fingerprint.date_basis.clone().into_bytes();
        k.push(0);
        k.extend_from_slice(entry.key.as_bytes());
        self.index_tree(INDEX_DATE_BASIS)?.remove(k)?;
        Ok(())
    }

    /// Fetch an entry by key.
    pub fn get(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        match self.primary.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Insert or overwrite an entry. Maintains secondary
    /// indices in the same call; sled's per-tree transactions mean the
    /// primary write and the index writes are not atomic with each other,
    /// which is acceptable because the serial message queue
    /// guarantees at most one cache operation is in flight at a time.
    pub fn put(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        let previous = self.get(&entry.key)?;
        let bytes = serde_json::to_vec(entry)?;
        self.primary.insert(entry.key.as_bytes(), bytes)?;
        self.reindex(previous.as_ref(), entry)?;
        Ok(())
    }

    /// Delete an entry by key.
    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        if let Some(entry) = self.get(key)? {
            self.remove_index_entries(&entry)?;
        }
        self.primary.remove(key.as_bytes())?;
        Ok(())
    }

    /// Remove every entry and index row.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.primary.clear()?;
        for index in ALL_INDICES {
            self.index_tree(index)?.clear()?;
        }
        Ok(())
    }

    /// Return every entry in the store.
    pub fn get_all(&self) -> Result<Vec<CacheEntry>, StorageError> {
        self.primary
            .iter()
            .values()
            .map(|res| {
                let bytes = res?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .collect()
    }

    /// Total entry count.
    pub fn count(&self) -> Result<usize, StorageError> {
        Ok(self.primary.len())
    }

    /// Entries ordered ascending by `(lastAccessed, timestamp)`, used by the
    /// eviction engine. Reads the `idx_last_accessed` tree directly: its
    /// sort key already encodes the tiebreak, so iteration order is the
    /// eviction order.
    pub fn keys_by_last_accessed_ascending(&self) -> Result<Vec<String>, StorageError> {
        self.index_tree(INDEX_LAST_ACCESSED)?
            .iter()
            .values()
            .map(|res| {
                let bytes = res?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            })
            .collect()
    }

    /// Update only `last_accessed` for a key, used by the GET handler's
    /// fire-and-forget LRU touch-up. Swallows a missing key.
    pub fn touch_last_accessed(&self, key: &str, now_ms: i64) -> Result<(), StorageError> {
        if let Some(mut entry) = self.get(key)? {
            let old_sort_key = last_accessed_sort_key(entry.last_accessed, entry.timestamp, &entry.key);
            entry.last_accessed = now_ms;
            let bytes = serde_json::to_vec(&entry)?;
            self.primary.insert(entry.key.as_bytes(), bytes)?;
            let idx = self.index_tree(INDEX_LAST_ACCESSED)?;
            idx.remove(old_sort_key)?;
            idx.insert(
                last_accessed_sort_key(now_ms, entry.timestamp, &entry.key),
                entry.key.as_bytes(),
            )?;
        }
        Ok(())
    }

    /// Diagnostics snapshot (supplemental, see module docs).
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            entry_count: self.primary.len(),
            disk_size_bytes: self.db.size_on_disk().unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{PayloadVariant, RequestFingerprint};

    fn sample_entry(key: &str, last_accessed: i64) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            data: PayloadVariant::Plain(serde_json::json!({"v": 1})),
            object_size: 10,
            timestamp: last_accessed,
            last_accessed,
            fingerprint: RequestFingerprint {
                community_id: Some("community-1".into()),
                dashboard_type: "community".into(),
                date_basis: "added".into(),
                block_start_date: Some("2024-01-01".into()),
                block_end_date: Some("2024-01-31".into()),
            },
            year: Some(2024),
            server_fetch_timestamp: None,
            version: crate::entry::ENTRY_VERSION.into(),
        }
    }

    fn sample_entry_with_timestamp(key: &str, last_accessed: i64, timestamp: i64) -> CacheEntry {
        let mut entry = sample_entry(key, last_accessed);
        entry.timestamp = timestamp;
        entry
    }

    #[test]
    fn put_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path(), 1).unwrap();
        let entry = sample_entry("k1", 100);
        store.put(&entry).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        let fetched = store.get("k1").unwrap().unwrap();
        assert_eq!(fetched.key, "k1");
        store.delete("k1").unwrap();
        assert!(store.get("k1").unwrap().is_none());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn last_accessed_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path(), 1).unwrap();
        store.put(&sample_entry("a", 300)).unwrap();
        store.put(&sample_entry("b", 100)).unwrap();
        store.put(&sample_entry("c", 200)).unwrap();
        let ordered = store.keys_by_last_accessed_ascending().unwrap();
        assert_eq!(ordered, vec!["b", "c", "a"]);
    }

    #[test]
    fn equal_last_accessed_breaks_tie_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path(), 1).unwrap();
        // All three tied on last_accessed; ascending timestamp should
        // decide the order, not key byte order ("a" < "b" < "c" would be
        // wrong here since "c" has the oldest timestamp).
        store.put(&sample_entry_with_timestamp("a", 500, 300)).unwrap();
        store.put(&sample_entry_with_timestamp("b", 500, 100)).unwrap();
        store.put(&sample_entry_with_timestamp("c", 500, 200)).unwrap();
        let ordered = store.keys_by_last_accessed_ascending().unwrap();
        assert_eq!(ordered, vec!["b", "c", "a"]);
    }

    #[test]
    fn clear_empties_store_and_indices() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path(), 1).unwrap();
        store.put(&sample_entry("a", 1)).unwrap();
        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.keys_by_last_accessed_ascending().unwrap().is_empty());
    }

    #[test]
    fn touch_last_accessed_updates_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path(), 1).unwrap();
        store.put(&sample_entry("a", 100)).unwrap();
        store.put(&sample_entry("b", 200)).unwrap();
        store.touch_last_accessed("a", 300).unwrap();
        let ordered = store.keys_by_last_accessed_ascending().unwrap();
        assert_eq!(ordered, vec!["b", "a"]);
    }
}
