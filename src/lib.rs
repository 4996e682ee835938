//! # Off-thread statistics cache engine
//!
//! An embeddable cache engine for a dashboard's upstream statistics API: a
//! background worker owns a durable local key/value store, services
//! requests from a foreground client with a priority-aware message
//! protocol, enforces a two-tier TTL policy tied to calendar semantics,
//! evicts under a fixed capacity with an LRU discipline, transparently
//! refreshes stale entries in the background, and publishes update
//! notifications - all while shielding the caller from the cost of
//! compression, decompression, and storage I/O.
//!
//! ## Architecture
//!
//! - [`client`]: the promise-returning surface the rest of the application
//!   uses (`CacheClient`)
//! - [`worker`]: the serial dispatch loop and operation handlers, run on
//!   their own tokio task
//! - [`storage`]: the durable store adapter (`sled`-backed)
//! - [`queue`]: the priority-ordered FIFO message queue
//! - [`key`]: deterministic key construction and TTL policy
//! - [`codec`]: transparent/compressed payload encoding
//! - [`eviction`]: capacity enforcement under LRU
//! - [`entry`]: the cache entry data model
//! - [`fetcher`]: the external statistics-fetcher collaborator
//! - [`protocol`]: wire message/result shapes
//! - [`config`]: configuration knobs
//! - [`error`]: the error taxonomy

pub mod client;
pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod eviction;
pub mod fetcher;
pub mod key;
pub mod protocol;
pub mod queue;
pub mod storage;
pub mod worker;

pub use client::CacheClient;
pub use config::CacheConfig;
pub use entry::{CacheEntry, PayloadVariant};
pub use error::{CacheError, CodecError, Result, StorageError};
pub use fetcher::{FetchError, FetchParams, StatsFetcher};
pub use protocol::{CacheUpdated, ClearOneParams, GetParams, GetResult, SetParams, SetResult};

/// Re-export crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
