//! Error taxonomy for the cache engine.

use thiserror::Error;

/// Errors produced by the storage adapter.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Opening or upgrading the durable store failed. Fatal for the session.
    #[error("failed to open cache store: {0}")]
    Open(String),

    /// A single get/put/delete/clear/count operation failed.
    #[error("cache store operation failed: {0}")]
    Operation(#[from] sled::Error),

    /// The stored bytes for an entry could not be decoded as an entry row.
    #[error("stored entry is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors produced by the codec.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The `compressed` flag on the entry disagrees with the shape of `data`.
    #[error("payload shape does not match the compressed flag")]
    Mismatch,

    /// gzip encode/decode failed.
    #[error("gzip codec failure: {0}")]
    Gzip(#[from] std::io::Error),

    /// The decompressed bytes were not valid UTF-8 / JSON.
    #[error("decoded payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error type returned by worker operation handlers and the
/// client stub, collapsed into one enum since every caller-visible
/// failure ends up serialized into a `{success: false, error}` result.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Store-open failure (taxonomy entry 1) - fatal for the session.
    #[error("store open failed: {0}")]
    StoreOpen(String),

    /// Store-op failure (taxonomy entry 2) - isolated to one operation.
    #[error("store operation failed: {0}")]
    StoreOp(#[from] StorageError),

    /// Payload-corruption on read (taxonomy entry 3).
    #[error("cache entry corrupted: {0}")]
    Corruption(#[from] CodecError),

    /// Background-refresh failure (taxonomy entry 5).
    #[error("background refresh failed: {0}")]
    BackgroundRefresh(String),

    /// Worker-level unhandled exception (taxonomy entry 7): the offending
    /// message is rejected, the dispatcher continues.
    #[error("unhandled worker error: {0}")]
    Other(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CacheError>;
