//! External collaborator: the upstream statistics fetcher.
//!
//! Out of scope for this crate: the upstream HTTP statistics API is
//! modeled as a trait object so the worker can invoke it during
//! background refresh without knowing anything about its implementation.

use async_trait::async_trait;
use thiserror::Error;

/// Parameters for a single fetch, mirroring the fields that make up a
/// cache key plus the compression preference for the refresh.
#[derive(Debug, Clone)]
pub struct FetchParams {
    pub community_id: Option<String>,
    pub dashboard_type: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub date_basis: String,
    pub want_compressed: bool,
}

/// Failure fetching from the upstream statistics API.
#[derive(Error, Debug)]
#[error("stats fetch failed: {0}")]
pub struct FetchError(pub String);

/// The upstream statistics transformer, treated as opaque.
#[async_trait]
pub trait StatsFetcher: Send + Sync {
    /// Fetch a fresh payload for the given parameters.
    async fn fetch(&self, params: &FetchParams) -> Result<serde_json::Value, FetchError>;
}
