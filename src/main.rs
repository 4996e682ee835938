//! Demo entry point exercising the cache engine end to end.
//!
//! Spins up a `CacheClient` backed by a throwaway store, issues a `SET`
//! followed by a `GET`, and prints the round trip. Useful as a smoke test
//! and as a reference for how a host application wires up the engine.

use async_trait::async_trait;
use stats_cache_engine::{
    CacheClient, CacheConfig, FetchError, FetchParams, GetParams, SetParams, StatsFetcher,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// A stand-in for the real upstream statistics fetcher - out of scope for
/// this crate - returning a fixed payload so the demo doesn't need
/// network access.
struct DemoFetcher;

#[async_trait]
impl StatsFetcher for DemoFetcher {
    async fn fetch(&self, params: &FetchParams) -> Result<serde_json::Value, FetchError> {
        Ok(serde_json::json!({
            "dashboardType": params.dashboard_type,
            "refreshedAt": chrono::Utc::now().to_rfc3339(),
        }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = stats_cache_engine::VERSION, "starting stats cache engine demo");

    let config = CacheConfig {
        store_path: std::env::temp_dir().join("stats-cache-engine-demo"),
        ..CacheConfig::default()
    };

    let client = CacheClient::new(config, Arc::new(DemoFetcher))?;

    let mut updates = client.subscribe();
    tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            tracing::info!(cache_key = %update.cache_key, success = update.success, "cache updated");
        }
    });

    let set_result = client
        .set(SetParams {
            community_id: Some("demo-community".to_string()),
            dashboard_type: "community".to_string(),
            date_basis: "added".to_string(),
            block_start_date: Some("2024-01-01".to_string()),
            block_end_date: Some("2024-01-31".to_string()),
            data: serde_json::json!({"records": 1234}),
            year: None,
            want_compressed: true,
        })
        .await?;
    tracing::info!(cache_key = %set_result.cache_key, compressed = set_result.compressed, "set complete");

    let get_result = client
        .get(GetParams {
            community_id: Some("demo-community".to_string()),
            dashboard_type: "community".to_string(),
            date_basis: "added".to_string(),
            block_start_date: Some("2024-01-01".to_string()),
            block_end_date: Some("2024-01-31".to_string()),
        })
        .await?;
    tracing::info!(is_expired = get_result.is_expired, data = ?get_result.data, "get complete");

    client.terminate().await;
    Ok(())
}
