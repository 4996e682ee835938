//! Wire message and result shapes crossing the client-stub/worker boundary
//!. Kept `serde`-derivable so they remain literally
//! JSON-serializable even though the transport here is an in-process
//! `tokio::sync::mpsc` channel rather than a structured-clone boundary.

use crate::fetcher::FetchParams;
use serde::{Deserialize, Serialize};

/// Parameters for a `GET` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetParams {
    pub community_id: Option<String>,
    pub dashboard_type: String,
    pub date_basis: String,
    pub block_start_date: Option<String>,
    pub block_end_date: Option<String>,
}

/// Parameters for a `SET` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetParams {
    pub community_id: Option<String>,
    pub dashboard_type: String,
    pub date_basis: String,
    pub block_start_date: Option<String>,
    pub block_end_date: Option<String>,
    pub data: serde_json::Value,
    /// Explicit year override; when absent, extracted from `block_start_date`.
    pub year: Option<i32>,
    pub want_compressed: bool,
}

/// Parameters for a `CLEAR_ONE` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearOneParams {
    pub community_id: Option<String>,
    pub dashboard_type: String,
    pub date_basis: String,
    pub block_start_date: Option<String>,
    pub block_end_date: Option<String>,
}

impl GetParams {
    pub fn key_params(&self) -> crate::key::KeyParams<'_> {
        crate::key::KeyParams {
            community_id: self.community_id.as_deref(),
            dashboard_type: &self.dashboard_type,
            date_basis: &self.date_basis,
            block_start_date: self.block_start_date.as_deref(),
            block_end_date: self.block_end_date.as_deref(),
        }
    }

    pub fn fetch_params(&self, want_compressed: bool) -> FetchParams {
        FetchParams {
            community_id: self.community_id.clone(),
            dashboard_type: self.dashboard_type.clone(),
            start_date: self.block_start_date.clone(),
            end_date: self.block_end_date.clone(),
            date_basis: self.date_basis.clone(),
            want_compressed,
        }
    }
}

impl SetParams {
    pub fn key_params(&self) -> crate::key::KeyParams<'_> {
        crate::key::KeyParams {
            community_id: self.community_id.as_deref(),
            dashboard_type: &self.dashboard_type,
            date_basis: &self.date_basis,
            block_start_date: self.block_start_date.as_deref(),
            block_end_date: self.block_end_date.as_deref(),
        }
    }
}

impl ClearOneParams {
    pub fn key_params(&self) -> crate::key::KeyParams<'_> {
        crate::key::KeyParams {
            community_id: self.community_id.as_deref(),
            dashboard_type: &self.dashboard_type,
            date_basis: &self.date_basis,
            block_start_date: self.block_start_date.as_deref(),
            block_end_date: self.block_end_date.as_deref(),
        }
    }
}

/// Host -> worker message, carrying type-specific params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerMessage {
    Get(GetParams),
    Set(SetParams),
    /// Worker-internal background refresh; never sent by the client stub
    /// directly, always enqueued by the GET handler.
    Update(GetParams),
    ClearOne(ClearOneParams),
    ClearAll,
}

impl WorkerMessage {
    /// Priority-table classification.
    pub fn kind(&self) -> crate::queue::MessageKind {
        use crate::queue::MessageKind;
        match self {
            WorkerMessage::Get(_) => MessageKind::Get,
            WorkerMessage::Set(_) => MessageKind::Set,
            WorkerMessage::Update(_) => MessageKind::Update,
            WorkerMessage::ClearOne(_) => MessageKind::ClearOne,
            WorkerMessage::ClearAll => MessageKind::ClearAll,
        }
    }
}

/// `GET` result shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResult {
    pub data: Option<serde_json::Value>,
    pub server_fetch_timestamp: Option<i64>,
    pub year: Option<i32>,
    pub is_expired: bool,
}

/// `SET` result shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetResult {
    pub cache_key: String,
    pub compressed: bool,
    pub object_size: u64,
}

/// `CLEAR_*` result shape.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClearResult {}

/// Response payload to a host-originated message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerResponse {
    Get(GetResult),
    Set(SetResult),
    Clear(ClearResult),
}

/// A worker -> host response or error, mirroring a
/// `{success: true, ...} | {success: false, error}` shape.
#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    Success(WorkerResponse),
    Failure(String),
}

/// Asynchronous `CACHE_UPDATED` notification. Carries no
/// correlation id - notifications are not correlated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheUpdated {
    pub cache_key: String,
    pub data: Option<serde_json::Value>,
    pub year: Option<i32>,
    pub success: bool,
    pub error: Option<String>,
}
