//! # Client stub
//!
//! The small, promise-returning surface the rest of the dashboard uses.
//! Lazily owns the worker task, allocates monotonically increasing
//! correlation ids, multiplexes in-flight requests through a correlation
//! table, and re-emits asynchronous `CACHE_UPDATED` notifications as a
//! broadcast stream any number of dashboard listeners can subscribe to -
//! the closest stand-in for a DOM `EventTarget` a host-supplied listener
//! would otherwise hook into, since Rust has no DOM event bus to reuse.

use crate::error::CacheError;
use crate::fetcher::StatsFetcher;
use crate::protocol::{
    CacheUpdated, ClearOneParams, GetParams, GetResult, SetParams, SetResult, WorkerOutcome,
    WorkerResponse,
};
use crate::worker::{self, Inbound, Outbound, WorkerHandle};
use crate::CacheConfig;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// The correlation table maps a positive id to the resolver for the
/// in-flight `get`/`set`/`clear_*` call that allocated it.
type PendingTable = Arc<DashMap<i64, oneshot::Sender<WorkerOutcome>>>;

/// Promise-returning client for the off-thread cache engine.
pub struct CacheClient {
    intake: mpsc::UnboundedSender<Inbound>,
    pending: PendingTable,
    next_id: AtomicI64,
    updates: broadcast::Sender<CacheUpdated>,
    forwarder: Option<tokio::task::JoinHandle<()>>,
}

impl CacheClient {
    /// Create the worker and start the client stub. Creates the worker
    /// eagerly, on construction, rather than lazily on first use - an
    /// async Rust caller already controls when that happens explicitly,
    /// so there is no implicit deferral left to model.
    pub fn new(config: CacheConfig, fetcher: Arc<dyn StatsFetcher>) -> Result<Self, CacheError> {
        let WorkerHandle { intake, outbound } = worker::spawn(config, fetcher)?;
        let pending: PendingTable = Arc::new(DashMap::new());
        let (updates_tx, _) = broadcast::channel(64);

        let forwarder = tokio::spawn(Self::forward(outbound, pending.clone(), updates_tx.clone()));

        Ok(Self {
            intake,
            pending,
            next_id: AtomicI64::new(1),
            updates: updates_tx,
            forwarder: Some(forwarder),
        })
    }

    /// Reads the worker's single outbound channel and either resolves the
    /// matching entry in the correlation table, or re-broadcasts a
    /// `CACHE_UPDATED` notification. On worker termination (channel
    /// closed), every pending entry is rejected and the table is cleared.
    async fn forward(
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        pending: PendingTable,
        updates: broadcast::Sender<CacheUpdated>,
    ) {
        while let Some(message) = outbound.recv().await {
            match message {
                Outbound::Response {
                    correlation_id,
                    outcome,
                } => {
                    if let Some((_, resolver)) = pending.remove(&correlation_id) {
                        let _ = resolver.send(outcome);
                    }
                }
                Outbound::Notification(update) => {
                    // No subscribers is not an error - fire and forget.
                    let _ = updates.send(update);
                }
            }
        }

        tracing::warn!("worker outbound channel closed, rejecting pending requests");
        let stranded: Vec<i64> = pending.iter().map(|entry| *entry.key()).collect();
        for id in stranded {
            if let Some((_, resolver)) = pending.remove(&id) {
                let _ = resolver.send(WorkerOutcome::Failure("worker terminated".to_string()));
            }
        }
    }

    fn next_correlation_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn call(&self, message: crate::protocol::WorkerMessage) -> Result<WorkerResponse, CacheError> {
        let id = self.next_correlation_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if self.intake.send(Inbound { correlation_id: id, message }).is_err() {
            self.pending.remove(&id);
            return Err(CacheError::Other("worker is no longer running".to_string()));
        }

        match rx.await {
            Ok(WorkerOutcome::Success(response)) => Ok(response),
            Ok(WorkerOutcome::Failure(error)) => Err(CacheError::Other(error)),
            Err(_) => Err(CacheError::Other("worker dropped the request".to_string())),
        }
    }

    /// `get`. The returned `is_expired` lets the host
    /// distinguish fresh from stale data and decide whether to show a
    /// "refreshing" indicator.
    pub async fn get(&self, params: GetParams) -> Result<GetResult, CacheError> {
        match self.call(crate::protocol::WorkerMessage::Get(params)).await? {
            WorkerResponse::Get(result) => Ok(result),
            _ => Err(CacheError::Other("unexpected response shape for get".to_string())),
        }
    }

    /// `set`.
    pub async fn set(&self, params: SetParams) -> Result<SetResult, CacheError> {
        match self.call(crate::protocol::WorkerMessage::Set(params)).await? {
            WorkerResponse::Set(result) => Ok(result),
            _ => Err(CacheError::Other("unexpected response shape for set".to_string())),
        }
    }

    /// `clearOne`.
    pub async fn clear_one(&self, params: ClearOneParams) -> Result<(), CacheError> {
        match self
            .call(crate::protocol::WorkerMessage::ClearOne(params))
            .await?
        {
            WorkerResponse::Clear(_) => Ok(()),
            _ => Err(CacheError::Other("unexpected response shape for clear_one".to_string())),
        }
    }

    /// `clearAll`.
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        match self.call(crate::protocol::WorkerMessage::ClearAll).await? {
            WorkerResponse::Clear(_) => Ok(()),
            _ => Err(CacheError::Other("unexpected response shape for clear_all".to_string())),
        }
    }

    /// Subscribe to `statsCacheUpdated`-equivalent notifications. Each
    /// call returns an independent receiver; a lagging subscriber only
    /// ever misses its own backlog.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdated> {
        self.updates.subscribe()
    }

    /// `terminate`: drops the intake sender, which closes the
    /// worker's receiving end and ends its task loop; every pending
    /// promise is then rejected by the forwarder task as it observes the
    /// worker's outbound channel close in turn.
    pub async fn terminate(mut self) {
        let forwarder = self.forwarder.take();

        // Swap out the real sender for a throwaway one so its only
        // remaining handle drops here, closing the worker's receiving end
        // before we wait on the forwarder below.
        let (stand_in, _unused_rx) = mpsc::unbounded_channel();
        let _ = std::mem::replace(&mut self.intake, stand_in);

        if let Some(handle) = forwarder {
            let _ = handle.await;
        }
    }
}

impl Drop for CacheClient {
    fn drop(&mut self) {
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
        }
    }
}
