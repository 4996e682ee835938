//! The worker: serial dispatch loop and operation handlers. Runs as a
//! single tokio task so that, from its own perspective, handlers are
//! never re-entered - there is exactly one execution context popping from
//! the priority queue.

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, RequestFingerprint};
use crate::error::CacheError;
use crate::eviction::enforce_capacity;
use crate::fetcher::StatsFetcher;
use crate::protocol::{
    CacheUpdated, ClearOneParams, ClearResult, GetParams, GetResult, SetParams, SetResult,
    WorkerMessage, WorkerOutcome, WorkerResponse,
};
use crate::queue::PriorityQueue;
use crate::storage::SledStore;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// A message sitting in the priority queue. Worker-internal background
/// refreshes carry no caller-visible correlation id worth replying to, so
/// their id is simply the negative id the `GET` handler minted for them.
struct QueuedItem {
    correlation_id: i64,
    message: WorkerMessage,
}

/// Host -> worker envelope sent over the intake channel. The worker never
/// resolves a promise directly: it replies by tagging its response with
/// `correlation_id` on the single outbound channel, and the client stub's
/// correlation table is what maps that id back to the right waiter.
pub struct Inbound {
    pub correlation_id: i64,
    pub message: WorkerMessage,
}

/// Worker -> host envelope: either a correlated response to a
/// host-originated message, or an uncorrelated `CACHE_UPDATED` notification.
pub enum Outbound {
    Response {
        correlation_id: i64,
        outcome: WorkerOutcome,
    },
    Notification(CacheUpdated),
}

/// Handle returned by [`spawn`]: the sending half of the intake channel
/// plus the receiving half of the single outbound channel the client stub
/// multiplexes by correlation id.
pub struct WorkerHandle {
    pub intake: mpsc::UnboundedSender<Inbound>,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Open the store and spawn the dispatch-loop task. Open failure is fatal
/// for this session.
pub fn spawn(config: CacheConfig, fetcher: Arc<dyn StatsFetcher>) -> Result<WorkerHandle, CacheError> {
    let config = config.normalized();
    let store = SledStore::open(&config.store_path, config.schema_version)
        .map_err(|e| CacheError::StoreOpen(e.to_string()))?;

    let (intake_tx, intake_rx) = mpsc::unbounded_channel::<Inbound>();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Outbound>();

    let worker = Worker {
        store,
        config,
        fetcher,
        queue: PriorityQueue::new(),
        outbound_tx,
        next_update_id: AtomicI64::new(-1),
    };

    tokio::spawn(worker.run(intake_rx));

    Ok(WorkerHandle {
        intake: intake_tx,
        outbound: outbound_rx,
    })
}

struct Worker {
    store: SledStore,
    config: CacheConfig,
    fetcher: Arc<dyn StatsFetcher>,
    queue: PriorityQueue<QueuedItem>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    next_update_id: AtomicI64,
}

impl Worker {
    /// The serial dispatch loop. Pulls newly arrived messages into the
    /// priority queue, then pops and awaits the highest-priority one to
    /// completion before looping - the dispatcher always awaits the
    /// current handler to completion before starting the next.
    async fn run(mut self, mut intake_rx: mpsc::UnboundedReceiver<Inbound>) {
        loop {
            if self.queue.is_empty() {
                match intake_rx.recv().await {
                    Some(inbound) => self.enqueue_inbound(inbound),
                    None => {
                        debug!("intake channel closed, worker shutting down");
                        return;
                    }
                }
            }

            // Drain whatever else has arrived without blocking, so a burst
            // of messages is fully visible to the priority sort before the
            // next pop: a batch that arrives before dispatch begins is
            // serviced in strict priority order, not arrival order.
            while let Ok(inbound) = intake_rx.try_recv() {
                self.enqueue_inbound(inbound);
            }

            if let Some(queued) = self.queue.pop() {
                self.dispatch(queued.params).await;
            }
        }
    }

    fn enqueue_inbound(&self, inbound: Inbound) {
        let kind = inbound.message.kind();
        self.queue.push(
            kind,
            inbound.correlation_id,
            QueuedItem {
                correlation_id: inbound.correlation_id,
                message: inbound.message,
            },
        );
    }

    async fn dispatch(&mut self, item: QueuedItem) {
        let QueuedItem {
            correlation_id,
            message,
        } = item;

        let outcome = match message {
            WorkerMessage::Get(params) => self.handle_get(params).await,
            WorkerMessage::Set(params) => self.handle_set(params).await,
            WorkerMessage::Update(params) => {
                self.handle_update(params).await;
                return;
            }
            WorkerMessage::ClearOne(params) => self.handle_clear_one(params).await,
            WorkerMessage::ClearAll => self.handle_clear_all().await,
        };

        let _ = self.outbound_tx.send(Outbound::Response {
            correlation_id,
            outcome,
        });
    }

    /// Handles a `GET` request.
    async fn handle_get(&mut self, params: GetParams) -> WorkerOutcome {
        let key = crate::key::build_key(&params.key_params());

        let entry = match self.store.get(&key) {
            Ok(entry) => entry,
            Err(e) => return WorkerOutcome::Failure(e.to_string()),
        };

        let Some(entry) = entry else {
            return WorkerOutcome::Success(WorkerResponse::Get(GetResult {
                data: None,
                server_fetch_timestamp: None,
                year: None,
                is_expired: false,
            }));
        };

        let valid = crate::key::is_valid(&entry, now_ms(), &self.config);

        if !valid && !self.queue.has_pending_update(|item| matches_get_key(item, &key)) {
            let update_id = self.next_update_id.fetch_sub(1, Ordering::Relaxed);
            self.queue.push(
                crate::queue::MessageKind::Update,
                update_id,
                QueuedItem {
                    correlation_id: update_id,
                    message: WorkerMessage::Update(params.clone()),
                },
            );
            debug!(key = %key, update_id, "enqueued background refresh for stale entry");
        }

        let decoded = crate::codec::decode(&entry.data);
        let decoded = match decoded {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "payload corrupted, self-invalidating");
                let _ = self.store.delete(&key);
                return WorkerOutcome::Success(WorkerResponse::Get(GetResult {
                    data: None,
                    server_fetch_timestamp: None,
                    year: None,
                    is_expired: false,
                }));
            }
        };

        // Fire-and-forget LRU touch-up; failure is swallowed.
        if let Err(e) = self.store.touch_last_accessed(&key, now_ms()) {
            debug!(key = %key, error = %e, "lru touch-up failed, ignoring");
        }

        WorkerOutcome::Success(WorkerResponse::Get(GetResult {
            data: Some(decoded),
            server_fetch_timestamp: entry.server_fetch_timestamp,
            year: entry.year,
            is_expired: !valid,
        }))
    }

    /// Handles a `SET` request.
    async fn handle_set(&mut self, params: SetParams) -> WorkerOutcome {
        match self.write_entry(&params) {
            Ok((compressed, object_size, key)) => {
                WorkerOutcome::Success(WorkerResponse::Set(SetResult {
                    cache_key: key,
                    compressed,
                    object_size,
                }))
            }
            Err(e) => WorkerOutcome::Failure(e.to_string()),
        }
    }

    /// Shared write path used by `SET` and by `UPDATE`'s "feed the result
    /// to the SET pipeline step.
    fn write_entry(&self, params: &SetParams) -> Result<(bool, u64, String), CacheError> {
        let key = crate::key::build_key(&params.key_params());
        let year = params.year.or_else(|| crate::key::year_of(params.block_start_date.as_deref()));

        let (variant, object_size) = crate::codec::encode(&params.data, params.want_compressed)
            .map_err(CacheError::Corruption)?;

        let existing = self
            .store
            .get(&key)
            .map_err(|e| CacheError::StoreOp(e.into()))?;

        if existing.is_none() {
            enforce_capacity(&self.store, self.config.max_entries)
                .map_err(|e| CacheError::StoreOp(e.into()))?;
        }

        let now = now_ms();
        let is_current = crate::key::is_current_year(year);

        let entry = CacheEntry {
            key: key.clone(),
            data: variant,
            object_size,
            timestamp: now,
            last_accessed: now,
            fingerprint: RequestFingerprint {
                community_id: params.community_id.clone(),
                dashboard_type: params.dashboard_type.clone(),
                date_basis: params.date_basis.clone(),
                block_start_date: params.block_start_date.clone(),
                block_end_date: params.block_end_date.clone(),
            },
            year,
            server_fetch_timestamp: if is_current { Some(now) } else { None },
            version: crate::entry::ENTRY_VERSION.to_string(),
        };

        let compressed = entry.data.is_compressed();
        self.store.put(&entry).map_err(|e| CacheError::StoreOp(e.into()))?;

        Ok((compressed, object_size, key))
    }

    /// `UPDATE` background refresh. Never blocks the queue for a
    /// host-originated message since its priority (10) only wins the pop
    /// once every `GET`/`CLEAR_*` ahead of it has been served.
    async fn handle_update(&mut self, params: GetParams) {
        let key = crate::key::build_key(&params.key_params());

        // Preserve the original entry's compression choice and year, if it
        // still exists; otherwise default to uncompressed.
        let existing = self.store.get(&key).ok().flatten();
        let want_compressed = existing
            .as_ref()
            .map(|e| e.data.is_compressed())
            .unwrap_or(false);
        let year_hint = existing.as_ref().and_then(|e| e.year);

        let fetch_params = params.fetch_params(want_compressed);
        let fetch_result = self.fetcher.fetch(&fetch_params).await;

        let notification = match fetch_result {
            Ok(data) => {
                let set_params = SetParams {
                    community_id: params.community_id.clone(),
                    dashboard_type: params.dashboard_type.clone(),
                    date_basis: params.date_basis.clone(),
                    block_start_date: params.block_start_date.clone(),
                    block_end_date: params.block_end_date.clone(),
                    data: data.clone(),
                    year: year_hint.or_else(|| crate::key::year_of(params.block_start_date.as_deref())),
                    want_compressed,
                };
                match self.write_entry(&set_params) {
                    Ok(_) => CacheUpdated {
                        cache_key: key.clone(),
                        data: Some(data),
                        year: set_params.year,
                        success: true,
                        error: None,
                    },
                    Err(e) => {
                        error!(key = %key, error = %e, "background refresh write failed");
                        CacheUpdated {
                            cache_key: key.clone(),
                            data: None,
                            year: year_hint,
                            success: false,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
            Err(e) => {
                // Leave the stale entry intact so the next foreground GET
                // may retry.
                warn!(key = %key, error = %e, "background refresh fetch failed");
                CacheUpdated {
                    cache_key: key.clone(),
                    data: None,
                    year: year_hint,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        };

        // Fire-and-forget: a closed outbound channel means the client stub
        // has been torn down; nothing left to notify.
        let _ = self.outbound_tx.send(Outbound::Notification(notification));
    }

    /// Handles a `CLEAR_ONE` request.
    async fn handle_clear_one(&mut self, params: ClearOneParams) -> WorkerOutcome {
        let key = crate::key::build_key(&params.key_params());
        match self.store.delete(&key) {
            Ok(()) => WorkerOutcome::Success(WorkerResponse::Clear(ClearResult::default())),
            Err(e) => WorkerOutcome::Failure(e.to_string()),
        }
    }

    /// Handles a `CLEAR_ALL` request.
    async fn handle_clear_all(&mut self) -> WorkerOutcome {
        match self.store.clear() {
            Ok(()) => WorkerOutcome::Success(WorkerResponse::Clear(ClearResult::default())),
            Err(e) => WorkerOutcome::Failure(e.to_string()),
        }
    }
}

fn matches_get_key(item: &QueuedItem, key: &str) -> bool {
    match &item.message {
        WorkerMessage::Update(params) => crate::key::build_key(&params.key_params()) == key,
        _ => false,
    }
}
