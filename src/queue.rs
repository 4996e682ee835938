//! Priority-ordered FIFO message queue.
//!
//! The original design re-sorts a plain array on every dispatcher tick and
//! guards re-entrancy with a boolean `isProcessing` flag. The Rust
//! translation keeps that shape rather than reaching for a classic binary
//! heap: the queue lives behind a `parking_lot::Mutex` inside the worker
//! task, and only that task's single dispatch loop ever pops from it, so
//! "isProcessing" becomes structural (there is exactly one consumer, never
//! re-entered) instead of a flag that has to be checked.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// The operation a queued message carries out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Get,
    Set,
    Update,
    ClearOne,
    ClearAll,
}

impl MessageKind {
    /// Dispatch priority; lower runs first.
    pub fn priority(self) -> u32 {
        match self {
            MessageKind::Get => 1,
            MessageKind::ClearOne | MessageKind::ClearAll => 2,
            MessageKind::Set | MessageKind::Update => 10,
        }
    }
}

/// A message sitting in the queue, parameterized over the handler's
/// parameter payload and response channel so the worker module can plug in
/// its own concrete types without this module knowing about them.
pub struct QueuedMessage<P> {
    pub kind: MessageKind,
    /// Positive for host-originated messages, negative for worker-internal
    /// background refreshes.
    pub correlation_id: i64,
    pub params: P,
    /// Monotonic arrival sequence; the FIFO-within-priority tiebreaker
    ///.
    seq: u64,
}

impl<P> QueuedMessage<P> {
    /// The cache key this message targets, when it targets exactly one
    /// (used by de-duplication). Callers supply it explicitly since `P` is
    /// opaque to this module.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// A priority queue of pending messages, stable within a priority class.
pub struct PriorityQueue<P> {
    pending: Mutex<Vec<QueuedMessage<P>>>,
    next_seq: AtomicU64,
}

impl<P> Default for PriorityQueue<P> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            next_seq: AtomicU64::new(0),
        }
    }
}

impl<P> PriorityQueue<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message, returning the sequence number assigned to it.
    pub fn push(&self, kind: MessageKind, correlation_id: i64, params: P) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().push(QueuedMessage {
            kind,
            correlation_id,
            params,
            seq,
        });
        seq
    }

    /// Pop the highest-priority, earliest-arrived message, if any. Re-sorts
    /// the pending vector by `(priority, seq)` first, then pops the head.
    pub fn pop(&self) -> Option<QueuedMessage<P>> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return None;
        }
        let min_index = pending
            .iter()
            .enumerate()
            .min_by_key(|(_, m)| (m.kind.priority(), m.seq))
            .map(|(i, _)| i)?;
        Some(pending.remove(min_index))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// True iff an `Update` for `cache_key` is already queued, using
    /// `matches_key` to compare a queued message's params against the key
    /// in question. This is an advisory check, not a lock: it is only
    /// safe because the scan and the subsequent `push` happen on the same
    /// task with no `.await` between them.
    pub fn has_pending_update(&self, mut matches_key: impl FnMut(&P) -> bool) -> bool {
        self.pending
            .lock()
            .iter()
            .any(|m| m.kind == MessageKind::Update && matches_key(&m.params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_beats_arrival_order() {
        let q: PriorityQueue<()> = PriorityQueue::new();
        q.push(MessageKind::Set, 1, ());
        q.push(MessageKind::Get, 2, ());
        q.push(MessageKind::Set, 3, ());
        q.push(MessageKind::Get, 4, ());
        q.push(MessageKind::Set, 5, ());

        let order: Vec<i64> = std::iter::from_fn(|| q.pop()).map(|m| m.correlation_id).collect();
        assert_eq!(order, vec![2, 4, 1, 3, 5]);
    }

    #[test]
    fn fifo_within_same_priority() {
        let q: PriorityQueue<()> = PriorityQueue::new();
        q.push(MessageKind::Get, 10, ());
        q.push(MessageKind::Get, 20, ());
        q.push(MessageKind::Get, 30, ());
        let order: Vec<i64> = std::iter::from_fn(|| q.pop()).map(|m| m.correlation_id).collect();
        assert_eq!(order, vec![10, 20, 30]);
    }

    #[test]
    fn dedup_finds_pending_update_for_key() {
        let q: PriorityQueue<String> = PriorityQueue::new();
        q.push(MessageKind::Update, -1, "key-a".to_string());
        assert!(q.has_pending_update(|p| p == "key-a"));
        assert!(!q.has_pending_update(|p| p == "key-b"));
    }

    #[test]
    fn empty_queue_pops_none() {
        let q: PriorityQueue<()> = PriorityQueue::new();
        assert!(q.pop().is_none());
        assert!(q.is_empty());
    }
}
