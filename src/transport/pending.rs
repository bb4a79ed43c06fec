//! In-flight request table
//!
//! Each registered id is settled at most once: `settle` removes the entry
//! before delivering the outcome, so the response path, the timeout path and
//! the disconnect sweep cannot double-deliver.

use crate::core::protocol::RequestId;
use crate::utils::errors::{RelayError, RelayResult};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

/// Outcome delivered to the waiting caller.
pub type Settlement = RelayResult<Value>;

pub struct PendingRequests {
    map: DashMap<RequestId, oneshot::Sender<Settlement>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// Register an id and obtain the receiver the caller awaits on.
    pub fn register(&self, id: RequestId) -> oneshot::Receiver<Settlement> {
        let (tx, rx) = oneshot::channel();
        self.map.insert(id, tx);
        rx
    }

    /// Deliver an outcome for `id`. Returns false when the id is unknown —
    /// already settled, timed out, or from a previous worker generation.
    pub fn settle(&self, id: &RequestId, outcome: Settlement) -> bool {
        match self.map.remove(id) {
            Some((_, tx)) => {
                // Receiver may have been dropped by a timed-out caller.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Abandon an id without delivering anything (timeout path; the caller
    /// stopped listening).
    pub fn abandon(&self, id: &RequestId) -> bool {
        self.map.remove(id).is_some()
    }

    /// Settle every outstanding request with a freshly built error.
    pub fn abort_all<F>(&self, make_error: F) -> usize
    where
        F: Fn() -> RelayError,
    {
        let ids: Vec<RequestId> = self.map.iter().map(|e| e.key().clone()).collect();
        let mut aborted = 0;
        for id in ids {
            if self.settle(&id, Err(make_error())) {
                aborted += 1;
            }
        }
        aborted
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.map.contains_key(id)
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}
