//! Monotonically increasing request ID generation

use crate::core::protocol::RequestId;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Allocates sequential numeric request IDs, starting at 1.
pub struct RequestIdGenerator {
    counter: AtomicI64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicI64::new(1),
        }
    }

    pub fn next_id(&self) -> RequestId {
        RequestId::Number(self.counter.fetch_add(1, Ordering::SeqCst))
    }

    pub fn current_value(&self) -> i64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe shared request ID generator
#[derive(Clone, Default)]
pub struct SharedRequestIdGenerator {
    inner: Arc<RequestIdGenerator>,
}

impl SharedRequestIdGenerator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RequestIdGenerator::new()),
        }
    }

    pub fn next_id(&self) -> RequestId {
        self.inner.next_id()
    }
}
