//! Counting permit pools bounding in-flight work per stage.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Permit held for the duration of one stage operation. Dropping it releases the slot.
pub type GatePermit = OwnedSemaphorePermit;

/// Concurrency gate for one pipeline stage.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    name: &'static str,
    permits: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyGate {
    pub fn new(name: &'static str, limit: usize) -> Self {
        Self {
            name,
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Waits for a free slot. Returns `None` once the gate is closed.
    pub async fn acquire(&self) -> Option<GatePermit> {
        Arc::clone(&self.permits).acquire_owned().await.ok()
    }

    /// Number of permits currently held.
    pub fn in_flight(&self) -> usize {
        self.limit.saturating_sub(self.permits.available_permits())
    }

    /// Wakes every waiter with `None`; held permits stay valid until dropped.
    pub fn close(&self) {
        self.permits.close();
    }
}
