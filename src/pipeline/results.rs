//! Result correlation: per-request completion plus a pollable status store.
//!
//! Every admitted id gets a record that tracks its live status until it
//! reaches a terminal outcome. Terminal records are claimed at most once by
//! [`ResultStore::take`] and expire after a TTL or when the store exceeds its
//! size bound, oldest first. Live records never expire.

use crate::pipeline::error::RequestFailure;
use crate::pipeline::types::{Outcome, RequestId, RequestStatus, TranslationRequest};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Result of looking up a request id.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Terminal outcome; the record has been removed.
    Finished(Outcome),
    /// Still in flight.
    Pending(RequestStatus),
    /// Never admitted, already claimed, or evicted.
    Unknown,
}

#[derive(Debug)]
enum Record {
    Live(RequestStatus),
    Finished { outcome: Outcome, at: Instant },
}

/// Status records for admitted requests.
#[derive(Debug)]
pub struct ResultStore {
    ttl: Duration,
    max_finished: usize,
    records: Mutex<HashMap<RequestId, Record>>,
}

impl ResultStore {
    pub fn new(ttl: Duration, max_finished: usize) -> Self {
        Self {
            ttl,
            max_finished: max_finished.max(1),
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn records(&self) -> MutexGuard<'_, HashMap<RequestId, Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts tracking a newly admitted id.
    pub fn admit(&self, id: RequestId) {
        self.records().insert(id, Record::Live(RequestStatus::Queued));
    }

    /// Stops tracking an id: a rolled-back admission or an outcome already handed to its waiter.
    pub fn forget(&self, id: RequestId) {
        self.records().remove(&id);
    }

    /// Updates the live status. Terminal records are left untouched.
    pub fn mark(&self, id: RequestId, status: RequestStatus) {
        if let Some(Record::Live(current)) = self.records().get_mut(&id) {
            *current = status;
        }
    }

    /// Stores the terminal outcome for polling.
    pub fn finish(&self, id: RequestId, outcome: Outcome) {
        let now = Instant::now();
        let mut records = self.records();
        records.insert(id, Record::Finished { outcome, at: now });
        self.evict_locked(&mut records, now);
    }

    /// Claims a terminal outcome, or reports the live status.
    pub fn take(&self, id: RequestId) -> Lookup {
        let now = Instant::now();
        let mut records = self.records();
        self.evict_locked(&mut records, now);

        match records.get(&id) {
            None => return Lookup::Unknown,
            Some(Record::Live(status)) => return Lookup::Pending(*status),
            Some(Record::Finished { .. }) => {}
        }
        match records.remove(&id) {
            Some(Record::Finished { outcome, .. }) => Lookup::Finished(outcome),
            _ => Lookup::Unknown,
        }
    }

    /// Fails every live record. Returns how many were abandoned.
    pub fn abandon_live(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records();
        let mut abandoned = 0;
        for record in records.values_mut() {
            if matches!(record, Record::Live(_)) {
                *record = Record::Finished {
                    outcome: Err(RequestFailure::Abandoned),
                    at: now,
                };
                abandoned += 1;
            }
        }
        abandoned
    }

    /// Drops expired terminal records. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut records = self.records();
        self.evict_locked(&mut records, Instant::now())
    }

    /// Number of live (in-flight) records.
    pub fn live(&self) -> usize {
        self.records()
            .values()
            .filter(|r| matches!(r, Record::Live(_)))
            .count()
    }

    /// Number of unclaimed terminal records.
    pub fn unclaimed(&self) -> usize {
        self.records()
            .values()
            .filter(|r| matches!(r, Record::Finished { .. }))
            .count()
    }

    fn evict_locked(&self, records: &mut HashMap<RequestId, Record>, now: Instant) -> usize {
        let before = records.len();
        let ttl = self.ttl;
        records.retain(|_, record| match record {
            Record::Live(_) => true,
            Record::Finished { at, .. } => now.saturating_duration_since(*at) < ttl,
        });

        let mut finished: Vec<(Instant, RequestId)> = records
            .iter()
            .filter_map(|(id, record)| match record {
                Record::Finished { at, .. } => Some((*at, *id)),
                Record::Live(_) => None,
            })
            .collect();
        if finished.len() > self.max_finished {
            finished.sort_unstable_by_key(|(at, _)| *at);
            let excess = finished.len() - self.max_finished;
            for (_, id) in finished.into_iter().take(excess) {
                records.remove(&id);
            }
        }

        let evicted = before - records.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted unclaimed results");
        }
        evicted
    }
}

/// Delivers terminal outcomes to both the waiting caller and the store.
#[derive(Debug, Clone)]
pub struct ResultCorrelator {
    store: Arc<ResultStore>,
}

impl ResultCorrelator {
    pub fn new(store: Arc<ResultStore>) -> Self {
        Self { store }
    }

    /// Moves a request to a new live status.
    pub fn advance(&self, request: &mut TranslationRequest, status: RequestStatus) {
        request.status = status;
        self.store.mark(request.id, status);
    }

    /// Terminates a request. Consumes it, so it is signalled exactly once.
    pub fn deliver(&self, mut request: TranslationRequest, outcome: Outcome) {
        request.status = if outcome.is_ok() {
            RequestStatus::Completed
        } else {
            RequestStatus::Failed
        };
        match &outcome {
            Ok(output) => tracing::info!(
                request_id = %request.id,
                total_ms = output.total_latency.as_millis() as u64,
                degraded = output.conversion.is_degraded(),
                "request completed"
            ),
            Err(failure) => tracing::info!(
                request_id = %request.id,
                reason = %failure,
                "request failed"
            ),
        }
        self.store.finish(request.id, outcome.clone());
        request.completion.resolve(outcome);
    }

    /// Records a failure for a request whose task died before delivering.
    ///
    /// The waiter, if any, has already seen the dropped completion.
    pub fn orphaned(&self, id: RequestId, failure: RequestFailure) {
        tracing::warn!(request_id = %id, reason = %failure, "request lost its task");
        self.store.finish(id, Err(failure));
    }
}
