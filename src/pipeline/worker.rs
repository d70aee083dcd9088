//! The dequeue → acquire → spawn loop both schedulers run.

use crate::pipeline::error::RequestFailure;
use crate::pipeline::gate::{ConcurrencyGate, GatePermit};
use crate::pipeline::queue::QueueReceiver;
use crate::pipeline::results::ResultCorrelator;
use crate::pipeline::shutdown::ShutdownSignal;
use crate::pipeline::types::{RequestId, TranslationRequest};
use std::collections::HashMap;
use std::future::Future;
use tokio::task::{JoinError, JoinSet};

/// Long-lived scheduler loop for one stage.
///
/// Takes requests off `queue` in FIFO order, waits for a permit from `gate`,
/// then runs `handle` as its own task so up to `gate.limit()` requests are in
/// flight at once. The permit moves into the task and is released when the
/// task ends, whichever way it ends.
///
/// On shutdown the loop stops dequeuing, aborts its in-flight tasks and drops
/// `queue`, which drops every request still waiting in it.
pub(crate) async fn run_stage<F, Fut>(
    stage: &'static str,
    mut queue: QueueReceiver<TranslationRequest>,
    gate: ConcurrencyGate,
    correlator: ResultCorrelator,
    mut shutdown: ShutdownSignal,
    mut handle: F,
) where
    F: FnMut(TranslationRequest, GatePermit) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut running: HashMap<tokio::task::Id, RequestId> = HashMap::new();
    tracing::debug!(stage, limit = gate.limit(), "scheduler started");

    loop {
        let request = tokio::select! {
            biased;
            () = shutdown.triggered() => break,
            Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                reap(stage, joined, &mut running, &correlator);
                continue;
            }
            next = queue.get() => match next {
                Some(request) => request,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            () = shutdown.triggered() => break,
            permit = gate.acquire() => match permit {
                Some(permit) => permit,
                None => break,
            },
        };

        while let Some(joined) = tasks.try_join_next_with_id() {
            reap(stage, joined, &mut running, &correlator);
        }

        let id = request.id;
        tracing::trace!(stage, request_id = %id, in_flight = gate.in_flight(), "dispatching");
        let task = tasks.spawn(handle(request, permit));
        running.insert(task.id(), id);
    }

    if !tasks.is_empty() {
        tracing::debug!(stage, aborted = tasks.len(), "aborting in-flight requests");
    }
    tasks.shutdown().await;
    tracing::debug!(stage, "scheduler stopped");
}

fn reap(
    stage: &'static str,
    joined: Result<(tokio::task::Id, ()), JoinError>,
    running: &mut HashMap<tokio::task::Id, RequestId>,
    correlator: &ResultCorrelator,
) {
    match joined {
        Ok((task, ())) => {
            running.remove(&task);
        }
        Err(err) => {
            let request_id = running.remove(&err.id());
            if err.is_panic() {
                tracing::error!(stage, request_id = ?request_id, "request task panicked");
                if let Some(id) = request_id {
                    let failure = RequestFailure::Internal(format!("{} task panicked", stage));
                    correlator.orphaned(id, failure);
                }
            }
        }
    }
}
