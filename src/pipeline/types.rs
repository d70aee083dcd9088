//! Data types flowing through the translation pipeline.

use crate::pipeline::error::RequestFailure;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Globally unique identifier of an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Where a request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Queued,
    Preprocessing,
    AwaitingConversion,
    Converting,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStatus::Queued => "queued",
            RequestStatus::Preprocessing => "preprocessing",
            RequestStatus::AwaitingConversion => "awaiting_conversion",
            RequestStatus::Converting => "converting",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Fields accumulated by the preprocessing stages.
#[derive(Debug, Clone, Default)]
pub struct StageData {
    pub transcript: String,
    pub detected_language: String,
    /// Language the transcript was translated into (after the direction policy).
    pub translation_language: String,
    pub translated_text: String,
    pub synthesized_audio: Vec<u8>,
}

/// Terminal value delivered for every admitted request.
pub type Outcome = Result<TranslationOutput, RequestFailure>;

/// Single-use completion signal for a request's synchronous waiter.
///
/// Resolving consumes the sender, so a request is signalled at most once.
/// Dropping it unresolved wakes the waiter with [`RequestFailure::Abandoned`],
/// unless the drop happens while a stage task unwinds from a panic, in which
/// case the waiter gets [`RequestFailure::Internal`].
#[derive(Debug)]
pub struct Completion(Option<oneshot::Sender<Outcome>>);

impl Completion {
    pub fn channel() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (Self(Some(tx)), rx)
    }

    /// Returns true if a synchronous caller is still waiting.
    pub fn has_waiter(&self) -> bool {
        self.0.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn resolve(mut self, outcome: Outcome) {
        if let Some(tx) = self.0.take()
            && tx.send(outcome).is_err()
        {
            tracing::trace!("completion dropped: no synchronous waiter");
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if std::thread::panicking()
            && let Some(tx) = self.0.take()
        {
            tx.send(Err(RequestFailure::Internal(
                "request task panicked".to_string(),
            )))
            .ok();
        }
    }
}

/// Per-request timing marks.
#[derive(Debug, Clone, Copy)]
pub struct RequestTiming {
    pub submitted: Instant,
    pub preprocess_started: Option<Instant>,
    pub preprocess_done: Option<Instant>,
    pub conversion_started: Option<Instant>,
}

impl RequestTiming {
    pub fn new(submitted: Instant) -> Self {
        Self {
            submitted,
            preprocess_started: None,
            preprocess_done: None,
            conversion_started: None,
        }
    }
}

/// An admitted audio-translation request.
#[derive(Debug)]
pub struct TranslationRequest {
    pub id: RequestId,
    pub audio: Vec<u8>,
    /// Spoken-language hint; `None` lets recognition detect it.
    pub source_hint: Option<String>,
    pub target_language: String,
    pub stage_data: StageData,
    pub status: RequestStatus,
    pub timing: RequestTiming,
    pub completion: Completion,
}

impl TranslationRequest {
    pub fn new(
        audio: Vec<u8>,
        source_hint: Option<String>,
        target_language: String,
    ) -> (Self, oneshot::Receiver<Outcome>) {
        let (completion, receiver) = Completion::channel();
        let request = Self {
            id: RequestId::new(),
            audio,
            source_hint,
            target_language,
            stage_data: StageData::default(),
            status: RequestStatus::Queued,
            timing: RequestTiming::new(Instant::now()),
            completion,
        };
        (request, receiver)
    }
}

/// Whether voice conversion was applied to the final audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Converted,
    /// Conversion failed; the synthesized audio was delivered unchanged.
    PassThrough { reason: String },
}

impl ConversionOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ConversionOutcome::PassThrough { .. })
    }
}

/// Successful result of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationOutput {
    pub id: RequestId,
    pub original_text: String,
    pub translated_text: String,
    pub detected_language: String,
    pub audio: Vec<u8>,
    pub conversion: ConversionOutcome,
    /// Submission until the synthesized audio was handed to conversion.
    pub preprocessing_latency: Duration,
    /// Submission until completion.
    pub total_latency: Duration,
}

/// Receipt for an asynchronously submitted request.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub id: RequestId,
    /// 1-based depth of the admission queue right after enqueueing.
    pub queue_position: usize,
    pub eta: Duration,
}

/// Admitted request whose outcome can be awaited.
#[derive(Debug)]
pub struct Pending {
    pub id: RequestId,
    pub queue_position: usize,
    pub eta: Duration,
    receiver: oneshot::Receiver<Outcome>,
}

impl Pending {
    pub(crate) fn new(ticket: Ticket, receiver: oneshot::Receiver<Outcome>) -> Self {
        Self {
            id: ticket.id,
            queue_position: ticket.queue_position,
            eta: ticket.eta,
            receiver,
        }
    }

    /// Waits for the terminal outcome.
    pub async fn wait(self) -> Outcome {
        self.receiver
            .await
            .unwrap_or(Err(RequestFailure::Abandoned))
    }

    /// Stops waiting; the request keeps running and stays pollable.
    pub fn detach(self) -> Ticket {
        Ticket {
            id: self.id,
            queue_position: self.queue_position,
            eta: self.eta,
        }
    }
}

/// Answer to a status poll.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusReport {
    Completed(TranslationOutput),
    Failed {
        id: RequestId,
        failure: RequestFailure,
    },
    Processing {
        id: RequestId,
        status: RequestStatus,
        eta: Duration,
    },
    /// Never admitted, already claimed, or evicted.
    Unknown { id: RequestId, eta: Duration },
}

impl StatusReport {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            StatusReport::Completed(_) | StatusReport::Failed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_roundtrips_through_string() {
        let id = RequestId::new();
        let parsed: RequestId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_request_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<RequestId>().is_err());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let ids: std::collections::HashSet<RequestId> = (0..100).map(|_| RequestId::new()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Failed.is_terminal());
        assert!(!RequestStatus::Queued.is_terminal());
        assert!(!RequestStatus::Converting.is_terminal());
        assert_eq!(RequestStatus::AwaitingConversion.to_string(), "awaiting_conversion");
    }

    #[test]
    fn test_new_request_is_queued() {
        let (request, _rx) =
            TranslationRequest::new(vec![1, 2, 3], None, "ja".to_string());
        assert_eq!(request.status, RequestStatus::Queued);
        assert!(request.stage_data.transcript.is_empty());
        assert!(request.completion.has_waiter());
    }

    #[tokio::test]
    async fn test_completion_delivers_outcome() {
        let (completion, rx) = Completion::channel();
        completion.resolve(Err(RequestFailure::NoSpeechDetected));
        assert_eq!(rx.await.unwrap(), Err(RequestFailure::NoSpeechDetected));
    }

    #[tokio::test]
    async fn test_dropped_request_reads_as_abandoned() {
        let (request, rx) = TranslationRequest::new(vec![0], None, "ja".to_string());
        let pending = Pending::new(
            Ticket {
                id: request.id,
                queue_position: 1,
                eta: Duration::ZERO,
            },
            rx,
        );
        drop(request);
        assert_eq!(pending.wait().await, Err(RequestFailure::Abandoned));
    }

    #[test]
    fn test_completion_without_waiter_does_not_panic() {
        let (completion, rx) = Completion::channel();
        drop(rx);
        assert!(!completion.has_waiter());
        completion.resolve(Err(RequestFailure::Abandoned));
    }

    #[test]
    fn test_conversion_outcome_degraded() {
        assert!(!ConversionOutcome::Converted.is_degraded());
        assert!(
            ConversionOutcome::PassThrough {
                reason: "down".to_string()
            }
            .is_degraded()
        );
    }
}
