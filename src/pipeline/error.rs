//! Admission and per-request failure categories.
//!
//! Admission errors are returned to the submitter before anything is queued.
//! Request failures are terminal outcomes of an admitted request. A degraded
//! conversion is neither: it is recorded on the successful output
//! (see [`ConversionOutcome`](crate::pipeline::types::ConversionOutcome)).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a submission was not admitted. Nothing was enqueued; the caller may retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("admission queue is full ({capacity} requests waiting), retry later")]
    QueueFull { capacity: usize },

    #[error("pipeline is shutting down")]
    ShuttingDown,

    #[error("invalid request: {0}")]
    Invalid(String),
}

impl AdmissionError {
    /// Returns true if the same submission may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdmissionError::QueueFull { .. })
    }
}

/// Terminal failure of an admitted request. No partial result is delivered.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum RequestFailure {
    #[error("no speech detected")]
    NoSpeechDetected,

    #[error("speech recognition failure: {0}")]
    Recognition(String),

    #[error("translation failure: {0}")]
    Translation(String),

    #[error("synthesis failure: {0}")]
    Synthesis(String),

    #[error("request abandoned during shutdown")]
    Abandoned,

    /// The pipeline itself failed the request, e.g. a stage task panicked.
    #[error("internal failure: {0}")]
    Internal(String),
}
