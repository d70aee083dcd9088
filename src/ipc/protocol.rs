//! JSON message protocol for IPC communication between CLI and daemon.
//!
//! One command per connection, one JSON object per line. Audio travels as
//! standard base64.

use crate::pipeline::{
    AdmissionError, ConversionOutcome, PipelineStats, StatusReport, Ticket, TranslationOutput,
};
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

pub fn encode_audio(audio: &[u8]) -> String {
    general_purpose::STANDARD.encode(audio)
}

pub fn decode_audio(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::STANDARD.decode(encoded.trim())
}

/// Commands sent by CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Submit audio for translation
    Submit {
        /// Base64-encoded audio file
        audio: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_language: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_language: Option<String>,
        /// Hold the connection open until the request finishes
        #[serde(default)]
        wait: bool,
    },
    /// Poll a previously submitted request
    Status { id: String },
    /// Get queue and latency statistics
    Stats,
    /// Shutdown the daemon
    Shutdown,
}

impl Command {
    pub fn submit(
        audio: &[u8],
        source_language: Option<String>,
        target_language: Option<String>,
        wait: bool,
    ) -> Self {
        Command::Submit {
            audio: encode_audio(audio),
            source_language,
            target_language,
            wait,
        }
    }

    /// Serialize command to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize command from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Finished translation as sent over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub id: String,
    pub original_text: String,
    pub translated_text: String,
    pub detected_language: String,
    /// Base64-encoded final audio
    pub audio: String,
    /// False when conversion failed and the synthesized audio was passed through
    pub converted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_error: Option<String>,
    pub preprocessing_ms: u64,
    pub total_ms: u64,
}

impl TranslationResult {
    pub fn audio_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        decode_audio(&self.audio)
    }
}

impl From<&TranslationOutput> for TranslationResult {
    fn from(output: &TranslationOutput) -> Self {
        let conversion_error = match &output.conversion {
            ConversionOutcome::Converted => None,
            ConversionOutcome::PassThrough { reason } => Some(reason.clone()),
        };
        Self {
            id: output.id.to_string(),
            original_text: output.original_text.clone(),
            translated_text: output.translated_text.clone(),
            detected_language: output.detected_language.clone(),
            audio: encode_audio(&output.audio),
            converted: conversion_error.is_none(),
            conversion_error,
            preprocessing_ms: output.preprocessing_latency.as_millis() as u64,
            total_ms: output.total_latency.as_millis() as u64,
        }
    }
}

/// Queue and latency snapshot as sent over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub running: bool,
    pub admission_depth: usize,
    pub admission_capacity: usize,
    pub bottleneck_depth: usize,
    pub bottleneck_capacity: usize,
    pub preprocessing_in_flight: usize,
    pub preprocess_concurrency: usize,
    pub conversions_in_flight: usize,
    pub bottleneck_concurrency: usize,
    pub live_requests: usize,
    pub unclaimed_results: usize,
    pub completed: u64,
    pub average_latency_ms: u64,
}

impl From<&PipelineStats> for StatsReport {
    fn from(stats: &PipelineStats) -> Self {
        Self {
            running: stats.running,
            admission_depth: stats.admission_depth,
            admission_capacity: stats.admission_capacity,
            bottleneck_depth: stats.bottleneck_depth,
            bottleneck_capacity: stats.bottleneck_capacity,
            preprocessing_in_flight: stats.preprocessing_in_flight,
            preprocess_concurrency: stats.preprocess_concurrency,
            conversions_in_flight: stats.conversions_in_flight,
            bottleneck_concurrency: stats.bottleneck_concurrency,
            live_requests: stats.live_requests,
            unclaimed_results: stats.unclaimed_results,
            completed: stats.completed,
            average_latency_ms: stats.average_latency.as_millis() as u64,
        }
    }
}

/// Responses sent by daemon to CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Request admitted; poll with `status`
    Accepted {
        id: String,
        queue_position: usize,
        eta_ms: u64,
    },
    /// Request finished successfully (possibly with conversion skipped)
    Completed { result: TranslationResult },
    /// Request finished without a result
    Failed { id: String, reason: String },
    /// Request still in flight
    Processing { id: String, stage: String, eta_ms: u64 },
    /// Id never admitted, already collected, or expired
    Unknown { id: String, eta_ms: u64 },
    /// Request not admitted
    Rejected { message: String, retryable: bool },
    /// Queue and latency statistics
    Stats { stats: StatsReport },
    /// Command succeeded
    Ok,
    /// Error occurred
    Error { message: String },
}

impl Response {
    /// Serialize response to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize response from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl From<&Ticket> for Response {
    fn from(ticket: &Ticket) -> Self {
        Response::Accepted {
            id: ticket.id.to_string(),
            queue_position: ticket.queue_position,
            eta_ms: ticket.eta.as_millis() as u64,
        }
    }
}

impl From<&AdmissionError> for Response {
    fn from(error: &AdmissionError) -> Self {
        Response::Rejected {
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

impl From<&StatusReport> for Response {
    fn from(report: &StatusReport) -> Self {
        match report {
            StatusReport::Completed(output) => Response::Completed {
                result: TranslationResult::from(output),
            },
            StatusReport::Failed { id, failure } => Response::Failed {
                id: id.to_string(),
                reason: failure.to_string(),
            },
            StatusReport::Processing { id, status, eta } => Response::Processing {
                id: id.to_string(),
                stage: status.to_string(),
                eta_ms: eta.as_millis() as u64,
            },
            StatusReport::Unknown { id, eta } => Response::Unknown {
                id: id.to_string(),
                eta_ms: eta.as_millis() as u64,
            },
        }
    }
}
