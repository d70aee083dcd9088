//! voxrelay - admission control and stage scheduling for speech-to-speech translation
//!
//! Requests are admitted into a bounded queue, preprocessed (recognition,
//! translation, synthesis) with bounded parallelism, then funneled through a
//! voice-conversion bottleneck that runs at most a few at a time.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
#[cfg(feature = "http")]
pub mod daemon;
pub mod defaults;
pub mod error;
pub mod ipc;
pub mod logging;
pub mod pipeline;
pub mod stages;

// Pipeline
pub use pipeline::{
    AdmissionError, Outcome, Pipeline, PipelineConfig, PipelineStats, RequestFailure, RequestId,
    StatusReport, Ticket, TranslationOutput,
};

// Stage collaborators
pub use stages::{SpeechRecognizer, Stages, Synthesizer, Translator, VoiceConverter};

// Error handling
pub use error::{RelayError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
