//! Admission and stage scheduling for audio translation requests.
//!
//! Two long-lived scheduler loops connected by bounded queues: preprocessing
//! (recognition, translation, synthesis) runs several requests at once, voice
//! conversion runs under its own, smaller limit. Each request is signalled
//! exactly once, to its waiter if any and to the pollable result store.

pub mod bottleneck;
pub mod error;
pub mod gate;
pub mod latency;
pub mod orchestrator;
pub mod preprocess;
pub mod queue;
pub mod results;
pub mod shutdown;
pub mod types;
mod worker;

pub use bottleneck::BottleneckScheduler;
pub use error::{AdmissionError, RequestFailure};
pub use gate::{ConcurrencyGate, GatePermit};
pub use latency::{CompletionTiming, LatencyStats, LatencyTracker, format_duration};
pub use orchestrator::{Pipeline, PipelineConfig, PipelineStats};
pub use preprocess::PreprocessScheduler;
pub use queue::{PutError, QueueReceiver, QueueSender};
pub use results::{Lookup, ResultCorrelator, ResultStore};
pub use types::{
    ConversionOutcome, Outcome, Pending, RequestId, RequestStatus, StageData, StatusReport,
    Ticket, TranslationOutput, TranslationRequest,
};
