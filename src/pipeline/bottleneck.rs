//! Bottleneck stage: voice conversion under a small (default 1) concurrency limit.

use crate::pipeline::gate::{ConcurrencyGate, GatePermit};
use crate::pipeline::latency::{CompletionTiming, LatencyTracker};
use crate::pipeline::queue::QueueReceiver;
use crate::pipeline::results::ResultCorrelator;
use crate::pipeline::shutdown::ShutdownSignal;
use crate::pipeline::types::{
    ConversionOutcome, RequestStatus, TranslationOutput, TranslationRequest,
};
use crate::pipeline::worker;
use crate::stages::VoiceConverter;
use std::sync::Arc;
use std::time::Instant;

struct Converter {
    converter: Arc<dyn VoiceConverter>,
    correlator: ResultCorrelator,
    latency: Arc<LatencyTracker>,
}

/// Drains the bottleneck queue under the conversion gate.
pub struct BottleneckScheduler {
    queue: QueueReceiver<TranslationRequest>,
    gate: ConcurrencyGate,
    shutdown: ShutdownSignal,
    converter: Arc<Converter>,
}

impl BottleneckScheduler {
    pub fn new(
        queue: QueueReceiver<TranslationRequest>,
        gate: ConcurrencyGate,
        converter: Arc<dyn VoiceConverter>,
        correlator: ResultCorrelator,
        latency: Arc<LatencyTracker>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            queue,
            gate,
            shutdown,
            converter: Arc::new(Converter {
                converter,
                correlator,
                latency,
            }),
        }
    }

    /// Runs until shutdown.
    pub async fn run(self) {
        let converter = self.converter;
        let correlator = converter.correlator.clone();
        worker::run_stage(
            "conversion",
            self.queue,
            self.gate,
            correlator,
            self.shutdown,
            move |request, permit| Arc::clone(&converter).convert(request, permit),
        )
        .await;
    }
}

impl Converter {
    /// Converts one request and completes it.
    ///
    /// A conversion error never fails the request: the synthesized audio is
    /// delivered unchanged and the output is marked as a pass-through.
    async fn convert(self: Arc<Self>, mut request: TranslationRequest, permit: GatePermit) {
        let conversion_started = Instant::now();
        request.timing.conversion_started = Some(conversion_started);
        self.correlator.advance(&mut request, RequestStatus::Converting);

        let data = &mut request.stage_data;
        let synthesized = std::mem::take(&mut data.synthesized_audio);
        let result = self
            .converter
            .convert(&synthesized, &request.audio, &data.translation_language)
            .await;
        let completed = Instant::now();
        drop(permit);

        let (audio, conversion) = match result {
            Ok(converted) => (converted, ConversionOutcome::Converted),
            Err(e) => {
                tracing::warn!(
                    request_id = %request.id,
                    converter = self.converter.name(),
                    error = %e,
                    "voice conversion failed, passing synthesized audio through"
                );
                (
                    synthesized,
                    ConversionOutcome::PassThrough {
                        reason: e.to_string(),
                    },
                )
            }
        };

        let timing = request.timing;
        let preprocess_done = timing.preprocess_done.unwrap_or(conversion_started);
        let completion = CompletionTiming {
            submitted: timing.submitted,
            preprocess_started: timing.preprocess_started.unwrap_or(timing.submitted),
            preprocess_done,
            conversion_started,
            completed,
        };
        self.latency.record(completion);

        let data = &mut request.stage_data;
        let output = TranslationOutput {
            id: request.id,
            original_text: std::mem::take(&mut data.transcript),
            translated_text: std::mem::take(&mut data.translated_text),
            detected_language: std::mem::take(&mut data.detected_language),
            audio,
            conversion,
            preprocessing_latency: preprocess_done.duration_since(timing.submitted),
            total_latency: completion.total_latency(),
        };
        self.correlator.deliver(request, Ok(output));
    }
}
