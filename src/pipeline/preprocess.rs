//! Preprocessing: recognition → translation → synthesis, several requests at once.

use crate::defaults;
use crate::pipeline::error::RequestFailure;
use crate::pipeline::gate::{ConcurrencyGate, GatePermit};
use crate::pipeline::queue::{QueueReceiver, QueueSender};
use crate::pipeline::results::ResultCorrelator;
use crate::pipeline::shutdown::ShutdownSignal;
use crate::pipeline::types::{RequestStatus, TranslationRequest};
use crate::pipeline::worker;
use crate::stages::{LanguagePolicy, Stages};
use std::sync::Arc;
use std::time::Instant;

/// Everything a preprocessing task needs, shared between tasks.
struct Preprocessor {
    stages: Stages,
    policy: LanguagePolicy,
    correlator: ResultCorrelator,
    bottleneck: QueueSender<TranslationRequest>,
}

/// Drains the admission queue under the preprocessing gate.
pub struct PreprocessScheduler {
    admission: QueueReceiver<TranslationRequest>,
    gate: ConcurrencyGate,
    shutdown: ShutdownSignal,
    preprocessor: Arc<Preprocessor>,
}

impl PreprocessScheduler {
    pub fn new(
        admission: QueueReceiver<TranslationRequest>,
        bottleneck: QueueSender<TranslationRequest>,
        gate: ConcurrencyGate,
        stages: Stages,
        policy: LanguagePolicy,
        correlator: ResultCorrelator,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            admission,
            gate,
            shutdown,
            preprocessor: Arc::new(Preprocessor {
                stages,
                policy,
                correlator,
                bottleneck,
            }),
        }
    }

    /// Runs until shutdown.
    pub async fn run(self) {
        let preprocessor = self.preprocessor;
        let correlator = preprocessor.correlator.clone();
        worker::run_stage(
            "preprocess",
            self.admission,
            self.gate,
            correlator,
            self.shutdown,
            move |request, permit| Arc::clone(&preprocessor).process(request, permit),
        )
        .await;
    }
}

impl Preprocessor {
    /// Runs one request's three stages, then hands it to the bottleneck queue.
    ///
    /// The permit is held until the hand-off completes, so a full bottleneck
    /// queue holds back further preprocessing.
    async fn process(self: Arc<Self>, mut request: TranslationRequest, permit: GatePermit) {
        request.timing.preprocess_started = Some(Instant::now());
        self.correlator.advance(&mut request, RequestStatus::Preprocessing);

        if let Err(failure) = self.run_stages(&mut request).await {
            drop(permit);
            self.correlator.deliver(request, Err(failure));
            return;
        }

        request.timing.preprocess_done = Some(Instant::now());
        self.correlator.advance(&mut request, RequestStatus::AwaitingConversion);

        let id = request.id;
        if let Err(err) = self.bottleneck.put(request).await {
            tracing::debug!(request_id = %id, "bottleneck queue closed");
            self.correlator
                .deliver(err.into_inner(), Err(RequestFailure::Abandoned));
        }
        drop(permit);
    }

    async fn run_stages(&self, request: &mut TranslationRequest) -> Result<(), RequestFailure> {
        let started = Instant::now();

        let recognition = self
            .stages
            .recognizer
            .recognize(&request.audio, request.source_hint.as_deref())
            .await
            .map_err(|e| {
                tracing::warn!(request_id = %request.id, stage = "recognition", error = %e, "stage failed");
                RequestFailure::Recognition(e.to_string())
            })?;

        if recognition.is_silent() {
            tracing::info!(request_id = %request.id, "no speech detected");
            return Err(RequestFailure::NoSpeechDetected);
        }

        let detected = if recognition.language.trim().is_empty() {
            request
                .source_hint
                .clone()
                .unwrap_or_else(|| defaults::AUTO_LANGUAGE.to_string())
        } else {
            recognition.language
        };
        let target = self
            .policy
            .resolve_target(&detected, &request.target_language)
            .to_string();

        let translated = self
            .stages
            .translator
            .translate(&recognition.text, &detected, &target)
            .await
            .map_err(|e| {
                tracing::warn!(request_id = %request.id, stage = "translation", error = %e, "stage failed");
                RequestFailure::Translation(e.to_string())
            })?;

        let audio = self
            .stages
            .synthesizer
            .synthesize(&translated, &target)
            .await
            .map_err(|e| {
                tracing::warn!(request_id = %request.id, stage = "synthesis", error = %e, "stage failed");
                RequestFailure::Synthesis(e.to_string())
            })?;

        tracing::debug!(
            request_id = %request.id,
            detected = %detected,
            target = %target,
            chars = recognition.text.len(),
            audio_bytes = audio.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "preprocessing done"
        );

        let data = &mut request.stage_data;
        data.transcript = recognition.text;
        data.detected_language = detected;
        data.translation_language = target;
        data.translated_text = translated;
        data.synthesized_audio = audio;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue;
    use crate::pipeline::results::{Lookup, ResultStore};
    use crate::pipeline::shutdown;
    use crate::stages::{MockRecognizer, MockSynthesizer, MockTranslator};
    use std::time::Duration;

    struct Harness {
        admission: QueueSender<TranslationRequest>,
        bottleneck: QueueReceiver<TranslationRequest>,
        store: Arc<ResultStore>,
        trigger: shutdown::ShutdownTrigger,
        worker: tokio::task::JoinHandle<()>,
    }

    fn harness(stages: Stages) -> Harness {
        let (admission, admission_rx) = queue::bounded(8);
        let (bottleneck_tx, bottleneck) = queue::bounded(8);
        let store = Arc::new(ResultStore::new(Duration::from_secs(60), 16));
        let (trigger, signal) = shutdown::channel();
        let scheduler = PreprocessScheduler::new(
            admission_rx,
            bottleneck_tx,
            ConcurrencyGate::new("preprocess", 2),
            stages,
            LanguagePolicy::new("en", "ja"),
            ResultCorrelator::new(store.clone()),
            signal,
        );
        Harness {
            admission,
            bottleneck,
            store,
            trigger,
            worker: tokio::spawn(scheduler.run()),
        }
    }

    fn submit(
        h: &Harness,
        target: &str,
    ) -> (
        crate::pipeline::types::RequestId,
        tokio::sync::oneshot::Receiver<crate::pipeline::types::Outcome>,
    ) {
        let (request, rx) = TranslationRequest::new(vec![7; 16], None, target.to_string());
        let id = request.id;
        h.store.admit(id);
        h.admission.try_put(request).unwrap();
        (id, rx)
    }

    #[tokio::test]
    async fn test_success_reaches_bottleneck_queue() {
        let mut h = harness(Stages::mock().with_recognizer(Arc::new(
            MockRecognizer::new().with_response("good morning", "en"),
        )));
        let (id, _rx) = submit(&h, "ja");

        let request = tokio::time::timeout(Duration::from_secs(1), h.bottleneck.get())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.id, id);
        assert_eq!(request.status, RequestStatus::AwaitingConversion);
        assert_eq!(request.stage_data.transcript, "good morning");
        assert_eq!(request.stage_data.detected_language, "en");
        assert_eq!(request.stage_data.translated_text, "[ja] good morning");
        assert_eq!(
            request.stage_data.synthesized_audio,
            MockSynthesizer::render("[ja] good morning", "ja")
        );
        assert!(request.timing.preprocess_done.is_some());
        assert_eq!(
            h.store.take(id),
            Lookup::Pending(RequestStatus::AwaitingConversion)
        );

        h.trigger.trigger();
        h.worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_target_language_speaker_is_translated_to_source() {
        let mut h = harness(Stages::mock().with_recognizer(Arc::new(
            MockRecognizer::new().with_response("おはよう", "JA"),
        )));
        submit(&h, "ja");

        let request = h.bottleneck.get().await.unwrap();
        assert_eq!(request.stage_data.translation_language, "en");
        assert_eq!(request.stage_data.translated_text, "[en] おはよう");

        h.trigger.trigger();
        h.worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_silence_fails_without_translation() {
        let translator = MockTranslator::new();
        let h = harness(
            Stages::mock()
                .with_recognizer(Arc::new(MockRecognizer::new().with_silence()))
                .with_translator(Arc::new(translator.clone())),
        );
        let (id, rx) = submit(&h, "ja");

        assert_eq!(rx.await.unwrap(), Err(RequestFailure::NoSpeechDetected));
        assert_eq!(translator.calls(), 0);
        assert_eq!(
            h.store.take(id),
            Lookup::Finished(Err(RequestFailure::NoSpeechDetected))
        );

        h.trigger.trigger();
        h.worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_stage_failures_are_terminal() {
        let h = harness(Stages::mock().with_translator(Arc::new(MockTranslator::new().with_failure())));
        let (_, rx) = submit(&h, "ja");
        assert!(matches!(rx.await.unwrap(), Err(RequestFailure::Translation(_))));
        h.trigger.trigger();
        h.worker.await.unwrap();

        let h = harness(Stages::mock().with_synthesizer(Arc::new(MockSynthesizer::new().with_failure())));
        let (_, rx) = submit(&h, "ja");
        assert!(matches!(rx.await.unwrap(), Err(RequestFailure::Synthesis(_))));
        h.trigger.trigger();
        h.worker.await.unwrap();

        let h = harness(Stages::mock().with_recognizer(Arc::new(MockRecognizer::new().with_failure())));
        let (_, rx) = submit(&h, "ja");
        assert!(matches!(rx.await.unwrap(), Err(RequestFailure::Recognition(_))));
        h.trigger.trigger();
        h.worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_the_loop() {
        let h = harness(Stages::mock().with_synthesizer(Arc::new(MockSynthesizer::new().with_failure())));
        let (_, rx) = submit(&h, "ja");
        assert!(rx.await.unwrap().is_err());
        assert!(!h.worker.is_finished());

        let (second, rx) = submit(&h, "ja");
        assert!(rx.await.unwrap().is_err());
        assert!(matches!(h.store.take(second), Lookup::Finished(Err(_))));

        h.trigger.trigger();
        h.worker.await.unwrap();
    }
}
