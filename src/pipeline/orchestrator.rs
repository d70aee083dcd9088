//! Translation pipeline: admission, the two scheduler loops, and their lifecycle.

use crate::config::Config;
use crate::defaults;
use crate::error::{RelayError, Result};
use crate::pipeline::bottleneck::BottleneckScheduler;
use crate::pipeline::error::AdmissionError;
use crate::pipeline::gate::ConcurrencyGate;
use crate::pipeline::latency::{LatencyStats, LatencyTracker};
use crate::pipeline::preprocess::PreprocessScheduler;
use crate::pipeline::queue::{self, PutError, QueueSender};
use crate::pipeline::results::{Lookup, ResultCorrelator, ResultStore};
use crate::pipeline::shutdown::{self, ShutdownSignal, ShutdownTrigger};
use crate::pipeline::types::{
    Outcome, Pending, RequestId, StatusReport, Ticket, TranslationRequest,
};
use crate::stages::{LanguagePolicy, Stages};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Configuration for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Requests allowed to wait for preprocessing before submissions are rejected
    pub admission_capacity: usize,
    /// Requests allowed to wait for conversion before preprocessing backs up
    pub bottleneck_capacity: usize,
    pub preprocess_concurrency: usize,
    pub bottleneck_concurrency: usize,
    /// Per-request latency assumed for ETAs until something completes
    pub default_latency: Duration,
    pub source_language: String,
    /// Target used when a submission does not name one
    pub target_language: String,
    pub result_ttl: Duration,
    pub max_results: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            admission_capacity: defaults::ADMISSION_CAPACITY,
            bottleneck_capacity: defaults::BOTTLENECK_CAPACITY,
            preprocess_concurrency: defaults::PREPROCESS_CONCURRENCY,
            bottleneck_concurrency: defaults::BOTTLENECK_CONCURRENCY,
            default_latency: defaults::DEFAULT_REQUEST_LATENCY,
            source_language: defaults::SOURCE_LANGUAGE.to_string(),
            target_language: defaults::TARGET_LANGUAGE.to_string(),
            result_ttl: defaults::RESULT_TTL,
            max_results: defaults::MAX_RESULTS,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            admission_capacity: config.pipeline.admission_capacity,
            bottleneck_capacity: config.pipeline.bottleneck_capacity,
            preprocess_concurrency: config.pipeline.preprocess_concurrency,
            bottleneck_concurrency: config.pipeline.bottleneck_concurrency,
            default_latency: config.pipeline.default_latency,
            source_language: config.languages.source.clone(),
            target_language: config.languages.target.clone(),
            result_ttl: config.results.ttl,
            max_results: config.results.max_entries,
        }
    }

    pub fn with_capacities(mut self, admission: usize, bottleneck: usize) -> Self {
        self.admission_capacity = admission;
        self.bottleneck_capacity = bottleneck;
        self
    }

    pub fn with_concurrency(mut self, preprocess: usize, bottleneck: usize) -> Self {
        self.preprocess_concurrency = preprocess;
        self.bottleneck_concurrency = bottleneck;
        self
    }

    pub fn with_languages(mut self, source: &str, target: &str) -> Self {
        self.source_language = source.to_string();
        self.target_language = target.to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("admission_capacity", self.admission_capacity),
            ("bottleneck_capacity", self.bottleneck_capacity),
            ("preprocess_concurrency", self.preprocess_concurrency),
            ("bottleneck_concurrency", self.bottleneck_concurrency),
            ("max_results", self.max_results),
        ];
        for (key, value) in limits {
            if value == 0 {
                return Err(RelayError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
        }
        if self.target_language.trim().is_empty() || self.source_language.trim().is_empty() {
            return Err(RelayError::ConfigInvalidValue {
                key: "languages".to_string(),
                message: "source and target must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Snapshot of queue depths, gate usage and latency.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStats {
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
    pub average_latency: Duration,
    pub latency: Option<LatencyStats>,
}

/// Queues, gates and background tasks, created once on first use.
struct Runtime {
    admission: QueueSender<TranslationRequest>,
    bottleneck: QueueSender<TranslationRequest>,
    preprocess_gate: ConcurrencyGate,
    bottleneck_gate: ConcurrencyGate,
    shutdown: ShutdownTrigger,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// The translation pipeline.
///
/// Submissions go through a bounded admission queue to the preprocessing
/// scheduler (recognition, translation, synthesis under one gate), then
/// through a bounded bottleneck queue to the conversion scheduler. Both loops
/// start on the first submission (or [`Pipeline::start`]) and run until
/// [`Pipeline::stop`].
pub struct Pipeline {
    config: PipelineConfig,
    stages: Stages,
    results: Arc<ResultStore>,
    latency: Arc<LatencyTracker>,
    runtime: OnceLock<Runtime>,
    stopped: AtomicBool,
    /// Serializes the first launch against `stop`.
    lifecycle: Mutex<()>,
}

impl Pipeline {
    /// Creates a pipeline. Nothing runs until the first submission.
    pub fn new(config: PipelineConfig, stages: Stages) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            results: Arc::new(ResultStore::new(config.result_ttl, config.max_results)),
            latency: Arc::new(LatencyTracker::new(config.default_latency)),
            config,
            stages,
            runtime: OnceLock::new(),
            stopped: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.runtime.get().is_some() && !self.stopped.load(Ordering::SeqCst)
    }

    /// Starts the scheduler loops if they are not running yet.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.runtime()?;
        Ok(())
    }

    fn runtime(&self) -> std::result::Result<&Runtime, AdmissionError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(AdmissionError::ShuttingDown);
        }
        if let Some(runtime) = self.runtime.get() {
            return Ok(runtime);
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(AdmissionError::Invalid(
                "pipeline must run inside a tokio runtime".to_string(),
            ));
        }

        let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if self.stopped.load(Ordering::SeqCst) {
            return Err(AdmissionError::ShuttingDown);
        }
        Ok(self.runtime.get_or_init(|| self.launch()))
    }

    fn launch(&self) -> Runtime {
        let config = &self.config;
        let (admission_tx, admission_rx) = queue::bounded(config.admission_capacity);
        let (bottleneck_tx, bottleneck_rx) = queue::bounded(config.bottleneck_capacity);
        let preprocess_gate = ConcurrencyGate::new("preprocess", config.preprocess_concurrency);
        let bottleneck_gate = ConcurrencyGate::new("conversion", config.bottleneck_concurrency);
        let (trigger, signal) = shutdown::channel();
        let correlator = ResultCorrelator::new(self.results.clone());

        let preprocess = PreprocessScheduler::new(
            admission_rx,
            bottleneck_tx.clone(),
            preprocess_gate.clone(),
            self.stages.clone(),
            LanguagePolicy::new(&config.source_language, &config.target_language),
            correlator.clone(),
            signal.clone(),
        );
        let bottleneck = BottleneckScheduler::new(
            bottleneck_rx,
            bottleneck_gate.clone(),
            self.stages.converter.clone(),
            correlator,
            self.latency.clone(),
            signal.clone(),
        );

        let tasks = vec![
            tokio::spawn(preprocess.run()),
            tokio::spawn(bottleneck.run()),
            tokio::spawn(sweep_results(self.results.clone(), signal)),
        ];

        tracing::info!(
            admission_capacity = config.admission_capacity,
            bottleneck_capacity = config.bottleneck_capacity,
            preprocess_concurrency = config.preprocess_concurrency,
            bottleneck_concurrency = config.bottleneck_concurrency,
            recognizer = self.stages.recognizer.name(),
            converter = self.stages.converter.name(),
            "pipeline started"
        );

        Runtime {
            admission: admission_tx,
            bottleneck: bottleneck_tx,
            preprocess_gate,
            bottleneck_gate,
            shutdown: trigger,
            tasks: Mutex::new(tasks),
        }
    }

    /// Admits a request without waiting for it.
    ///
    /// Fails immediately with [`AdmissionError::QueueFull`] when the admission
    /// queue is at capacity. There is no await point between the capacity
    /// check and the enqueue.
    ///
    /// # Arguments
    /// * `audio` - Encoded audio (e.g. WAV); must not be empty
    /// * `source_hint` - Spoken language; `None`, empty or `"auto"` to detect
    /// * `target_language` - `None` or empty for the configured target
    pub fn enqueue(
        &self,
        audio: Vec<u8>,
        source_hint: Option<String>,
        target_language: Option<String>,
    ) -> std::result::Result<Pending, AdmissionError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(AdmissionError::ShuttingDown);
        }
        if audio.is_empty() {
            return Err(AdmissionError::Invalid("audio payload is empty".to_string()));
        }
        let runtime = self.runtime()?;

        let source_hint = source_hint
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(defaults::AUTO_LANGUAGE));
        let target_language = target_language
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.target_language.clone());

        let (request, receiver) = TranslationRequest::new(audio, source_hint, target_language);
        let id = request.id;
        self.results.admit(id);

        match runtime.admission.try_put(request) {
            Ok(queue_position) => {
                let eta = self.latency.estimate_wait(queue_position);
                tracing::debug!(request_id = %id, queue_position, eta_ms = eta.as_millis() as u64, "request admitted");
                Ok(Pending::new(
                    Ticket {
                        id,
                        queue_position,
                        eta,
                    },
                    receiver,
                ))
            }
            Err(PutError::Full(_)) => {
                self.results.forget(id);
                tracing::warn!(capacity = self.config.admission_capacity, "admission queue full, request rejected");
                Err(AdmissionError::QueueFull {
                    capacity: self.config.admission_capacity,
                })
            }
            Err(PutError::Closed(_)) => {
                self.results.forget(id);
                Err(AdmissionError::ShuttingDown)
            }
        }
    }

    /// Admits a request; poll [`Pipeline::status`] with the ticket's id.
    pub fn submit(
        &self,
        audio: Vec<u8>,
        source_hint: Option<String>,
        target_language: Option<String>,
    ) -> std::result::Result<Ticket, AdmissionError> {
        self.enqueue(audio, source_hint, target_language)
            .map(Pending::detach)
    }

    /// Admits a request and waits for its outcome.
    pub async fn submit_and_wait(
        &self,
        audio: Vec<u8>,
        source_hint: Option<String>,
        target_language: Option<String>,
    ) -> std::result::Result<Outcome, AdmissionError> {
        let pending = self.enqueue(audio, source_hint, target_language)?;
        Ok(pending.wait().await)
    }

    /// Polls a request. A terminal outcome is returned once and then forgotten.
    pub fn status(&self, id: RequestId) -> StatusReport {
        match self.results.take(id) {
            Lookup::Finished(Ok(output)) => StatusReport::Completed(output),
            Lookup::Finished(Err(failure)) => StatusReport::Failed { id, failure },
            Lookup::Pending(status) => StatusReport::Processing {
                id,
                status,
                eta: self.backlog_eta(),
            },
            Lookup::Unknown => StatusReport::Unknown {
                id,
                eta: self.backlog_eta(),
            },
        }
    }

    /// Drops whatever is stored for `id`, finished or not.
    ///
    /// For callers that already received the outcome through
    /// [`Pending::wait`]; later polls report the request as unknown.
    pub fn discard(&self, id: RequestId) {
        self.results.forget(id);
    }

    /// Estimated time to work through everything currently queued.
    fn backlog_eta(&self) -> Duration {
        let depth = self
            .runtime
            .get()
            .map(|rt| rt.admission.len() + rt.bottleneck.len())
            .unwrap_or(0);
        self.latency.estimate_wait(depth)
    }

    pub fn stats(&self) -> PipelineStats {
        let runtime = self.runtime.get();
        PipelineStats {
            running: self.is_running(),
            admission_depth: runtime.map_or(0, |rt| rt.admission.len()),
            admission_capacity: self.config.admission_capacity,
            bottleneck_depth: runtime.map_or(0, |rt| rt.bottleneck.len()),
            bottleneck_capacity: self.config.bottleneck_capacity,
            preprocessing_in_flight: runtime.map_or(0, |rt| rt.preprocess_gate.in_flight()),
            preprocess_concurrency: self.config.preprocess_concurrency,
            conversions_in_flight: runtime.map_or(0, |rt| rt.bottleneck_gate.in_flight()),
            bottleneck_concurrency: self.config.bottleneck_concurrency,
            live_requests: self.results.live(),
            unclaimed_results: self.results.unclaimed(),
            completed: self.latency.completed(),
            average_latency: self.latency.average_request_latency(),
            latency: self.latency.stats(),
        }
    }

    /// Stops both loops without draining.
    ///
    /// Queued and in-flight requests are abandoned: waiters see
    /// [`RequestFailure::Abandoned`](crate::pipeline::RequestFailure::Abandoned)
    /// and so do later polls. New submissions fail with
    /// [`AdmissionError::ShuttingDown`]. A stopped pipeline cannot be restarted.
    pub async fn stop(&self) {
        let runtime = {
            let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            if self.stopped.swap(true, Ordering::SeqCst) {
                return;
            }
            self.runtime.get()
        };
        let Some(runtime) = runtime else {
            tracing::debug!("pipeline stopped before it started");
            return;
        };

        tracing::info!(
            queued = runtime.admission.len() + runtime.bottleneck.len(),
            live = self.results.live(),
            "stopping pipeline"
        );
        runtime.shutdown.trigger();
        runtime.preprocess_gate.close();
        runtime.bottleneck_gate.close();

        let tasks = std::mem::take(
            &mut *runtime
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            if let Err(e) = task.await
                && e.is_panic()
            {
                tracing::error!("pipeline task panicked: {}", e);
            }
        }

        let abandoned = self.results.abandon_live();
        if abandoned > 0 {
            tracing::warn!(abandoned, "requests abandoned at shutdown");
        }
        self.latency.log_summary();
        tracing::info!("pipeline stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get() {
            runtime.shutdown.trigger();
        }
    }
}

/// Periodically drops expired results until shutdown.
async fn sweep_results(results: Arc<ResultStore>, mut shutdown: ShutdownSignal) {
    let period = (results.ttl() / 4).max(defaults::MIN_SWEEP_INTERVAL);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = shutdown.triggered() => break,
            _ = interval.tick() => {
                let purged = results.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "expired results swept");
                }
            }
        }
    }
}
