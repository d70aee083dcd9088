//! Latency measurement for completed requests and queue-wait estimation.

use crate::defaults;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Timing information for a single completed request.
#[derive(Debug, Clone, Copy)]
pub struct CompletionTiming {
    /// When the request was admitted.
    pub submitted: Instant,
    /// When a preprocessing permit was acquired.
    pub preprocess_started: Instant,
    /// When the synthesized audio was ready.
    pub preprocess_done: Instant,
    /// When a conversion permit was acquired.
    pub conversion_started: Instant,
    /// When the final audio was ready.
    pub completed: Instant,
}

impl CompletionTiming {
    /// Submission until completion.
    pub fn total_latency(&self) -> Duration {
        self.completed.duration_since(self.submitted)
    }

    /// Time spent waiting in the admission queue and for a preprocessing permit.
    pub fn admission_wait(&self) -> Duration {
        self.preprocess_started.duration_since(self.submitted)
    }

    /// Recognition + translation + synthesis.
    pub fn preprocessing_latency(&self) -> Duration {
        self.preprocess_done.duration_since(self.preprocess_started)
    }

    /// Time spent waiting in the bottleneck queue and for the conversion permit.
    pub fn conversion_wait(&self) -> Duration {
        self.conversion_started.duration_since(self.preprocess_done)
    }

    pub fn conversion_latency(&self) -> Duration {
        self.completed.duration_since(self.conversion_started)
    }

    /// Time the request actually spent in stage calls, excluding queue waits.
    pub fn service_time(&self) -> Duration {
        self.preprocessing_latency() + self.conversion_latency()
    }
}

/// Aggregated latency statistics over the recent window.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyStats {
    pub count: usize,
    pub total_avg: Duration,
    pub total_min: Duration,
    pub total_max: Duration,
    pub preprocessing_avg: Duration,
    pub conversion_avg: Duration,
    pub queue_wait_avg: Duration,
    pub service_avg: Duration,
}

/// Rolling window of recent completions, shared by the schedulers.
pub struct LatencyTracker {
    window: usize,
    fallback: Duration,
    measurements: Mutex<VecDeque<CompletionTiming>>,
    completed: AtomicU64,
}

impl LatencyTracker {
    /// Creates a tracker assuming `fallback` per request until something completes.
    pub fn new(fallback: Duration) -> Self {
        Self::with_window(fallback, defaults::LATENCY_WINDOW)
    }

    pub fn with_window(fallback: Duration, window: usize) -> Self {
        Self {
            window: window.max(1),
            fallback,
            measurements: Mutex::new(VecDeque::with_capacity(window.max(1))),
            completed: AtomicU64::new(0),
        }
    }

    /// Records a completion, dropping the oldest sample once the window is full.
    pub fn record(&self, timing: CompletionTiming) {
        let mut measurements = self
            .measurements
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if measurements.len() == self.window {
            measurements.pop_front();
        }
        measurements.push_back(timing);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Total completions recorded since startup.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Average per-request service time, or the fallback before any completion.
    pub fn average_request_latency(&self) -> Duration {
        let measurements = self
            .measurements
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if measurements.is_empty() {
            return self.fallback;
        }
        let services: Vec<Duration> = measurements.iter().map(|t| t.service_time()).collect();
        avg_duration(&services)
    }

    /// Estimated wait for something `position` requests deep.
    pub fn estimate_wait(&self, position: usize) -> Duration {
        let per_request = self.average_request_latency();
        per_request.saturating_mul(u32::try_from(position).unwrap_or(u32::MAX))
    }

    /// Computes aggregated statistics.
    pub fn stats(&self) -> Option<LatencyStats> {
        let measurements = self
            .measurements
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if measurements.is_empty() {
            return None;
        }

        let totals: Vec<Duration> = measurements.iter().map(|t| t.total_latency()).collect();
        let preprocessing: Vec<Duration> = measurements
            .iter()
            .map(|t| t.preprocessing_latency())
            .collect();
        let conversion: Vec<Duration> = measurements
            .iter()
            .map(|t| t.conversion_latency())
            .collect();
        let waits: Vec<Duration> = measurements
            .iter()
            .map(|t| t.admission_wait() + t.conversion_wait())
            .collect();
        let services: Vec<Duration> = measurements.iter().map(|t| t.service_time()).collect();

        let &total_min = totals.iter().min()?;
        let &total_max = totals.iter().max()?;

        Some(LatencyStats {
            count: measurements.len(),
            total_avg: avg_duration(&totals),
            total_min,
            total_max,
            preprocessing_avg: avg_duration(&preprocessing),
            conversion_avg: avg_duration(&conversion),
            queue_wait_avg: avg_duration(&waits),
            service_avg: avg_duration(&services),
        })
    }

    /// Logs a summary of recent performance.
    pub fn log_summary(&self) {
        let Some(stats) = self.stats() else {
            tracing::info!("no requests completed");
            return;
        };
        tracing::info!(
            completed = self.completed(),
            window = stats.count,
            total_avg = %format_duration(stats.total_avg),
            fastest = %format_duration(stats.total_min),
            slowest = %format_duration(stats.total_max),
            preprocessing_avg = %format_duration(stats.preprocessing_avg),
            conversion_avg = %format_duration(stats.conversion_avg),
            queue_wait_avg = %format_duration(stats.queue_wait_avg),
            "latency summary"
        );
    }
}

fn avg_duration(durations: &[Duration]) -> Duration {
    if durations.is_empty() {
        return Duration::ZERO;
    }
    let total: Duration = durations.iter().sum();
    total / durations.len() as u32
}

/// Formats a duration for human display (e.g. "850ms", "2.4s").
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}
