//! Default configuration constants for voxrelay.
//!
//! Shared by the TOML config, the pipeline config, and the CLI so that every
//! entry point agrees on the same numbers.

use std::time::Duration;

/// Default capacity of the admission queue.
///
/// Submissions beyond this many waiting requests are rejected immediately
/// instead of being buffered.
pub const ADMISSION_CAPACITY: usize = 50;

/// Default capacity of the queue in front of voice conversion.
///
/// When full, preprocessing tasks wait (holding their permit) until the
/// conversion stage catches up.
pub const BOTTLENECK_CAPACITY: usize = 20;

/// Default number of requests allowed in recognition/translation/synthesis at once.
pub const PREPROCESS_CONCURRENCY: usize = 5;

/// Default number of simultaneous voice conversions.
///
/// The conversion server handles one request at a time.
pub const BOTTLENECK_CONCURRENCY: usize = 1;

/// Per-request latency assumed for ETAs before any request has completed.
pub const DEFAULT_REQUEST_LATENCY: Duration = Duration::from_secs(3);

/// Number of recent completions averaged for ETA estimation.
pub const LATENCY_WINDOW: usize = 32;

/// How long an unclaimed terminal result stays pollable.
pub const RESULT_TTL: Duration = Duration::from_secs(600);

/// Upper bound on unclaimed terminal results kept for polling.
pub const MAX_RESULTS: usize = 1024;

/// Lower bound on the result sweeper interval.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Language translated back into when the speaker already uses the target language.
pub const SOURCE_LANGUAGE: &str = "en";

/// Language most requests are translated into.
pub const TARGET_LANGUAGE: &str = "ja";

/// Source hint value that lets recognition detect the spoken language.
pub const AUTO_LANGUAGE: &str = "auto";

pub const ASR_URL: &str = "http://127.0.0.1:9000";
pub const TRANSLATION_URL: &str = "http://127.0.0.1:9001";
pub const SYNTHESIS_URL: &str = "http://127.0.0.1:9002";
pub const CONVERSION_URL: &str = "http://127.0.0.1:5000";

/// Timeout for recognition, translation and synthesis calls.
pub const SERVICE_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for voice conversion calls, which are much slower.
pub const CONVERSION_TIMEOUT: Duration = Duration::from_secs(120);

/// Socket file name used under `$XDG_RUNTIME_DIR`.
pub const SOCKET_NAME: &str = "voxrelay.sock";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_is_serialized_by_default() {
        assert_eq!(BOTTLENECK_CONCURRENCY, 1);
        assert!(PREPROCESS_CONCURRENCY > BOTTLENECK_CONCURRENCY);
    }

    #[test]
    fn conversion_timeout_exceeds_service_timeout() {
        assert!(CONVERSION_TIMEOUT > SERVICE_TIMEOUT);
    }
}
