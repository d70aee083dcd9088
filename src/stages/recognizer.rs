use crate::error::{RelayError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Transcript and the language it was spoken in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    pub language: String,
}

impl Recognition {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
        }
    }

    /// Empty text is the canonical "no speech" signal.
    pub fn is_silent(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Trait for speech-to-text recognition.
///
/// This trait allows swapping implementations (remote service vs mock).
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Transcribe encoded audio.
    ///
    /// # Arguments
    /// * `audio` - Encoded audio file bytes (e.g. WAV)
    /// * `language_hint` - Spoken language if known; `None` to auto-detect
    async fn recognize(&self, audio: &[u8], language_hint: Option<&str>) -> Result<Recognition>;

    /// Name of the backing engine, for logs.
    fn name(&self) -> &str;
}

/// Mock recognizer for testing
#[derive(Debug, Clone)]
pub struct MockRecognizer {
    response: Recognition,
    delay: Duration,
    should_fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockRecognizer {
    /// Create a mock that hears "mock transcript" in English.
    pub fn new() -> Self {
        Self {
            response: Recognition::new("mock transcript", "en"),
            delay: Duration::ZERO,
            should_fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to return a specific transcript and language
    pub fn with_response(mut self, text: &str, language: &str) -> Self {
        self.response = Recognition::new(text, language);
        self
    }

    /// Configure the mock to hear nothing
    pub fn with_silence(self) -> Self {
        self.with_response("", "en")
    }

    /// Configure the mock to take this long per call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Configure the mock to fail on recognize
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Number of recognize calls so far (shared between clones).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    async fn recognize(&self, _audio: &[u8], _language_hint: Option<&str>) -> Result<Recognition> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.should_fail {
            return Err(RelayError::Recognition {
                message: "mock recognition failure".to_string(),
            });
        }
        Ok(self.response.clone())
    }

    fn name(&self) -> &str {
        "mock-asr"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_detection() {
        assert!(Recognition::new("", "en").is_silent());
        assert!(Recognition::new("   ", "ja").is_silent());
        assert!(!Recognition::new("hello", "en").is_silent());
    }

    #[tokio::test]
    async fn test_mock_returns_response() {
        let recognizer = MockRecognizer::new().with_response("good morning", "en");
        let result = recognizer.recognize(&[0u8; 64], None).await.unwrap();
        assert_eq!(result, Recognition::new("good morning", "en"));
        assert_eq!(recognizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let recognizer = MockRecognizer::new().with_failure();
        match recognizer.recognize(&[], Some("en")).await {
            Err(RelayError::Recognition { message }) => {
                assert_eq!(message, "mock recognition failure");
            }
            other => panic!("Expected Recognition error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_trait_is_object_safe() {
        let recognizer: Arc<dyn SpeechRecognizer> =
            Arc::new(MockRecognizer::new().with_silence());
        let result = recognizer.recognize(&[1, 2, 3], None).await.unwrap();
        assert!(result.is_silent());
        assert_eq!(recognizer.name(), "mock-asr");
    }

    #[tokio::test]
    async fn test_call_count_shared_between_clones() {
        let recognizer = MockRecognizer::new();
        let clone = recognizer.clone();
        clone.recognize(&[], None).await.unwrap();
        assert_eq!(recognizer.calls(), 1);
    }
}
