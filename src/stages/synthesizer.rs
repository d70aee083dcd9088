use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Trait for text-to-speech synthesis.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Render `text` as encoded audio in `language`.
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>>;

    fn name(&self) -> &str;
}

/// Mock synthesizer for testing
///
/// Audio is the bytes of `"synth:<language>:<text>"`, so tests can check
/// exactly which audio reached the end of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct MockSynthesizer {
    delay: Duration,
    should_fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Audio this mock produces for the given input.
    pub fn render(text: &str, language: &str) -> Vec<u8> {
        format!("synth:{}:{}", language, text).into_bytes()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.should_fail {
            return Err(RelayError::Synthesis {
                message: "mock synthesis failure".to_string(),
            });
        }
        Ok(Self::render(text, language))
    }

    fn name(&self) -> &str {
        "mock-tts"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_renders_deterministic_audio() {
        let synthesizer = MockSynthesizer::new();
        let audio = synthesizer.synthesize("hola", "es").await.unwrap();
        assert_eq!(audio, b"synth:es:hola".to_vec());
        assert_eq!(audio, MockSynthesizer::render("hola", "es"));
        assert_eq!(synthesizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let synthesizer = MockSynthesizer::new().with_failure();
        assert!(matches!(
            synthesizer.synthesize("x", "en").await,
            Err(RelayError::Synthesis { .. })
        ));
    }
}
