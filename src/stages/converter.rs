use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Trait for voice conversion, the expensive bottleneck stage.
///
/// Re-voices synthesized speech so it sounds like the original speaker.
#[async_trait]
pub trait VoiceConverter: Send + Sync {
    /// # Arguments
    /// * `audio` - Synthesized speech to convert
    /// * `reference` - The speaker's original audio, used as the voice sample
    /// * `target_language` - Language of `audio`
    async fn convert(&self, audio: &[u8], reference: &[u8], target_language: &str)
    -> Result<Vec<u8>>;

    fn name(&self) -> &str;
}

/// Mock converter for testing
///
/// Prefixes the input audio with `"vc:"` and tracks how many conversions
/// overlap, so tests can check the bottleneck limit.
#[derive(Debug, Clone, Default)]
pub struct MockVoiceConverter {
    delay: Duration,
    should_fail: bool,
    calls: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockVoiceConverter {
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

    /// Highest number of conversions observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Audio this mock produces for the given input.
    pub fn render(audio: &[u8]) -> Vec<u8> {
        let mut out = b"vc:".to_vec();
        out.extend_from_slice(audio);
        out
    }
}

#[async_trait]
impl VoiceConverter for MockVoiceConverter {
    async fn convert(
        &self,
        audio: &[u8],
        _reference: &[u8],
        _target_language: &str,
    ) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.should_fail {
            return Err(RelayError::Conversion {
                message: "mock conversion failure".to_string(),
            });
        }
        Ok(Self::render(audio))
    }

    fn name(&self) -> &str {
        "mock-vc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_converts() {
        let converter = MockVoiceConverter::new();
        let audio = converter.convert(b"abc", b"ref", "ja").await.unwrap();
        assert_eq!(audio, b"vc:abc".to_vec());
        assert_eq!(converter.calls(), 1);
        assert_eq!(converter.peak_concurrency(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let converter = MockVoiceConverter::new().with_failure();
        assert!(matches!(
            converter.convert(b"abc", b"ref", "ja").await,
            Err(RelayError::Conversion { .. })
        ));
    }

    #[tokio::test]
    async fn test_peak_tracks_overlap() {
        let converter = MockVoiceConverter::new().with_delay(Duration::from_millis(30));
        let a = converter.clone();
        let b = converter.clone();
        let (ra, rb) = tokio::join!(a.convert(b"1", b"", "ja"), b.convert(b"2", b"", "ja"));
        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(converter.peak_concurrency(), 2);
    }
}
