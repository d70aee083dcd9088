use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Trait for text translation.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from `source_language` into `target_language`.
    ///
    /// Failure is an error, never an echo of the input text.
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String>;

    fn name(&self) -> &str;
}

/// Chooses which way a transcript is translated.
///
/// A speaker already using the configured target language is translated back
/// into the configured source language; everyone else is translated into the
/// language their request asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePolicy {
    pub source: String,
    pub target: String,
}

impl LanguagePolicy {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Language to translate into, given what was detected and what was requested.
    pub fn resolve_target<'a>(&'a self, detected: &str, requested: &'a str) -> &'a str {
        if same_language(detected, &self.target) {
            &self.source
        } else {
            requested
        }
    }
}

/// Compares language codes by primary subtag, ignoring case ("JA" == "ja-JP").
pub fn same_language(a: &str, b: &str) -> bool {
    let primary = |code: &str| {
        code.trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    };
    let a = primary(a);
    !a.is_empty() && a == primary(b)
}

/// Mock translator for testing
///
/// Produces `"[<target>] <text>"`.
#[derive(Debug, Clone, Default)]
pub struct MockTranslator {
    delay: Duration,
    should_fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockTranslator {
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
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(
        &self,
        text: &str,
        _source_language: &str,
        target_language: &str,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.should_fail {
            return Err(RelayError::Translation {
                message: "mock translation failure".to_string(),
            });
        }
        Ok(format!("[{}] {}", target_language, text))
    }

    fn name(&self) -> &str {
        "mock-translator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_language_ignores_case_and_region() {
        assert!(same_language("ja", "JA"));
        assert!(same_language("ja-JP", "ja"));
        assert!(same_language("en_US", "EN"));
        assert!(!same_language("en", "ja"));
        assert!(!same_language("", ""));
    }

    #[test]
    fn test_speaker_of_target_language_is_translated_back() {
        let policy = LanguagePolicy::new("en", "JA");
        assert_eq!(policy.resolve_target("ja", "ja"), "en");
    }

    #[test]
    fn test_other_speakers_get_requested_target() {
        let policy = LanguagePolicy::new("en", "ja");
        assert_eq!(policy.resolve_target("en", "ja"), "ja");
        assert_eq!(policy.resolve_target("de", "fr"), "fr");
    }

    #[tokio::test]
    async fn test_mock_translator_tags_target() {
        let translator = MockTranslator::new();
        let result = translator.translate("hello", "en", "ja").await.unwrap();
        assert_eq!(result, "[ja] hello");
        assert_eq!(translator.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_translator_failure() {
        let translator = MockTranslator::new().with_failure();
        let result = translator.translate("hello", "en", "ja").await;
        assert!(matches!(result, Err(RelayError::Translation { .. })));
    }
}
