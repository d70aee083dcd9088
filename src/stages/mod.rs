//! Stage collaborators: recognition, translation, synthesis, voice conversion.
//!
//! The pipeline only sees these traits. Mocks back the tests; the `http`
//! feature provides clients for the remote services.

pub mod converter;
#[cfg(feature = "http")]
pub mod http;
pub mod recognizer;
pub mod synthesizer;
pub mod translator;

pub use converter::{MockVoiceConverter, VoiceConverter};
#[cfg(feature = "http")]
pub use http::{HttpRecognizer, HttpSynthesizer, HttpTranslator, HttpVoiceConverter, http_stages};
pub use recognizer::{MockRecognizer, Recognition, SpeechRecognizer};
pub use synthesizer::{MockSynthesizer, Synthesizer};
pub use translator::{LanguagePolicy, MockTranslator, Translator, same_language};

use std::sync::Arc;

/// Handles to the four collaborators, shared by every per-request task.
#[derive(Clone)]
pub struct Stages {
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub translator: Arc<dyn Translator>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub converter: Arc<dyn VoiceConverter>,
}

impl Stages {
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        translator: Arc<dyn Translator>,
        synthesizer: Arc<dyn Synthesizer>,
        converter: Arc<dyn VoiceConverter>,
    ) -> Self {
        Self {
            recognizer,
            translator,
            synthesizer,
            converter,
        }
    }

    /// All-mock stages with default behaviour.
    pub fn mock() -> Self {
        Self::new(
            Arc::new(MockRecognizer::new()),
            Arc::new(MockTranslator::new()),
            Arc::new(MockSynthesizer::new()),
            Arc::new(MockVoiceConverter::new()),
        )
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn VoiceConverter>) -> Self {
        self.converter = converter;
        self
    }
}

impl std::fmt::Debug for Stages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stages")
            .field("recognizer", &self.recognizer.name())
            .field("translator", &self.translator.name())
            .field("synthesizer", &self.synthesizer.name())
            .field("converter", &self.converter.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_swaps_one_stage() {
        let stages = Stages::mock().with_converter(Arc::new(MockVoiceConverter::new().with_failure()));
        assert_eq!(stages.recognizer.name(), "mock-asr");
        assert_eq!(stages.converter.name(), "mock-vc");
    }

    #[test]
    fn test_debug_lists_stage_names() {
        let debug = format!("{:?}", Stages::mock());
        assert!(debug.contains("mock-asr"));
        assert!(debug.contains("mock-translator"));
        assert!(debug.contains("mock-tts"));
        assert!(debug.contains("mock-vc"));
    }
}
