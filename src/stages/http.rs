//! HTTP clients for the remote stage services.
//!
//! All four stages share one `reqwest::Client` (one connection pool). Each
//! service gets its own base URL and timeout from [`ServicesConfig`].

use crate::config::ServicesConfig;
use crate::error::{RelayError, Result};
use crate::stages::{SpeechRecognizer, Stages, Synthesizer, Translator, VoiceConverter};
use crate::stages::recognizer::Recognition;
use async_trait::async_trait;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Service {
    Recognition,
    Translation,
    Synthesis,
    Conversion,
}

impl Service {
    fn error(self, message: impl Into<String>) -> RelayError {
        let message = message.into();
        match self {
            Service::Recognition => RelayError::Recognition { message },
            Service::Translation => RelayError::Translation { message },
            Service::Synthesis => RelayError::Synthesis { message },
            Service::Conversion => RelayError::Conversion { message },
        }
    }
}

/// Base URL plus timeout for one remote service.
#[derive(Debug, Clone)]
struct Endpoint {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    service: Service,
}

impl Endpoint {
    fn new(client: &reqwest::Client, base_url: &str, timeout: Duration, service: Service) -> Self {
        Self {
            client: client.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            service,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.post(url).timeout(self.timeout)
    }

    /// Sends the request and returns the successful response.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| self.service.error(format!("request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(self
                .service
                .error(format!("status {}: {}", status, body.trim())));
        }
        Ok(response)
    }

    /// Reads an audio body, treating an empty one as a failure.
    async fn audio_body(&self, response: reqwest::Response) -> Result<Vec<u8>> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.service.error(format!("body: {}", e)))?;
        if bytes.is_empty() {
            return Err(self.service.error("empty audio response"));
        }
        Ok(bytes.to_vec())
    }
}

/// Keeps only characters that can appear in a language tag.
fn language_param(language: &str) -> Option<String> {
    let cleaned: String = language
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: String,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source_language: &'a str,
    target_language: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translated_text: String,
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    language: &'a str,
}

/// `POST {asr_url}/transcribe[?language=xx]` with the raw audio as body.
#[derive(Debug, Clone)]
pub struct HttpRecognizer {
    endpoint: Endpoint,
}

#[async_trait]
impl SpeechRecognizer for HttpRecognizer {
    async fn recognize(&self, audio: &[u8], language_hint: Option<&str>) -> Result<Recognition> {
        let mut url = self.endpoint.url("transcribe");
        if let Some(language) = language_hint.and_then(language_param) {
            url = format!("{}?language={}", url, language);
        }

        tracing::debug!(bytes = audio.len(), url = %url, "sending audio for recognition");
        let request = self
            .endpoint
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio.to_vec());
        let response = self.endpoint.send(request).await?;
        let parsed: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| self.endpoint.service.error(format!("body: {}", e)))?;

        let language = if parsed.language.trim().is_empty() {
            language_hint.unwrap_or_default().to_string()
        } else {
            parsed.language
        };
        Ok(Recognition::new(parsed.text.trim(), language))
    }

    fn name(&self) -> &str {
        "http-asr"
    }
}

/// `POST {translation_url}/translate` with a JSON body.
#[derive(Debug, Clone)]
pub struct HttpTranslator {
    endpoint: Endpoint,
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String> {
        let url = self.endpoint.url("translate");
        let body = TranslateRequest {
            text,
            source_language,
            target_language,
        };
        let response = self.endpoint.send(self.endpoint.post(&url).json(&body)).await?;
        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| self.endpoint.service.error(format!("body: {}", e)))?;
        Ok(parsed.translated_text)
    }

    fn name(&self) -> &str {
        "http-translator"
    }
}

/// `POST {synthesis_url}/synthesize` with a JSON body; responds with audio bytes.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    endpoint: Endpoint,
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>> {
        let url = self.endpoint.url("synthesize");
        let body = SynthesizeRequest { text, language };
        let response = self.endpoint.send(self.endpoint.post(&url).json(&body)).await?;
        self.endpoint.audio_body(response).await
    }

    fn name(&self) -> &str {
        "http-tts"
    }
}

/// `POST {conversion_url}/convert` as multipart (`input`, `reference`, `target_language`).
#[derive(Debug, Clone)]
pub struct HttpVoiceConverter {
    endpoint: Endpoint,
}

impl HttpVoiceConverter {
    fn wav_part(&self, audio: &[u8], file_name: &'static str) -> Result<multipart::Part> {
        multipart::Part::bytes(audio.to_vec())
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| self.endpoint.service.error(format!("mime: {}", e)))
    }
}

#[async_trait]
impl VoiceConverter for HttpVoiceConverter {
    async fn convert(
        &self,
        audio: &[u8],
        reference: &[u8],
        target_language: &str,
    ) -> Result<Vec<u8>> {
        let url = self.endpoint.url("convert");
        let form = multipart::Form::new()
            .part("input", self.wav_part(audio, "input.wav")?)
            .part("reference", self.wav_part(reference, "reference.wav")?)
            .text("target_language", target_language.to_string());

        tracing::debug!(
            input_bytes = audio.len(),
            reference_bytes = reference.len(),
            "sending audio for voice conversion"
        );
        let response = self.endpoint.send(self.endpoint.post(&url).multipart(form)).await?;
        self.endpoint.audio_body(response).await
    }

    fn name(&self) -> &str {
        "http-vc"
    }
}

/// Builds all four HTTP stages over one shared client.
pub fn http_stages(services: &ServicesConfig) -> Result<Stages> {
    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| RelayError::ServiceRequest {
            service: "http".to_string(),
            message: format!("failed to build client: {}", e),
        })?;

    let recognizer = HttpRecognizer {
        endpoint: Endpoint::new(
            &client,
            &services.asr_url,
            services.timeout,
            Service::Recognition,
        ),
    };
    let translator = HttpTranslator {
        endpoint: Endpoint::new(
            &client,
            &services.translation_url,
            services.timeout,
            Service::Translation,
        ),
    };
    let synthesizer = HttpSynthesizer {
        endpoint: Endpoint::new(
            &client,
            &services.synthesis_url,
            services.timeout,
            Service::Synthesis,
        ),
    };
    let converter = HttpVoiceConverter {
        endpoint: Endpoint::new(
            &client,
            &services.conversion_url,
            services.conversion_timeout,
            Service::Conversion,
        ),
    };

    Ok(Stages::new(
        Arc::new(recognizer),
        Arc::new(translator),
        Arc::new(synthesizer),
        Arc::new(converter),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(base: &str) -> Endpoint {
        Endpoint::new(
            &reqwest::Client::new(),
            base,
            Duration::from_secs(1),
            Service::Translation,
        )
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        assert_eq!(
            endpoint("http://host:9001/").url("translate"),
            "http://host:9001/translate"
        );
        assert_eq!(
            endpoint("http://host:9001").url("/translate"),
            "http://host:9001/translate"
        );
    }

    #[test]
    fn test_language_param_is_sanitized() {
        assert_eq!(language_param("ja"), Some("ja".to_string()));
        assert_eq!(language_param(" pt-BR "), Some("pt-BR".to_string()));
        assert_eq!(language_param("en&x=1"), Some("enx1".to_string()));
        assert_eq!(language_param("  "), None);
    }

    #[test]
    fn test_service_errors_map_to_stage_variants() {
        assert!(matches!(
            Service::Recognition.error("x"),
            RelayError::Recognition { .. }
        ));
        assert!(matches!(
            Service::Conversion.error("x"),
            RelayError::Conversion { .. }
        ));
    }

    #[test]
    fn test_transcribe_response_tolerates_missing_fields() {
        let parsed: TranscribeResponse = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(parsed.text, "hi");
        assert!(parsed.language.is_empty());
    }

    #[test]
    fn test_translate_request_shape() {
        let body = TranslateRequest {
            text: "hello",
            source_language: "en",
            target_language: "ja",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["source_language"], "en");
        assert_eq!(json["target_language"], "ja");
    }

    #[test]
    fn test_http_stages_names() {
        let stages = http_stages(&ServicesConfig::default()).unwrap();
        assert_eq!(stages.recognizer.name(), "http-asr");
        assert_eq!(stages.converter.name(), "http-vc");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_stage_error() {
        let mut services = ServicesConfig::default();
        services.translation_url = "http://127.0.0.1:1".to_string();
        let stages = http_stages(&services).unwrap();
        let result = stages.translator.translate("hello", "en", "ja").await;
        assert!(matches!(result, Err(RelayError::Translation { .. })));
    }
}
