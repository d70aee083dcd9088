//! Error types for voxrelay.

use crate::pipeline::error::AdmissionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Stage collaborator errors
    #[error("Speech recognition failed: {message}")]
    Recognition { message: String },

    #[error("Translation failed: {message}")]
    Translation { message: String },

    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Voice conversion failed: {message}")]
    Conversion { message: String },

    #[error("{service} service request failed: {message}")]
    ServiceRequest { service: String, message: String },

    // Admission errors
    #[error("Request not admitted: {0}")]
    Admission(#[from] AdmissionError),

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_invalid_value_display() {
        let error = RelayError::ConfigInvalidValue {
            key: "pipeline.admission_capacity".to_string(),
            message: "must be at least 1".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for pipeline.admission_capacity: must be at least 1"
        );
    }

    #[test]
    fn test_stage_error_display() {
        let error = RelayError::Translation {
            message: "upstream returned 503".to_string(),
        };
        assert_eq!(error.to_string(), "Translation failed: upstream returned 503");

        let error = RelayError::Conversion {
            message: "connection refused".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Voice conversion failed: connection refused"
        );
    }

    #[test]
    fn test_service_request_display() {
        let error = RelayError::ServiceRequest {
            service: "synthesis".to_string(),
            message: "timed out".to_string(),
        };
        assert_eq!(error.to_string(), "synthesis service request failed: timed out");
    }

    #[test]
    fn test_from_admission_error() {
        let error: RelayError = AdmissionError::QueueFull { capacity: 2 }.into();
        assert!(matches!(error, RelayError::Admission(_)));
        assert!(error.to_string().contains("admission queue is full"));
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: RelayError = io_error.into();
        assert!(error.to_string().contains("file not found"));

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: RelayError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RelayError>();
        assert_sync::<RelayError>();
    }
}
