use crate::defaults;
use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineSection,
    pub languages: LanguagesConfig,
    pub results: ResultsConfig,
    pub services: ServicesConfig,
    pub log: LogConfig,
}

/// Queue capacities, concurrency limits and the ETA fallback
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSection {
    pub admission_capacity: usize,
    pub bottleneck_capacity: usize,
    pub preprocess_concurrency: usize,
    pub bottleneck_concurrency: usize,
    #[serde(with = "humantime_serde")]
    pub default_latency: Duration,
}

/// Translation direction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LanguagesConfig {
    /// Language translated back into when the speaker already uses `target`.
    pub source: String,
    /// Default target for requests that do not name one.
    pub target: String,
}

/// Pollable result retention
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResultsConfig {
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    pub max_entries: usize,
}

/// Endpoints of the remote stage services
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServicesConfig {
    pub asr_url: String,
    pub translation_url: String,
    pub synthesis_url: String,
    pub conversion_url: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub conversion_timeout: Duration,
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            admission_capacity: defaults::ADMISSION_CAPACITY,
            bottleneck_capacity: defaults::BOTTLENECK_CAPACITY,
            preprocess_concurrency: defaults::PREPROCESS_CONCURRENCY,
            bottleneck_concurrency: defaults::BOTTLENECK_CONCURRENCY,
            default_latency: defaults::DEFAULT_REQUEST_LATENCY,
        }
    }
}

impl Default for LanguagesConfig {
    fn default() -> Self {
        Self {
            source: defaults::SOURCE_LANGUAGE.to_string(),
            target: defaults::TARGET_LANGUAGE.to_string(),
        }
    }
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            ttl: defaults::RESULT_TTL,
            max_entries: defaults::MAX_RESULTS,
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            asr_url: defaults::ASR_URL.to_string(),
            translation_url: defaults::TRANSLATION_URL.to_string(),
            synthesis_url: defaults::SYNTHESIS_URL.to_string(),
            conversion_url: defaults::CONVERSION_URL.to_string(),
            timeout: defaults::SERVICE_TIMEOUT,
            conversion_timeout: defaults::CONVERSION_TIMEOUT,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RelayError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                RelayError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only a missing file falls back to defaults; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(RelayError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXRELAY_SOURCE_LANGUAGE → languages.source
    /// - VOXRELAY_TARGET_LANGUAGE → languages.target
    /// - VOXRELAY_CONVERSION_URL → services.conversion_url
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(source) = std::env::var("VOXRELAY_SOURCE_LANGUAGE")
            && !source.is_empty()
        {
            self.languages.source = source;
        }

        if let Ok(target) = std::env::var("VOXRELAY_TARGET_LANGUAGE")
            && !target.is_empty()
        {
            self.languages.target = target;
        }

        if let Ok(url) = std::env::var("VOXRELAY_CONVERSION_URL")
            && !url.is_empty()
        {
            self.services.conversion_url = url;
        }

        self
    }

    /// Checks values serde cannot: limits must be at least one, languages non-empty.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("pipeline.admission_capacity", self.pipeline.admission_capacity),
            ("pipeline.bottleneck_capacity", self.pipeline.bottleneck_capacity),
            ("pipeline.preprocess_concurrency", self.pipeline.preprocess_concurrency),
            ("pipeline.bottleneck_concurrency", self.pipeline.bottleneck_concurrency),
            ("results.max_entries", self.results.max_entries),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(RelayError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
        }

        for (key, value) in [
            ("languages.source", &self.languages.source),
            ("languages.target", &self.languages.target),
        ] {
            if value.trim().is_empty() {
                return Err(RelayError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        if self.results.ttl.is_zero() {
            return Err(RelayError::ConfigInvalidValue {
                key: "results.ttl".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Render as TOML, for `config show`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RelayError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxrelay/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("voxrelay")
            .join("config.toml")
    }
}
