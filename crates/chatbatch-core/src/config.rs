//! Configuration loading from `.chatbatch/config.toml`.

use crate::batch::backoff::DEFAULT_FIRST_WAIT_TIME;
use crate::batch::options::{DEFAULT_MAX_ATTEMPTS, DispatchOptions, GenerationOptions};
use chatbatch_models::{DEFAULT_MODEL_ID, ModelConfig, ModelType};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// `[model]` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ModelSection {
    /// The type of model (mock, openai).
    #[serde(default = "default_model_type")]
    pub model_type: String,
    /// The model ID (e.g., "gpt-4o-mini").
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Optional API key override (if not provided, will be loaded from environment).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Optional API root override.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_model_type() -> String {
    "openai".to_string()
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            model_type: default_model_type(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
        }
    }
}

impl ModelSection {
    /// Converts the section into a factory configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` for an unknown model type.
    pub fn to_model_config(&self) -> Result<ModelConfig, ConfigError> {
        let model_type: ModelType = self
            .model_type
            .parse()
            .map_err(|e| ConfigError::Validation(format!("{e}")))?;
        let mut config = ModelConfig::new(model_type, self.model_id.clone());
        if let Some(api_key) = &self.api_key {
            config = config.with_api_key(api_key.clone());
        }
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.clone());
        }
        Ok(config)
    }
}

/// `[dispatch]` section.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DispatchSection {
    /// Calls per request before giving up. Signed so that non-positive values are
    /// reported as validation errors rather than parse errors.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
    /// Base backoff wait in seconds.
    #[serde(default = "default_first_wait_time_secs")]
    pub first_wait_time_secs: f64,
    /// Optional deadline for a whole batch, in seconds.
    #[serde(default)]
    pub batch_timeout_secs: Option<f64>,
    /// Generation options forwarded to the remote client.
    #[serde(default)]
    pub generation: GenerationOptions,
}

fn default_max_attempts() -> i64 {
    i64::from(DEFAULT_MAX_ATTEMPTS)
}

fn default_first_wait_time_secs() -> f64 {
    DEFAULT_FIRST_WAIT_TIME.as_secs_f64()
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            first_wait_time_secs: default_first_wait_time_secs(),
            batch_timeout_secs: None,
            generation: GenerationOptions::default(),
        }
    }
}

impl DispatchSection {
    /// Validates the section and converts it into dispatch options.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` for out-of-range values or conflicting
    /// generation options.
    pub fn to_options(&self) -> Result<DispatchOptions, ConfigError> {
        if self.max_attempts <= 0 {
            return Err(ConfigError::Validation(format!(
                "max_attempts must be at least 1, got {}",
                self.max_attempts
            )));
        }
        let max_attempts = u32::try_from(self.max_attempts).map_err(|_| {
            ConfigError::Validation(format!("max_attempts is too large: {}", self.max_attempts))
        })?;
        let first_wait_time = seconds("first_wait_time_secs", self.first_wait_time_secs)?;
        let batch_timeout = self
            .batch_timeout_secs
            .map(|secs| seconds("batch_timeout_secs", secs))
            .transpose()?;

        let options = DispatchOptions {
            max_attempts,
            first_wait_time,
            batch_timeout,
            generation: self.generation.clone(),
        };
        options
            .prepare()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        Ok(options)
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        ConfigError::Validation(format!(
            "{field} must be a non-negative number, got {value}"
        ))
    })
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    /// Remote client configuration.
    #[serde(default)]
    pub model: ModelSection,
    /// Dispatch configuration.
    #[serde(default)]
    pub dispatch: DispatchSection,
}

impl Config {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    /// Returns error if the text is not valid TOML for this schema.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads configuration from a file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Get the default config file path for a directory.
#[must_use]
pub fn default_config_path(root: &Path) -> PathBuf {
    root.join(".chatbatch").join("config.toml")
}
