//! Grader settings loaded from YAML.
//!
//! Every field has a default, so an empty file (or no file) is valid.
//!
//! ```yaml
//! provider: openai
//! model: gpt-4o
//! timeout: 60s
//! max_tokens: 1024
//! retry:
//!   max_retries: 2
//!   min_delay: 500ms
//!   max_delay: 8s
//!   max_server_delay: 60s
//! template: prompts/custom_rubric.txt
//! history_file: .promptos/history.jsonl
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use promptos_core::TemplateSource;

use crate::grader::GraderConfig;
use crate::resilience::RetryPolicy;

/// Errors from loading settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid setting: {0}")]
    ValidationError(String),
}

/// Durations written the way people write them: `60s`, `500ms`, `2m`.
pub(crate) mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// User-facing settings for a grading session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraderSettings {
    /// Registered provider type ("openai", "anthropic")
    pub provider: String,

    /// Model name; the provider's default when unset
    pub model: Option<String>,

    /// Per-attempt timeout
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    /// Completion token limit
    pub max_tokens: u32,

    pub retry: RetryPolicy,

    /// Rubric file replacing the built-in rubric
    pub template: Option<PathBuf>,

    /// Custom API endpoint
    pub base_url: Option<String>,

    /// Where graded prompts are appended; no history when unset
    pub history_file: Option<PathBuf>,
}

impl Default for GraderSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            timeout: Duration::from_secs(60),
            max_tokens: 1024,
            retry: RetryPolicy::default(),
            template: None,
            base_url: None,
            history_file: None,
        }
    }
}

impl GraderSettings {
    /// Parse settings from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as null
        let settings: GraderSettings = if yaml.trim().is_empty() {
            GraderSettings::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Load from `path` if given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "provider must not be empty".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        if self.retry.min_delay > self.retry.max_delay {
            return Err(ConfigError::ValidationError(format!(
                "retry.min_delay ({}) exceeds retry.max_delay ({})",
                humantime::format_duration(self.retry.min_delay),
                humantime::format_duration(self.retry.max_delay)
            )));
        }
        Ok(())
    }

    /// Provider configuration passed to the registry.
    pub fn provider_config(&self) -> JsonValue {
        match &self.base_url {
            Some(url) => json!({ "base_url": url }),
            None => json!({}),
        }
    }

    /// Where the rubric comes from.
    pub fn template_source(&self) -> TemplateSource {
        match &self.template {
            Some(path) => TemplateSource::File(path.clone()),
            None => TemplateSource::Builtin,
        }
    }

    /// Settings the grader needs for each call.
    pub fn grader_config(&self) -> GraderConfig {
        GraderConfig {
            max_tokens: self.max_tokens,
            timeout: self.timeout,
            retry: self.retry.clone(),
            template: self.template_source(),
        }
    }

    /// The configured model, or `fallback`.
    pub fn model_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.model.as_deref().unwrap_or(fallback)
    }
}
