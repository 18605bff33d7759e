//! Runtime configuration.
//!
//! Loaded from YAML (or built in code). [`RuntimeConfig::default`] reproduces
//! the reference three-backend ensemble.
//!
//! ```yaml
//! ensemble:
//!   quorum: 2
//!   call_timeout: 30s      # "none" disables the deadline
//! backends:
//!   - id: gpt-4o
//!     provider: openai
//!     model: gpt-4o
//!     weight: 0.45
//!     temperature: 0.3
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use concord_core::{BackendWeights, WeightError};

/// Minimum successful responses needed for weighted fusion.
pub const DEFAULT_QUORUM: usize = 2;

/// Per-call deadline applied by the orchestrator.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid backend weights: {0}")]
    Weights(#[from] WeightError),
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub ensemble: EnsembleConfig,

    pub backends: Vec<BackendConfig>,
}

/// Fan-out and fallback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Successes needed to fuse on the ensemble path. Results fused there are
    /// `Weighted` even when only one backend answered under `quorum: 1`.
    #[serde(default = "default_quorum")]
    pub quorum: usize,

    #[serde(default = "default_call_timeout", with = "optional_duration")]
    pub call_timeout: Option<Duration>,

    /// Backend used alone when quorum is missed; defaults to the highest weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            quorum: DEFAULT_QUORUM,
            call_timeout: default_call_timeout(),
            primary: None,
        }
    }
}

/// One backend in the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Stable identifier used in weights and results
    pub id: String,

    /// Provider type registered in the `ProviderRegistry`
    pub provider: String,

    pub model: String,

    pub weight: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,

    /// Overrides `ensemble.call_timeout` for this backend
    #[serde(
        default,
        with = "optional_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    /// Handed to the provider factory (api_key, base_url)
    #[serde(default = "empty_options", skip_serializing_if = "is_empty_object")]
    pub options: JsonValue,
}

impl BackendConfig {
    pub fn new(
        id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        weight: f64,
    ) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            model: model.into(),
            weight,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.0,
            timeout: None,
            options: empty_options(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_option(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        if let JsonValue::Object(map) = &mut self.options {
            map.insert(key.to_string(), value.into());
        }
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ensemble: EnsembleConfig::default(),
            backends: vec![
                BackendConfig::new("gpt-4o", "openai", "gpt-4o", 0.45).with_temperature(0.3),
                BackendConfig::new(
                    "claude-3-5-sonnet",
                    "anthropic",
                    "claude-3-5-sonnet-20241022",
                    0.40,
                )
                .with_temperature(0.2),
                BackendConfig::new("gemini-1.5-flash", "gemini", "gemini-1.5-flash", 0.15)
                    .with_temperature(0.1),
            ],
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check invariants the runtime relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::Invalid("no backends configured".to_string()));
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if backend.id.trim().is_empty() {
                return Err(ConfigError::Invalid("backend id must not be empty".to_string()));
            }
            if !seen.insert(backend.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate backend id '{}'",
                    backend.id
                )));
            }
            if backend.max_tokens == 0 {
                return Err(ConfigError::Invalid(format!(
                    "backend '{}' has max_tokens of 0",
                    backend.id
                )));
            }
        }

        // Checks finiteness, sign and the sum
        self.weights()?;

        if self.ensemble.quorum == 0 {
            return Err(ConfigError::Invalid("quorum must be at least 1".to_string()));
        }
        if self.ensemble.quorum > self.backends.len() {
            return Err(ConfigError::Invalid(format!(
                "quorum {} exceeds the {} configured backends",
                self.ensemble.quorum,
                self.backends.len()
            )));
        }

        if let Some(primary) = &self.ensemble.primary {
            if self.backend(primary).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "primary '{}' is not a configured backend",
                    primary
                )));
            }
        }

        Ok(())
    }

    /// Base weight table in configuration order.
    pub fn weights(&self) -> Result<BackendWeights, ConfigError> {
        Ok(BackendWeights::new(
            self.backends.iter().map(|b| (b.id.clone(), b.weight)),
        )?)
    }

    pub fn backend(&self, id: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.id == id)
    }

    /// Explicit primary, else the highest-weighted backend.
    pub fn primary_id(&self) -> Option<&str> {
        if let Some(primary) = &self.ensemble.primary {
            return Some(primary.as_str());
        }
        let mut best: Option<&BackendConfig> = None;
        for backend in &self.backends {
            if best.map_or(true, |b| backend.weight > b.weight) {
                best = Some(backend);
            }
        }
        best.map(|b| b.id.as_str())
    }

    /// Deadline for one backend call.
    pub fn timeout_for(&self, id: &str) -> Option<Duration> {
        self.backend(id)
            .and_then(|b| b.timeout)
            .or(self.ensemble.call_timeout)
    }
}

fn default_quorum() -> usize {
    DEFAULT_QUORUM
}

fn default_call_timeout() -> Option<Duration> {
    Some(DEFAULT_CALL_TIMEOUT)
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn empty_options() -> JsonValue {
    JsonValue::Object(serde_json::Map::new())
}

fn is_empty_object(value: &JsonValue) -> bool {
    value.as_object().map_or(false, |m| m.is_empty())
}

/// `Option<Duration>` as a humantime string; "none" (or "off") means no deadline.
mod optional_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_str(&humantime::format_duration(*d).to_string()),
            None => s.serialize_str("none"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("none") | Some("off") => Ok(None),
            Some(text) => humantime::parse_duration(text)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
