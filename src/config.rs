//! Analyzer configuration.
//!
//! Loaded from a JSON file when one is given and readable; otherwise from environment
//! variables:
//! - `OLLAMA_MODEL` - primary model name (default `llama3.2:3b`)
//! - `OLLAMA_BASE_URL` - primary endpoint (default `http://ollama:11434`)
//! - `AI_TEMPERATURE` - sampling temperature in `[0, 1]` (default `0.3`)
//! - `AI_FALLBACK_ENABLED` - try hosted providers when Ollama is down (default `true`)
//! - `ANTHROPIC_API_KEY`, `OPENAI_API_KEY` - fallback credentials
//! - `AI_REQUEST_TIMEOUT_SECS` - optional per-request timeout

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::llm::{GenerationSettings, Provider};

pub const DEFAULT_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_ENDPOINT: &str = "http://ollama:11434";
pub const DEFAULT_TEMPERATURE: f64 = 0.3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Credential for one hosted fallback provider.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCredential {
    pub provider: Provider,
    pub api_key: String,
    /// Override for the provider's API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Override for the provider's default model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ProviderCredential {
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            base_url: None,
            model: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn is_present(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl std::fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Delays inserted between phases of a progress stream. Purely cosmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPacing {
    pub after_start_ms: u64,
    pub between_phases_ms: u64,
    pub before_complete_ms: u64,
}

impl StreamPacing {
    pub const fn none() -> Self {
        Self {
            after_start_ms: 0,
            between_phases_ms: 0,
            before_complete_ms: 0,
        }
    }
}

impl Default for StreamPacing {
    fn default() -> Self {
        Self {
            after_start_ms: 300,
            between_phases_ms: 500,
            before_complete_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_model")]
    pub model_name: String,
    #[serde(default = "default_endpoint")]
    pub endpoint_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    /// Fallback credentials. Selection order is fixed by the provider, not by this list.
    #[serde(default)]
    pub fallback_credentials: Vec<ProviderCredential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub pacing: StreamPacing,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_true() -> bool {
    true
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            model_name: default_model(),
            endpoint_url: default_endpoint(),
            temperature: DEFAULT_TEMPERATURE,
            fallback_enabled: true,
            fallback_credentials: Vec::new(),
            request_timeout_secs: None,
            pacing: StreamPacing::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration from `path` if given, falling back to the environment.
    ///
    /// A missing file falls back to the environment; an unreadable or malformed file is
    /// logged and also falls back, matching how the settings file is treated at startup.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) if path.exists() => match Self::load_from_path(path) {
                Ok(config) => {
                    tracing::info!("Loaded analyzer config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("{}, using environment defaults", e);
                    Self::from_env()
                }
            },
            Some(path) => {
                tracing::info!(
                    "No config file found at {}, using environment defaults",
                    path.display()
                );
                Self::from_env()
            }
            None => Self::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Read a config file strictly.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Build configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let temperature = match non_empty("AI_TEMPERATURE").map(|v| v.parse::<f64>()) {
            Some(Ok(t)) => t,
            Some(Err(e)) => {
                tracing::warn!("Ignoring invalid AI_TEMPERATURE: {}", e);
                DEFAULT_TEMPERATURE
            }
            None => DEFAULT_TEMPERATURE,
        };

        let fallback_enabled = non_empty("AI_FALLBACK_ENABLED")
            .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);

        let fallback_credentials = [Provider::Anthropic, Provider::OpenAi]
            .into_iter()
            .filter_map(|provider| {
                let key = non_empty(provider.api_key_env()?)?;
                Some(ProviderCredential::new(provider, key))
            })
            .collect();

        Self {
            model_name: non_empty("OLLAMA_MODEL").unwrap_or_else(default_model),
            endpoint_url: non_empty("OLLAMA_BASE_URL").unwrap_or_else(default_endpoint),
            temperature,
            fallback_enabled,
            fallback_credentials,
            request_timeout_secs: non_empty("AI_REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok()),
            pacing: StreamPacing::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within [0, 1], got {}",
                self.temperature
            )));
        }
        if self.model_name.trim().is_empty() {
            return Err(ConfigError::Invalid("model_name cannot be empty".to_string()));
        }
        url::Url::parse(&self.endpoint_url).map_err(|e| {
            ConfigError::Invalid(format!("endpoint_url '{}': {}", self.endpoint_url, e))
        })?;
        Ok(())
    }

    /// Credential for `provider`, if one with a non-empty key is configured.
    pub fn credential_for(&self, provider: Provider) -> Option<&ProviderCredential> {
        self.fallback_credentials
            .iter()
            .find(|c| c.provider == provider && c.is_present())
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            temperature: self.temperature,
            timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn with_pacing(mut self, pacing: StreamPacing) -> Self {
        self.pacing = pacing;
        self
    }
}
