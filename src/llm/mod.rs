//! Text-generation backends.
//!
//! Everything above this module talks to a language model through one capability,
//! [`TextGenerator::generate`]. The concrete backends form a closed set
//! ([`ModelBackend`]): a locally hosted Ollama model as the primary, and hosted
//! providers (Anthropic, OpenAI) as fallbacks. [`selector::select_backend`] picks one.

mod error;
mod ollama;
pub mod selector;

#[cfg(feature = "anthropic")]
mod anthropic;
#[cfg(feature = "openai")]
mod openai;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{classify_http_status, LlmError, LlmErrorKind};
pub use ollama::OllamaClient;
pub use selector::{select_backend, SelectionAttempt};

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicClient;
#[cfg(feature = "openai")]
pub use openai::OpenAiClient;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Identity of a text-generation provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    /// Environment variable holding this provider's API key, if it needs one.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Ollama => None,
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
        }
    }

    /// Whether a client for this provider was compiled into the binary.
    pub fn is_compiled_in(&self) -> bool {
        match self {
            Self::Ollama => true,
            Self::Anthropic => cfg!(feature = "anthropic"),
            Self::OpenAi => cfg!(feature = "openai"),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A two-part prompt: the system instruction and the user instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// A prompt with no system instruction.
    pub fn user_only(user: impl Into<String>) -> Self {
        Self::new(String::new(), user)
    }

    /// Flattened form used in analysis records.
    pub fn render(&self) -> String {
        if self.system.is_empty() {
            self.user.clone()
        } else {
            format!("[system]\n{}\n\n[user]\n{}", self.system, self.user)
        }
    }
}

/// Token usage information (if provided by the upstream provider).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Create a usage object ensuring `total_tokens` is consistent.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Raw output of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Sampling and transport settings shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    /// Sampling temperature (0 = deterministic).
    pub temperature: f64,
    /// Per-request timeout. `None` leaves the request unbounded.
    pub timeout: Option<Duration>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            timeout: None,
        }
    }
}

/// The one capability the analysis layer needs from a model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn provider(&self) -> Provider;

    fn model(&self) -> &str;

    /// Send the prompt and return the model's raw text.
    async fn generate(&self, prompt: &Prompt) -> Result<Generation, LlmError>;

    /// `provider:model`, used in logs and analysis records.
    fn identity(&self) -> String {
        format!("{}:{}", self.provider(), self.model())
    }
}

/// The backend bound to an analyzer for its whole lifetime.
pub enum ModelBackend {
    Ollama(OllamaClient),
    #[cfg(feature = "anthropic")]
    Anthropic(AnthropicClient),
    #[cfg(feature = "openai")]
    OpenAi(OpenAiClient),
}

impl fmt::Debug for ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelBackend").field(&self.identity()).finish()
    }
}

#[async_trait]
impl TextGenerator for ModelBackend {
    fn provider(&self) -> Provider {
        match self {
            Self::Ollama(c) => c.provider(),
            #[cfg(feature = "anthropic")]
            Self::Anthropic(c) => c.provider(),
            #[cfg(feature = "openai")]
            Self::OpenAi(c) => c.provider(),
        }
    }

    fn model(&self) -> &str {
        match self {
            Self::Ollama(c) => c.model(),
            #[cfg(feature = "anthropic")]
            Self::Anthropic(c) => c.model(),
            #[cfg(feature = "openai")]
            Self::OpenAi(c) => c.model(),
        }
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, LlmError> {
        match self {
            Self::Ollama(c) => c.generate(prompt).await,
            #[cfg(feature = "anthropic")]
            Self::Anthropic(c) => c.generate(prompt).await,
            #[cfg(feature = "openai")]
            Self::OpenAi(c) => c.generate(prompt).await,
        }
    }
}

/// Build the HTTP client used by the provider clients.
pub(crate) fn build_http_client(settings: &GenerationSettings) -> Result<Client, LlmError> {
    let mut builder = Client::builder();
    if let Some(timeout) = settings.timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| LlmError::network_error(format!("Failed to build HTTP client: {}", e)))
}

/// Join a base URL and an API path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
