//! Ollama client for locally hosted models.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::LlmError;
use super::{
    build_http_client, join_url, Generation, GenerationSettings, Prompt, Provider, TextGenerator,
    TokenUsage,
};

/// Ollama client using the non-streaming `/api/generate` endpoint.
#[derive(Debug)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f64,
}

impl OllamaClient {
    /// Create a client for `model` served at `base_url`.
    ///
    /// Fails only if the base URL is not a valid URL or the HTTP client cannot be built;
    /// reachability is checked separately with [`OllamaClient::probe`].
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        settings: &GenerationSettings,
    ) -> Result<Self, LlmError> {
        let base_url = base_url.into();
        url::Url::parse(&base_url).map_err(|e| {
            LlmError::network_error(format!("Invalid Ollama URL '{}': {}", base_url, e))
        })?;

        Ok(Self {
            client: build_http_client(settings)?,
            base_url,
            model: model.into(),
            temperature: settings.temperature,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Liveness check: one minimal generation call.
    pub async fn probe(&self) -> Result<(), LlmError> {
        self.generate(&Prompt::user_only("test")).await.map(|_| ())
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, LlmError> {
        let request = OllamaRequest {
            model: &self.model,
            prompt: &prompt.user,
            system: (!prompt.system.is_empty()).then_some(prompt.system.as_str()),
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        tracing::debug!("Sending request to Ollama: model={}", self.model);

        let response = self
            .client
            .post(join_url(&self.base_url, "/api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), body));
        }

        let parsed: OllamaResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::parse_error(format!("Failed to parse response: {}, body: {}", e, body))
        })?;

        let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
            (None, None) => None,
            (prompt_tokens, completion_tokens) => Some(TokenUsage::new(
                prompt_tokens.unwrap_or(0),
                completion_tokens.unwrap_or(0),
            )),
        };

        Ok(Generation {
            text: parsed.response,
            usage,
        })
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}
