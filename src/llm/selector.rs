//! Backend selection: primary local model first, then hosted fallbacks in fixed order.

use std::fmt;

use crate::config::{AnalyzerConfig, ProviderCredential};
use crate::error::AnalysisError;

use super::{GenerationSettings, ModelBackend, OllamaClient, Provider, TextGenerator};

#[cfg(feature = "anthropic")]
use super::AnthropicClient;
#[cfg(feature = "openai")]
use super::OpenAiClient;

/// Hosted providers in the order they are tried.
pub const FALLBACK_ORDER: [Provider; 2] = [Provider::Anthropic, Provider::OpenAi];

/// One provider that was considered and rejected during selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionAttempt {
    pub provider: Provider,
    pub reason: String,
}

impl SelectionAttempt {
    fn new(provider: Provider, reason: impl Into<String>) -> Self {
        Self {
            provider,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SelectionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.provider, self.reason)
    }
}

/// Choose the backend an analyzer will be bound to.
///
/// The primary Ollama backend gets exactly one liveness probe. If it fails and fallback is
/// enabled, the first hosted provider in [`FALLBACK_ORDER`] that is compiled in, has a
/// credential, and constructs cleanly is returned. Hosted providers are not probed.
pub async fn select_backend(config: &AnalyzerConfig) -> Result<ModelBackend, AnalysisError> {
    let settings = config.generation_settings();
    let mut attempts = Vec::new();

    match try_primary(config, &settings).await {
        Ok(client) => {
            tracing::info!(
                "Successfully connected to Ollama at {} (model: {})",
                client.base_url(),
                config.model_name
            );
            return Ok(ModelBackend::Ollama(client));
        }
        Err(reason) => {
            tracing::warn!("Failed to connect to Ollama: {}", reason);
            attempts.push(SelectionAttempt::new(Provider::Ollama, reason));
        }
    }

    if !config.fallback_enabled {
        tracing::error!("Ollama not available and fallback disabled");
        return Err(AnalysisError::BackendUnavailable { attempts });
    }

    for provider in FALLBACK_ORDER {
        if !provider.is_compiled_in() {
            tracing::warn!("{} client not compiled in, skipping", provider);
            attempts.push(SelectionAttempt::new(provider, "client not compiled in"));
            continue;
        }

        let Some(credential) = config.credential_for(provider) else {
            tracing::debug!("No credential configured for {}", provider);
            attempts.push(SelectionAttempt::new(provider, "no credential configured"));
            continue;
        };

        match build_fallback(credential, &settings) {
            Ok(backend) => {
                tracing::info!("Using {} as fallback backend", backend.identity());
                return Ok(backend);
            }
            Err(reason) => {
                tracing::warn!("Failed to initialize {}: {}", provider, reason);
                attempts.push(SelectionAttempt::new(provider, reason));
            }
        }
    }

    tracing::error!("No LLM available (Ollama failed, no usable fallback)");
    Err(AnalysisError::BackendUnavailable { attempts })
}

async fn try_primary(
    config: &AnalyzerConfig,
    settings: &GenerationSettings,
) -> Result<OllamaClient, String> {
    let client = OllamaClient::new(&config.endpoint_url, &config.model_name, settings)
        .map_err(|e| e.to_string())?;
    client.probe().await.map_err(|e| e.to_string())?;
    Ok(client)
}

fn build_fallback(
    credential: &ProviderCredential,
    settings: &GenerationSettings,
) -> Result<ModelBackend, String> {
    #[cfg(not(any(feature = "anthropic", feature = "openai")))]
    let _ = settings;

    match credential.provider {
        #[cfg(feature = "anthropic")]
        Provider::Anthropic => AnthropicClient::new(
            credential.api_key.clone(),
            credential.model.clone(),
            credential.base_url.clone(),
            settings,
        )
        .map(ModelBackend::Anthropic)
        .map_err(|e| e.to_string()),
        #[cfg(feature = "openai")]
        Provider::OpenAi => OpenAiClient::new(
            credential.api_key.clone(),
            credential.model.clone(),
            credential.base_url.clone(),
            settings,
        )
        .map(ModelBackend::OpenAi)
        .map_err(|e| e.to_string()),
        other => Err(format!("{} is not a fallback provider", other)),
    }
}
