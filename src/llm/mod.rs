//! Text-generation providers.
//!
//! Supports:
//! - **Gemini** (default primary)
//! - **Anthropic**
//! - **OpenAI**
//!
//! Each provider is a thin JSON client behind the one `TextProvider`
//! capability; the `ResponseGenerator` holds a prioritized list of them
//! and falls through on any failure. Which providers exist is decided
//! once at startup from available credentials.

pub mod anthropic;
pub mod failover;
pub mod gemini;
pub mod openai;
pub mod templates;

pub use failover::{GeneratedReply, ResponseGenerator};

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::GenError;

/// Supported text-generation backends, in fixed fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    Anthropic,
    OpenAi,
}

/// The fixed fallback order tried after the primary provider.
pub const FALLBACK_ORDER: [ProviderKind; 3] =
    [ProviderKind::Gemini, ProviderKind::Anthropic, ProviderKind::OpenAi];

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

/// A text-generation backend: one capability, uniform across providers.
#[async_trait]
pub trait TextProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Generate a completion for the prompt. Any failure mode (transport
    /// error, API rejection, empty output, safety block) surfaces as a
    /// `GenError` so the caller can fall through to the next provider.
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenError>;
}

/// Configuration for creating a provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: SecretString,
    pub model: String,
}

/// Create a provider client from configuration.
pub fn create_provider(config: ProviderConfig) -> Arc<dyn TextProvider> {
    match config.kind {
        ProviderKind::Gemini => {
            tracing::info!(model = %config.model, "Using Gemini provider");
            Arc::new(gemini::GeminiClient::new(config.api_key, config.model))
        }
        ProviderKind::Anthropic => {
            tracing::info!(model = %config.model, "Using Anthropic provider");
            Arc::new(anthropic::AnthropicClient::new(config.api_key, config.model))
        }
        ProviderKind::OpenAi => {
            tracing::info!(model = %config.model, "Using OpenAI provider");
            Arc::new(openai::OpenAiClient::new(config.api_key, config.model))
        }
    }
}

/// Build the configured provider list from the environment, in
/// primary-then-fallback order. Providers without credentials are
/// skipped; an empty result is the caller's startup error.
pub fn providers_from_env(primary: ProviderKind) -> Vec<Arc<dyn TextProvider>> {
    let mut order = vec![primary];
    order.extend(FALLBACK_ORDER.iter().copied().filter(|k| *k != primary));

    let mut providers: Vec<Arc<dyn TextProvider>> = Vec::new();
    for kind in order {
        let (key_var, model_var, default_model) = match kind {
            ProviderKind::Gemini => ("GOOGLE_API_KEY", "REPLYBOT_GEMINI_MODEL", "gemini-1.5-flash"),
            ProviderKind::Anthropic => (
                "ANTHROPIC_API_KEY",
                "REPLYBOT_ANTHROPIC_MODEL",
                "claude-3-5-haiku-latest",
            ),
            ProviderKind::OpenAi => ("OPENAI_API_KEY", "REPLYBOT_OPENAI_MODEL", "gpt-4o-mini"),
        };
        if let Ok(key) = std::env::var(key_var) {
            if key.trim().is_empty() {
                continue;
            }
            let model =
                std::env::var(model_var).unwrap_or_else(|_| default_model.to_string());
            providers.push(create_provider(ProviderConfig {
                kind,
                api_key: SecretString::from(key),
                model,
            }));
        }
    }
    providers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_labels() {
        assert_eq!(ProviderKind::Gemini.as_str(), "gemini");
        assert_eq!(ProviderKind::Anthropic.as_str(), "anthropic");
        assert_eq!(ProviderKind::OpenAi.as_str(), "openai");
    }

    #[test]
    fn create_provider_constructs_each_kind() {
        // Clients accept any key at construction; auth fails at request time.
        for kind in FALLBACK_ORDER {
            let provider = create_provider(ProviderConfig {
                kind,
                api_key: SecretString::from("test-key"),
                model: "test-model".to_string(),
            });
            assert_eq!(provider.kind(), kind);
        }
    }
}
