//! Provider failover — tries the primary provider, then the remaining
//! configured providers in their fixed fallback order.
//!
//! A failed provider is never retried within one generation attempt;
//! each failure (transport, API rejection, empty output, safety block)
//! falls straight through to the next provider. All-fail is reported,
//! never treated as success.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{ConfigError, GenError};
use crate::llm::templates::render_prompt;
use crate::llm::TextProvider;

/// A generated reply plus the provider that produced it.
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub text: String,
    pub provider: &'static str,
}

/// Orchestrates generation across the configured provider chain.
pub struct ResponseGenerator {
    /// Providers in trial order: primary first, then fallbacks.
    providers: Vec<Arc<dyn TextProvider>>,
    max_tokens: u32,
}

impl ResponseGenerator {
    /// Build from an ordered provider list. At least one provider must
    /// be configured; refusing to construct is what keeps the pipeline
    /// from starting without a backend.
    pub fn new(
        providers: Vec<Arc<dyn TextProvider>>,
        max_tokens: u32,
    ) -> Result<Self, ConfigError> {
        if providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        Ok(Self {
            providers,
            max_tokens,
        })
    }

    /// Names of the configured providers, in trial order.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.kind().as_str().to_string())
            .collect()
    }

    /// Generate a reply for a post using the winning rule's template.
    ///
    /// Returns the first non-empty successful response verbatim (trimmed
    /// of surrounding whitespace) along with the producing provider.
    pub async fn generate_reply(
        &self,
        title: &str,
        body: &str,
        keywords: &[String],
        template_id: Option<&str>,
    ) -> Result<GeneratedReply, GenError> {
        let prompt = render_prompt(template_id, title, body, keywords);

        for provider in &self.providers {
            let name = provider.kind().as_str();
            match provider.generate(&prompt, self.max_tokens).await {
                Ok(text) => {
                    let text = text.trim().to_string();
                    if text.is_empty() {
                        warn!(provider = name, "Provider returned whitespace-only text");
                        continue;
                    }
                    info!(provider = name, "Response generated");
                    return Ok(GeneratedReply {
                        text,
                        provider: name,
                    });
                }
                Err(e) => {
                    warn!(provider = name, error = %e, "Provider failed, trying next");
                }
            }
        }

        Err(GenError::AllProvidersFailed)
    }
}
