//! Anthropic client.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::GenError;
use crate::llm::{ProviderKind, TextProvider};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: SecretString, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    fn request_failed(&self, reason: impl std::fmt::Display) -> GenError {
        GenError::RequestFailed {
            provider: "anthropic".to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[async_trait]
impl TextProvider for AnthropicClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": 0.7,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_failed(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(self.request_failed(format!("status {status}: {detail}")));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| self.request_failed(format!("bad response body: {e}")))?;

        if parsed.stop_reason.as_deref() == Some("refusal") {
            return Err(GenError::ContentBlocked {
                provider: "anthropic".to_string(),
                reason: "model refused the prompt".to_string(),
            });
        }

        let text: String = parsed
            .content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(GenError::EmptyResponse {
                provider: "anthropic".to_string(),
            });
        }

        debug!(chars = text.len(), "Anthropic response received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_blocks() {
        let raw = r#"{
            "content": [
                { "type": "text", "text": "Part one. " },
                { "type": "text", "text": "Part two." }
            ],
            "stop_reason": "end_turn"
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        let text: String = parsed
            .content
            .iter()
            .filter_map(|b| b.text.clone())
            .collect();
        assert_eq!(text, "Part one. Part two.");
    }

    #[test]
    fn empty_content_deserializes() {
        let raw = r#"{ "content": [], "stop_reason": "end_turn" }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.content.is_empty());
    }
}
