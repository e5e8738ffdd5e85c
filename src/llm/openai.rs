//! OpenAI client.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::GenError;
use crate::llm::{ProviderKind, TextProvider};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: SecretString, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    fn request_failed(&self, reason: impl std::fmt::Display) -> GenError {
        GenError::RequestFailed {
            provider: "openai".to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl TextProvider for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
            "temperature": 0.7,
        });

        let response = self
            .http
            .post(API_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_failed(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(self.request_failed(format!("status {status}: {detail}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.request_failed(format!("bad response body: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenError::EmptyResponse {
                provider: "openai".to_string(),
            })?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(GenError::ContentBlocked {
                provider: "openai".to_string(),
                reason: "content filter triggered".to_string(),
            });
        }

        let text = choice.message.content.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(GenError::EmptyResponse {
                provider: "openai".to_string(),
            });
        }

        debug!(chars = text.len(), "OpenAI response received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat_response() {
        let raw = r#"{
            "choices": [{
                "message": { "content": "A reply" },
                "finish_reason": "stop"
            }]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("A reply")
        );
    }

    #[test]
    fn missing_content_deserializes_as_none() {
        let raw = r#"{ "choices": [{ "message": {}, "finish_reason": "stop" }] }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
