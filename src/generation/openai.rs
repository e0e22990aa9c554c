//! OpenAI-compatible chat completions backend.
//!
//! Covers the hosted API, OpenRouter, and local vLLM servers; they speak
//! the same wire shape and differ only in base URL and auth. Local
//! servers are health-checked at startup so a dead deployment fails fast
//! instead of on the first query.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GeneratorConfig;
use crate::error::{DalilError, GenerationError, Result};
use crate::generation::{truncate_to_budget, ChatMessage, Generator};
use crate::retry::retry_with_backoff;

/// Generator over any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    context_window_chars: usize,
    max_retries: u32,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiGenerator {
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Api(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config
                .api_key
                .clone()
                .or_else(|| std::env::var("GENERATOR_API_KEY").ok()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            context_window_chars: config.context_window_chars,
            max_retries: config.max_retries,
        })
    }

    /// Verify the server is reachable. Local inference servers are
    /// checked at service startup; misdeployment is a startup error.
    pub async fn health_check(&self) -> Result<()> {
        let mut builder = self.client.get(format!("{}/models", self.base_url));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GenerationError::Unreachable(format!("{}: {e}", self.base_url)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(GenerationError::Unreachable(format!(
                "{} answered {}",
                self.base_url,
                response.status()
            ))
            .into())
        }
    }

    async fn request_completion(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                GenerationError::Unreachable(format!("{}: {e}", self.base_url))
            } else {
                GenerationError::Api(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(GenerationError::Unreachable(format!("server answered {status}")).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api(format!("API error ({status}): {body}")).into());
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Api(format!("Failed to parse response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(GenerationError::EmptyCompletion.into());
        }

        Ok(content)
    }
}

/// Transient failures worth retrying: the backend was reachable-ish but
/// flaky. Hard API errors (bad request, auth) are not.
pub(crate) fn is_transient(err: &DalilError) -> bool {
    matches!(err, DalilError::Generation(GenerationError::Unreachable(_)))
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let messages = truncate_to_budget(messages, self.context_window_chars);
        retry_with_backoff(
            self.max_retries,
            Duration::from_millis(500),
            is_transient,
            || self.request_completion(&messages),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GeneratorConfig {
        GeneratorConfig {
            base_url: "http://localhost:8000/v1/".to_string(),
            api_key: Some("key".to_string()),
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn test_from_config_normalizes_url() {
        let generator = OpenAiGenerator::from_config(&config()).unwrap();
        assert!(!generator.base_url.ends_with('/'));
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(
            &GenerationError::Unreachable("503".into()).into()
        ));
        assert!(!is_transient(
            &GenerationError::Api("400 bad request".into()).into()
        ));
        assert!(!is_transient(&GenerationError::EmptyCompletion.into()));
    }

    #[tokio::test]
    #[ignore = "requires a running OpenAI-compatible server"]
    async fn test_live_generation() {
        let mut cfg = config();
        cfg.api_key = None;
        let generator = OpenAiGenerator::from_config(&cfg).unwrap();
        generator.health_check().await.unwrap();
        let answer = generator
            .generate(&[ChatMessage::user("قل مرحبا")])
            .await
            .unwrap();
        assert!(!answer.is_empty());
    }
}
