//! Google Gemini generateContent backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GeneratorConfig;
use crate::error::{ConfigError, GenerationError, Result};
use crate::generation::openai::is_transient;
use crate::generation::{truncate_to_budget, ChatMessage, Generator, Role};
use crate::retry::retry_with_backoff;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Generator over the Gemini API. Gemini separates the system
/// instruction from the turn list and calls the assistant role "model";
/// the adapter owns that translation.
pub struct GeminiGenerator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    context_window_chars: usize,
    max_retries: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationParams,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiGenerator {
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .ok_or_else(|| ConfigError::MissingField("generator.api_key".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Api(format!("Failed to create HTTP client: {e}")))?;

        // base_url defaults to the OpenRouter URL; only an explicit
        // Gemini endpoint overrides the canonical one.
        let endpoint = if config.base_url.contains("googleapis.com") {
            config.base_url.trim_end_matches('/').to_string()
        } else {
            DEFAULT_ENDPOINT.to_string()
        };

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            context_window_chars: config.context_window_chars,
            max_retries: config.max_retries,
        })
    }

    async fn request_completion(&self, messages: &[ChatMessage]) -> Result<String> {
        let system_instruction = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| Content {
                role: None,
                parts: vec![Part { text: &m.content }],
            });

        let contents: Vec<Content> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Content {
                role: Some(match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                }),
                parts: vec![Part { text: &m.content }],
            })
            .collect();

        let request = GenerateRequest {
            system_instruction,
            contents,
            generation_config: GenerationParams {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    GenerationError::Unreachable(format!("{}: {e}", self.endpoint))
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

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Api(format!("Failed to parse response: {e}")))?;

        let text: String = parsed
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.text)
            .collect();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyCompletion.into());
        }

        Ok(text)
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
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
