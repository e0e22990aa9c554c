//! API-based embedding provider (OpenAI-compatible `/embeddings`).
//!
//! Works against hosted APIs and local servers (TEI, vLLM, Ollama's
//! OpenAI shim) alike. Embedding dominates ingestion latency, so batches
//! are dispatched concurrently up to `parallel_batches` in flight.

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::embedding::{l2_normalize, Embedder};
use crate::error::{DalilError, EmbeddingError, Result};
use crate::retry::retry_with_backoff;

/// OpenAI-compatible API embedding provider.
pub struct ApiEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
    batch_size: usize,
    parallel_batches: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl ApiEmbedder {
    /// Create a provider from configuration. The API key falls back to
    /// the `EMBEDDING_API_KEY` environment variable; local servers
    /// commonly need none.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("EMBEDDING_API_KEY").ok());

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Api(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            parallel_batches: config.parallel_batches.max(1),
        })
    }

    /// One `/embeddings` request for a single batch.
    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Unreachable("request timed out".to_string())
            } else if e.is_connect() {
                EmbeddingError::Unreachable(format!("connection failed: {e}"))
            } else {
                EmbeddingError::Api(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EmbeddingError::RateLimited.into());
        }
        if status.is_server_error() {
            return Err(EmbeddingError::Unreachable(format!("server answered {status}")).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(EmbeddingError::Api(format!("API error ({status}): {message}")).into());
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Api(format!("Failed to parse response: {e}")))?;

        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            if item.embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    got: item.embedding.len(),
                }
                .into());
            }
            let mut vector = item.embedding;
            l2_normalize(&mut vector);
            vectors.push(vector);
        }

        Ok(vectors)
    }

    async fn request_batch_with_retry(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        retry_with_backoff(3, Duration::from_millis(250), is_transient, || {
            self.request_batch(&texts)
        })
        .await
    }
}

/// Transient failures worth retrying: the backend was reachable-ish but
/// flaky. Hard API errors (bad request, auth) and parse failures are not.
fn is_transient(err: &DalilError) -> bool {
    matches!(
        err,
        DalilError::Embedding(EmbeddingError::Unreachable(_))
            | DalilError::Embedding(EmbeddingError::RateLimited)
    )
}

#[async_trait]
impl Embedder for ApiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<Vec<String>> = texts
            .chunks(self.batch_size)
            .map(|c| c.to_vec())
            .collect();

        // buffered() preserves batch order, so outputs line up with inputs.
        let results: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| self.request_batch_with_retry(batch))
            .buffered(self.parallel_batches)
            .try_collect()
            .await?;

        Ok(results.into_iter().flatten().collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
