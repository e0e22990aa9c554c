//! Cross-encoder reranking.
//!
//! A cross-encoder scores each (query, candidate) pair jointly, which is
//! more accurate than the bi-encoder similarity used for recall and
//! worth the extra latency on the short candidate list stage 1 returns.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::RerankerConfig;
use crate::error::{DalilError, RerankError, Result};
use crate::retry::retry_with_backoff;

/// One reranked candidate: original index plus relevance score.
/// Scores are comparable within a single call only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredIndex {
    pub index: usize,
    pub score: f32,
}

/// Capability: reorder candidates by cross-encoder relevance.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score `candidates` against `query` and return the top `top_n` in
    /// descending score order, ties broken by ascending original index.
    /// Candidates are passed verbatim; no renormalization.
    async fn rerank(
        &self,
        query: &str,
        candidates: &[String],
        top_n: usize,
    ) -> Result<Vec<ScoredIndex>>;
}

/// Sort scored candidates per the contract: score descending, original
/// index ascending on ties, truncated to `top_n`.
pub fn order_scores(mut scored: Vec<ScoredIndex>, top_n: usize) -> Vec<ScoredIndex> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
    scored.truncate(top_n);
    scored
}

/// HTTP cross-encoder reranker.
///
/// Speaks the rerank shape served by TEI-style deployments:
/// `{query, documents}` in, `{scores: [..]}` out. Transient failures
/// (timeout, connection refused, 5xx) are retried with bounded backoff
/// inside the call; only a persistent outage reaches the caller.
pub struct ApiReranker {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
    scores: Vec<f32>,
}

impl ApiReranker {
    pub fn from_config(config: &RerankerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RerankError::Api(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config
                .api_key
                .clone()
                .or_else(|| std::env::var("RERANKER_API_KEY").ok()),
        })
    }

    /// One `/rerank` request, scores in candidate order.
    async fn request_scores(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        let request = RerankRequest {
            model: &self.model,
            query,
            documents: candidates,
        };

        let mut builder = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                RerankError::Unreachable(format!("{}: {e}", self.base_url))
            } else {
                RerankError::Api(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(RerankError::Unreachable(format!("server answered {status}")).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RerankError::Api(format!("API error ({status}): {body}")).into());
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RerankError::Api(format!("Failed to parse response: {e}")))?;

        if parsed.scores.len() != candidates.len() {
            return Err(RerankError::ScoreMismatch {
                candidates: candidates.len(),
                scores: parsed.scores.len(),
            }
            .into());
        }

        Ok(parsed.scores)
    }
}

/// Transient failures retried within the call; anything else is handed
/// straight to the caller, where retrieval applies its dense-order
/// fallback.
fn is_transient(err: &DalilError) -> bool {
    matches!(err, DalilError::Rerank(RerankError::Unreachable(_)))
}

#[async_trait]
impl Reranker for ApiReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[String],
        top_n: usize,
    ) -> Result<Vec<ScoredIndex>> {
        if candidates.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let scores = retry_with_backoff(3, Duration::from_millis(250), is_transient, || {
            self.request_scores(query, candidates)
        })
        .await?;

        let scored = scores
            .into_iter()
            .enumerate()
            .map(|(index, score)| ScoredIndex { index, score })
            .collect();

        Ok(order_scores(scored, top_n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_scores_descending() {
        let scored = vec![
            ScoredIndex { index: 0, score: 0.2 },
            ScoredIndex { index: 1, score: 0.9 },
            ScoredIndex { index: 2, score: 0.5 },
        ];
        let ordered = order_scores(scored, 3);
        assert_eq!(ordered[0].index, 1);
        assert_eq!(ordered[1].index, 2);
        assert_eq!(ordered[2].index, 0);
    }

    #[test]
    fn test_order_scores_tie_breaks_by_original_index() {
        let scored = vec![
            ScoredIndex { index: 2, score: 0.7 },
            ScoredIndex { index: 0, score: 0.7 },
            ScoredIndex { index: 1, score: 0.7 },
        ];
        let ordered = order_scores(scored, 3);
        let indices: Vec<_> = ordered.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_order_scores_truncates() {
        let scored = (0..10)
            .map(|i| ScoredIndex {
                index: i,
                score: i as f32,
            })
            .collect();
        let ordered = order_scores(scored, 3);
        assert_eq!(ordered.len(), 3);
        assert_eq!(ordered[0].index, 9);
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(
            &RerankError::Unreachable("503".into()).into()
        ));
        assert!(!is_transient(
            &RerankError::Api("400 bad request".into()).into()
        ));
        assert!(!is_transient(
            &RerankError::ScoreMismatch {
                candidates: 5,
                scores: 3
            }
            .into()
        ));
    }

    #[tokio::test]
    async fn test_empty_candidates_short_circuit() {
        let reranker = ApiReranker::from_config(&RerankerConfig::default()).unwrap();
        let result = reranker.rerank("query", &[], 5).await.unwrap();
        assert!(result.is_empty());
    }
}
