//! Two-stage retrieval: dense recall then cross-encoder rerank.
//!
//! Stage 1 embeds the query and pulls `top_k` candidates from the
//! documents collection by cosine similarity. Stage 2 rescores that short
//! list with the cross-encoder and keeps `top_n`. A reranker outage
//! degrades to the dense order rather than failing the query.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::{RerankerConfig, RetrievalConfig};
use crate::embedding::Embedder;
use crate::error::Result;
use crate::rerank::Reranker;
use crate::storage::{PayloadFilter, VectorStore};

/// A retrieved chunk with its final relevance score and payload.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub content: String,
    pub score: f32,
    pub payload: Map<String, Value>,
}

/// Result of a retrieval pass.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    /// Up to `top_n` chunks, best first.
    pub chunks: Vec<RetrievedChunk>,
    /// True when the reranker was unavailable and the order is the
    /// stage-1 dense order.
    pub order_only: bool,
}

/// The two-stage retrieval engine.
pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    store: Arc<dyn VectorStore>,
    collection: String,
    top_k: usize,
    top_n: usize,
}

impl RetrievalEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        store: Arc<dyn VectorStore>,
        retrieval: &RetrievalConfig,
        reranker_config: &RerankerConfig,
    ) -> Self {
        Self {
            embedder,
            reranker,
            store,
            collection: retrieval.documents_collection.clone(),
            top_k: retrieval.top_k,
            top_n: reranker_config.top_n,
        }
    }

    /// Retrieve the best chunks for a normalized query. An empty query
    /// returns an empty outcome without touching either model; an empty
    /// collection legitimately yields zero chunks.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalOutcome> {
        self.retrieve_filtered(query, None).await
    }

    /// Retrieve with an optional payload filter on the dense stage.
    pub async fn retrieve_filtered(
        &self,
        query: &str,
        filter: Option<&PayloadFilter>,
    ) -> Result<RetrievalOutcome> {
        if query.trim().is_empty() {
            return Ok(RetrievalOutcome::default());
        }

        // Stage 1: dense recall
        let query_vectors = self.embedder.embed(&[query.to_string()]).await?;
        let query_vector = match query_vectors.into_iter().next() {
            Some(v) => v,
            None => return Ok(RetrievalOutcome::default()),
        };

        let hits = self
            .store
            .search(&self.collection, &query_vector, self.top_k, filter)
            .await?;

        if hits.is_empty() {
            return Ok(RetrievalOutcome::default());
        }

        let candidates: Vec<RetrievedChunk> = hits
            .into_iter()
            .map(|hit| {
                let content = hit
                    .payload
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                RetrievedChunk {
                    content,
                    score: hit.score,
                    payload: hit.payload,
                }
            })
            .collect();

        // Stage 2: cross-encoder rerank
        let texts: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        match self.reranker.rerank(query, &texts, self.top_n).await {
            Ok(scored) => {
                let chunks = scored
                    .into_iter()
                    .filter_map(|s| {
                        candidates.get(s.index).map(|c| RetrievedChunk {
                            content: c.content.clone(),
                            score: s.score,
                            payload: c.payload.clone(),
                        })
                    })
                    .collect();
                Ok(RetrievalOutcome {
                    chunks,
                    order_only: false,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "Reranker unavailable, keeping dense order");
                let mut chunks = candidates;
                chunks.truncate(self.top_n);
                Ok(RetrievalOutcome {
                    chunks,
                    order_only: true,
                })
            }
        }
    }
}
