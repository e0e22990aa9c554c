//! Embedding trait definition.

use async_trait::async_trait;

/// Capability: map strings to fixed-dimension dense vectors.
///
/// Implementations must be deterministic for a fixed model and return
/// L2-normalized vectors, so cosine similarity equals dot product.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> crate::error::Result<Vec<Vec<f32>>>;

    /// The model-fixed output dimension.
    fn dimension(&self) -> usize;
}
