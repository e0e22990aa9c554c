//! Shared fixtures: counting capability fakes assembled around the
//! in-memory store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dalil::error::{ExtractionError, Result};
use dalil::ingestion::ImageContentKind;
use dalil::rerank::{order_scores, ScoredIndex};
use dalil::{
    ChatMessage, Config, DalilService, Embedder, Generator, MemoryStore, Reranker, VisionModel,
};

pub const DIM: usize = 16;

/// Deterministic bag-of-words embedder: queries and documents sharing
/// tokens land near each other. Counts calls.
pub struct CountingEmbedder {
    pub calls: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| toy_embedding(t)).collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

fn toy_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIM];
    for token in text.split_whitespace() {
        let mut h: usize = 5381;
        for b in token.bytes() {
            h = h.wrapping_mul(33) ^ b as usize;
        }
        vector[h % DIM] += 1.0;
    }
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
    vector
}

/// Reranker scoring candidates by query-token overlap. Counts calls.
pub struct CountingReranker {
    pub calls: AtomicUsize,
}

impl CountingReranker {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Reranker for CountingReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[String],
        top_n: usize,
    ) -> Result<Vec<ScoredIndex>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query_tokens: Vec<&str> = query.split_whitespace().collect();
        let scored = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| ScoredIndex {
                index,
                score: query_tokens
                    .iter()
                    .filter(|t| candidate.contains(**t))
                    .count() as f32,
            })
            .collect();
        Ok(order_scores(scored, top_n))
    }
}

/// Generator echoing whatever context it saw; records every call.
pub struct CountingGenerator {
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl CountingGenerator {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn last_request(&self) -> Vec<ChatMessage> {
        self.requests.lock().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Generator for CountingGenerator {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(messages.to_vec());

        // Echo the grounded fact if the context carries it, so tests can
        // assert answers are drawn from retrieval.
        let system = messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if system.contains("القاهره") {
            Ok("عاصمه مصر هي القاهره.".to_string())
        } else if system.contains("لا توجد مستندات") {
            Ok("لا توجد معلومات متاحه للاجابه علي هذا السؤال.".to_string())
        } else {
            Ok("تمام، كيف يمكنني المساعده؟".to_string())
        }
    }
}

/// Vision fake; integration scenarios never reach it.
pub struct NoVision;

#[async_trait]
impl VisionModel for NoVision {
    async fn extract_text(&self, _: &[u8], _: &str) -> Result<String> {
        Err(ExtractionError::Vision("unused in tests".into()).into())
    }
    async fn describe(&self, _: &[u8], _: &str) -> Result<String> {
        Err(ExtractionError::Vision("unused in tests".into()).into())
    }
    async fn classify(&self, _: &[u8], _: &str) -> Result<ImageContentKind> {
        Err(ExtractionError::Vision("unused in tests".into()).into())
    }
}

/// A fully assembled service over fakes plus handles to the counters.
pub struct Harness {
    pub service: DalilService,
    pub embedder: Arc<CountingEmbedder>,
    pub reranker: Arc<CountingReranker>,
    pub generator: Arc<CountingGenerator>,
}

pub async fn harness() -> Harness {
    harness_with(Config::default()).await
}

pub async fn harness_with(mut config: Config) -> Harness {
    config.embedding.dimension = DIM;

    let embedder = Arc::new(CountingEmbedder::new());
    let reranker = Arc::new(CountingReranker::new());
    let generator = Arc::new(CountingGenerator::new());
    let store = Arc::new(MemoryStore::new());

    let service = DalilService::new(
        config,
        embedder.clone(),
        reranker.clone(),
        generator.clone(),
        Arc::new(NoVision),
        store,
    )
    .await
    .expect("service assembles over fakes");

    Harness {
        service,
        embedder,
        reranker,
        generator,
    }
}

/// Counter snapshot (embed, rerank, generate).
pub fn model_calls(h: &Harness) -> (usize, usize, usize) {
    (
        h.embedder.calls.load(Ordering::SeqCst),
        h.reranker.calls.load(Ordering::SeqCst),
        h.generator.calls.load(Ordering::SeqCst),
    )
}
