//! The RAG pipeline: query and ingestion flows.
//!
//! Query flow: normalize, load history, route, dispatch to a handler,
//! then write both turns to memory. The five steps run in strict order
//! within one call; the memory write is best-effort and never changes
//! the answer already produced. Queries for different sessions are fully
//! independent; the pipeline deliberately does not serialize queries
//! within one session — callers needing strict turn order serialize at
//! the presentation layer.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{DalilError, Result};
use crate::generation::{prompts, Generator};
use crate::ingestion::PreparedDocument;
use crate::memory::{ConversationMemory, MessageRole};
use crate::rerank::Reranker;
use crate::retrieval::{RetrievalEngine, RetrievedChunk};
use crate::router::{evaluate, format_result, QueryRoute, QueryRouter};
use crate::storage::{Point, VectorStore};
use crate::text::{normalize, Chunk, SentenceChunker, StructureChunker};

/// One retrieval-backed source attached to an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub content: String,
    pub score: f32,
    pub metadata: Map<String, Value>,
}

/// The return of a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    /// Ordered sources for retrieval-backed answers; empty otherwise
    pub sources: Vec<Source>,
    pub query_type: QueryRoute,
    pub session_id: String,
    pub processing_time_ms: u64,
    /// True when the reranker was down and sources keep the dense order
    #[serde(default)]
    pub order_only: bool,
}

/// The return of an ingestion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub documents: usize,
    pub chunks: usize,
    pub time_ms: u64,
    /// Point ids minted by this call, for batch rollback
    #[serde(skip)]
    pub point_ids: Vec<String>,
}

/// The assembled query/ingestion core.
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    store: Arc<dyn VectorStore>,
    memory: Arc<ConversationMemory>,
    retrieval: RetrievalEngine,
    router: QueryRouter,
    sentence_chunker: SentenceChunker,
    structure_chunker: StructureChunker,
    documents_collection: String,
}

impl RagPipeline {
    pub fn new(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        generator: Arc<dyn Generator>,
        store: Arc<dyn VectorStore>,
        memory: Arc<ConversationMemory>,
    ) -> Self {
        let retrieval = RetrievalEngine::new(
            embedder.clone(),
            reranker,
            store.clone(),
            &config.retrieval,
            &config.reranker,
        );

        Self {
            embedder,
            generator,
            store,
            memory,
            retrieval,
            router: QueryRouter::new(&config.router),
            sentence_chunker: SentenceChunker::new(&config.chunking),
            structure_chunker: StructureChunker::new(
                config.chunking.chunk_size,
                config.chunking.chunk_overlap,
            ),
            documents_collection: config.retrieval.documents_collection.clone(),
        }
    }

    /// The collection ingest writes to and retrieval reads from.
    pub fn documents_collection(&self) -> &str {
        &self.documents_collection
    }

    /// Process one query. `use_rag = false` answers rag-routed queries
    /// conversationally without touching retrieval.
    pub async fn query(&self, text: &str, session_id: &str, use_rag: bool) -> Result<QueryResult> {
        let started = Instant::now();

        if session_id.trim().is_empty() {
            return Err(DalilError::Validation("session_id must not be empty".to_string()));
        }

        // 1. Normalize; an empty query never reaches a model.
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Ok(QueryResult {
                answer: prompts::EMPTY_QUERY_REPLY.to_string(),
                sources: Vec::new(),
                query_type: QueryRoute::Simple,
                session_id: session_id.to_string(),
                processing_time_ms: elapsed_ms(started),
                order_only: false,
            });
        }

        // 2. Load conversational context.
        let history = self.memory.history(session_id, None).await?;

        // 3. Route.
        let route = self.router.classify(&normalized);
        tracing::debug!(session_id, route = route.as_str(), "Classified query");

        // The user turn is committed before the handler runs, so a
        // generation failure still leaves the question on record. The
        // original text is stored, not the normalized form. Memory
        // writes are best-effort: failures are logged and never change
        // the outcome of the query.
        if let Err(err) = self.memory.append(session_id, MessageRole::User, text).await {
            tracing::warn!(session_id, error = %err, "Failed to store user turn");
        }

        // 4. Dispatch.
        let (answer, sources, order_only) = match route {
            QueryRoute::Greeting => (prompts::GREETING_REPLY.to_string(), Vec::new(), false),
            QueryRoute::Calculator => {
                let answer = match evaluate(&normalized) {
                    Some(value) => format_result(value),
                    None => prompts::CALCULATION_FAILED_REPLY.to_string(),
                };
                (answer, Vec::new(), false)
            }
            QueryRoute::Simple => {
                let messages = prompts::build_simple_messages(&history, &normalized);
                (self.generator.generate(&messages).await?, Vec::new(), false)
            }
            QueryRoute::Rag if !use_rag => {
                let messages = prompts::build_simple_messages(&history, &normalized);
                (self.generator.generate(&messages).await?, Vec::new(), false)
            }
            QueryRoute::Rag => {
                let outcome = self.retrieval.retrieve(&normalized).await?;
                let context = prompts::format_context(&outcome.chunks);
                let messages = prompts::build_rag_messages(&context, &history, &normalized);
                let answer = self.generator.generate(&messages).await?;
                let sources = outcome.chunks.into_iter().map(chunk_to_source).collect();
                (answer, sources, outcome.order_only)
            }
        };

        // 5. Persist the answer turn.
        if let Err(err) = self
            .memory
            .append(session_id, MessageRole::Assistant, &answer)
            .await
        {
            tracing::warn!(session_id, error = %err, "Failed to store assistant turn");
        }

        Ok(QueryResult {
            answer,
            sources,
            query_type: route,
            session_id: session_id.to_string(),
            processing_time_ms: elapsed_ms(started),
            order_only,
        })
    }

    /// Ingest raw document texts. `document_type` of "pdf" engages the
    /// structure-aware chunker; `None` auto-detects from metadata and
    /// content shape.
    pub async fn ingest_texts(
        &self,
        texts: &[String],
        metadatas: &[Map<String, Value>],
        document_type: Option<&str>,
    ) -> Result<IngestOutcome> {
        let started = Instant::now();

        if texts.is_empty() {
            return Err(DalilError::Validation("texts must not be empty".to_string()));
        }
        if !metadatas.is_empty() && metadatas.len() != texts.len() {
            return Err(DalilError::Validation(format!(
                "metadatas length {} does not match texts length {}",
                metadatas.len(),
                texts.len()
            )));
        }

        let empty = Map::new();
        let mut documents = 0usize;
        let mut batch: Vec<(Chunk, Map<String, Value>)> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let metadata = metadatas.get(i).unwrap_or(&empty);
            let doc_type = document_type
                .map(str::to_string)
                .unwrap_or_else(|| detect_document_type(text, metadata));

            let chunks = if doc_type == "pdf" {
                let blocks = crate::ingestion::extractors::tag_text_blocks(text);
                self.structure_chunker.chunk_blocks(&blocks)
            } else {
                self.sentence_chunker.chunk(text)
            };

            if chunks.is_empty() {
                continue;
            }
            documents += 1;

            let source_name = metadata
                .get("source")
                .or_else(|| metadata.get("source_name"))
                .and_then(Value::as_str)
                .unwrap_or("inline-text")
                .to_string();

            let timestamp = chrono::Utc::now().to_rfc3339();
            for chunk in chunks {
                let payload = chunk_payload(
                    &chunk,
                    &source_name,
                    &doc_type,
                    &timestamp,
                    None,
                    &empty,
                    metadata,
                );
                batch.push((chunk, payload));
            }
        }

        let (chunks, point_ids) = self.embed_and_store(batch).await?;

        Ok(IngestOutcome {
            documents,
            chunks,
            time_ms: elapsed_ms(started),
            point_ids,
        })
    }

    /// Ingest extracted documents from the file frontend.
    pub async fn ingest_prepared(
        &self,
        prepared: Vec<PreparedDocument>,
        source_format: &str,
        file_hash: Option<&str>,
        custom_metadata: &Map<String, Value>,
    ) -> Result<IngestOutcome> {
        let started = Instant::now();

        let mut documents = 0usize;
        let mut batch: Vec<(Chunk, Map<String, Value>)> = Vec::new();

        for document in prepared {
            let chunks = self.structure_chunker.chunk_blocks(&document.blocks);
            if chunks.is_empty() {
                continue;
            }
            documents += 1;

            let timestamp = chrono::Utc::now().to_rfc3339();
            for chunk in chunks {
                let payload = chunk_payload(
                    &chunk,
                    &document.source_name,
                    source_format,
                    &timestamp,
                    file_hash,
                    &document.format_metadata,
                    custom_metadata,
                );
                batch.push((chunk, payload));
            }
        }

        let (chunks, point_ids) = self.embed_and_store(batch).await?;

        Ok(IngestOutcome {
            documents,
            chunks,
            time_ms: elapsed_ms(started),
            point_ids,
        })
    }

    /// Embed chunk contents (batched) and upsert vectors with payloads
    /// in one store batch. Any embedding failure fails the whole call;
    /// partial ingestion is never exposed.
    async fn embed_and_store(
        &self,
        batch: Vec<(Chunk, Map<String, Value>)>,
    ) -> Result<(usize, Vec<String>)> {
        if batch.is_empty() {
            return Ok((0, Vec::new()));
        }

        let contents: Vec<String> = batch
            .iter()
            .map(|(chunk, _)| normalize(&chunk.content))
            .collect();

        let vectors = self.embedder.embed(&contents).await?;

        let mut points = Vec::with_capacity(batch.len());
        let mut point_ids = Vec::with_capacity(batch.len());
        for ((_, mut payload), (content, vector)) in batch
            .into_iter()
            .zip(contents.into_iter().zip(vectors.into_iter()))
        {
            payload.insert("content".to_string(), json!(content));
            let id = Uuid::new_v4().to_string();
            point_ids.push(id.clone());
            points.push(Point::new(id, vector, payload));
        }

        let count = points.len();
        self.store.upsert(&self.documents_collection, points).await?;

        tracing::info!(
            collection = %self.documents_collection,
            chunks = count,
            "Ingested chunks"
        );

        Ok((count, point_ids))
    }
}

fn chunk_to_source(chunk: RetrievedChunk) -> Source {
    let mut metadata = chunk.payload;
    metadata.remove("content");
    Source {
        content: chunk.content,
        score: chunk.score,
        metadata,
    }
}

fn chunk_payload(
    chunk: &Chunk,
    source_name: &str,
    source_format: &str,
    timestamp: &str,
    file_hash: Option<&str>,
    format_metadata: &Map<String, Value>,
    custom_metadata: &Map<String, Value>,
) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("source_name".to_string(), json!(source_name));
    payload.insert("source_format".to_string(), json!(source_format));
    payload.insert("chunk_index".to_string(), json!(chunk.chunk_index));
    payload.insert("total_chunks".to_string(), json!(chunk.total_chunks));
    payload.insert(
        "content_type".to_string(),
        json!(chunk.content_type.as_str()),
    );
    payload.insert("ingestion_timestamp".to_string(), json!(timestamp));
    if let Some(header) = &chunk.section_header {
        payload.insert("section_header".to_string(), json!(header));
    }
    if let Some(hash) = file_hash {
        payload.insert("file_hash".to_string(), json!(hash));
    }
    if !format_metadata.is_empty() {
        payload.insert(
            "format_metadata".to_string(),
            Value::Object(format_metadata.clone()),
        );
    }
    for (key, value) in custom_metadata {
        payload.entry(key.clone()).or_insert(value.clone());
    }
    payload
}

/// Auto-detect whether raw text carries PDF-style layout, from metadata
/// hints first and content patterns second.
fn detect_document_type(text: &str, metadata: &Map<String, Value>) -> String {
    let source = metadata
        .get("source")
        .or_else(|| metadata.get("source_name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();
    let declared = metadata
        .get("document_type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();

    if source.ends_with(".pdf") || declared == "pdf" {
        return "pdf".to_string();
    }

    let mut indicators = 0;
    if text.lines().any(|l| {
        let t = l.trim().to_lowercase();
        t.strip_prefix("page ")
            .or_else(|| t.strip_prefix("صفحة "))
            .is_some_and(|rest| rest.trim().chars().all(|c| c.is_ascii_digit()))
    }) {
        indicators += 1;
    }
    if text.lines().any(|l| l.matches('|').count() >= 2) {
        indicators += 1;
    }
    if text.contains("\n\n\n") {
        indicators += 1;
    }

    if indicators >= 2 {
        "pdf".to_string()
    } else {
        "text".to_string()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_document_type_from_metadata() {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!("report.PDF"));
        assert_eq!(detect_document_type("plain", &metadata), "pdf");

        let mut metadata = Map::new();
        metadata.insert("document_type".to_string(), json!("pdf"));
        assert_eq!(detect_document_type("plain", &metadata), "pdf");
    }

    #[test]
    fn test_detect_document_type_from_content() {
        let pdf_like = "العنوان\n\n\nالاسم | العمر | المدينة\nPage 3";
        assert_eq!(detect_document_type(pdf_like, &Map::new()), "pdf");
        assert_eq!(
            detect_document_type("جملة عادية بدون اي تنسيق.", &Map::new()),
            "text"
        );
    }

    #[test]
    fn test_chunk_payload_shape() {
        let mut chunk = Chunk::new("النص".to_string(), crate::text::ContentType::Text);
        chunk.chunk_index = 1;
        chunk.total_chunks = 3;

        let mut custom = Map::new();
        custom.insert("department".to_string(), json!("finance"));
        // Custom metadata must not override reserved keys
        custom.insert("source_name".to_string(), json!("evil-override"));

        let payload = chunk_payload(
            &chunk,
            "doc.txt",
            "text",
            "2026-01-01T00:00:00Z",
            Some("abc123"),
            &Map::new(),
            &custom,
        );

        assert_eq!(payload["source_name"], "doc.txt");
        assert_eq!(payload["chunk_index"], 1);
        assert_eq!(payload["total_chunks"], 3);
        assert_eq!(payload["content_type"], "text");
        assert_eq!(payload["file_hash"], "abc123");
        assert_eq!(payload["department"], "finance");
    }
}
