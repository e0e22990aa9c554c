//! The procedure surface of the core.
//!
//! [`DalilService`] owns the assembled pipeline, ingestion frontend, and
//! conversation memory, and exposes the named operations a presentation
//! layer (HTTP, CLI, tests) calls. It is constructed from a [`Config`]
//! plus explicit capability handles; tests assemble it with fakes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::embedding::{ApiEmbedder, Embedder};
use crate::error::{DalilError, Result, StorageError};
use crate::generation::{build_generator, Generator};
use crate::ingestion::{
    ExtractOptions, FileReport, ImageMode, IngestionFrontend, VisionApiClient, VisionModel,
};
use crate::memory::{ConversationMemory, StoredMessage};
use crate::pipeline::{IngestOutcome, QueryResult, RagPipeline};
use crate::rerank::{ApiReranker, Reranker};
use crate::storage::{CollectionInfo, QdrantStore, VectorStore};

/// Result of a batch file ingest, with per-file outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
    pub documents: usize,
    pub chunks: usize,
    pub time_ms: u64,
}

/// One file handed to `ingest_batch`.
pub struct FileUpload {
    pub content: Vec<u8>,
    pub filename: String,
    pub declared_mime: Option<String>,
    pub custom_metadata: Option<Map<String, Value>>,
}

/// Result of a single-file ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileIngestResult {
    pub documents: usize,
    pub chunks: usize,
    pub time_ms: u64,
    pub detected_format: String,
    pub file_hash: String,
    /// True when dedup-on-hash skipped the content
    pub duplicate: bool,
}

/// The assembled query core.
pub struct DalilService {
    pipeline: RagPipeline,
    frontend: IngestionFrontend,
    memory: Arc<ConversationMemory>,
    store: Arc<dyn VectorStore>,
    embedding_dimension: usize,
}

impl DalilService {
    /// Assemble the service from explicit capability handles. Collections
    /// are created here; dimension or backend misconfiguration fails
    /// startup, not the first request.
    pub async fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        generator: Arc<dyn Generator>,
        vision: Arc<dyn VisionModel>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        config.validate()?;

        store
            .ensure_collection(
                &config.retrieval.documents_collection,
                config.embedding.dimension,
            )
            .await?;

        let memory = Arc::new(ConversationMemory::new(
            store.clone(),
            &config.memory,
            config.embedding.dimension,
        ));
        memory.ensure_ready().await?;

        let default_image_mode =
            ImageMode::parse(&config.vision.default_mode).unwrap_or(ImageMode::Auto);
        let frontend =
            IngestionFrontend::new(config.ingestion.clone(), vision, default_image_mode);

        let embedding_dimension = config.embedding.dimension;
        let pipeline = RagPipeline::new(
            &config,
            embedder,
            reranker,
            generator,
            store.clone(),
            memory.clone(),
        );

        Ok(Self {
            pipeline,
            frontend,
            memory,
            store,
            embedding_dimension,
        })
    }

    /// Assemble the service against the production backends named in the
    /// configuration: Qdrant, the HTTP embedding and rerank services,
    /// and the configured generator.
    pub async fn connect(config: Config) -> Result<Self> {
        let embedder = Arc::new(ApiEmbedder::from_config(&config.embedding)?);
        let reranker = Arc::new(ApiReranker::from_config(&config.reranker)?);
        let generator = build_generator(&config.generator).await?;
        let vision = Arc::new(VisionApiClient::from_config(&config.vision)?);
        let store = Arc::new(QdrantStore::connect(&config.qdrant)?);

        Self::new(config, embedder, reranker, generator, vision, store).await
    }

    /// Answer a query within a session.
    pub async fn query(&self, text: &str, session_id: &str, use_rag: bool) -> Result<QueryResult> {
        self.pipeline.query(text, session_id, use_rag).await
    }

    /// Ingest raw texts with optional per-text metadata.
    pub async fn ingest_texts(
        &self,
        texts: &[String],
        metadatas: &[Map<String, Value>],
        document_type: Option<&str>,
    ) -> Result<IngestOutcome> {
        self.pipeline
            .ingest_texts(texts, metadatas, document_type)
            .await
    }

    /// Ingest one uploaded file: detect, extract, chunk, embed, store.
    pub async fn ingest_file(
        &self,
        content: &[u8],
        filename: &str,
        declared_mime: Option<&str>,
        custom_metadata: Option<Map<String, Value>>,
        image_mode: Option<ImageMode>,
    ) -> Result<FileIngestResult> {
        let collection = self.documents_collection();
        let options = ExtractOptions { image_mode };

        let prepared = self
            .frontend
            .prepare(content, filename, declared_mime, &options, &collection)
            .await?;

        if prepared.duplicate {
            return Ok(FileIngestResult {
                documents: 1,
                chunks: 0,
                time_ms: 0,
                detected_format: prepared.format,
                file_hash: prepared.file_hash,
                duplicate: true,
            });
        }

        let custom = custom_metadata.unwrap_or_default();
        let outcome = self
            .pipeline
            .ingest_prepared(
                prepared.documents,
                &prepared.format,
                Some(&prepared.file_hash),
                &custom,
            )
            .await?;

        Ok(FileIngestResult {
            documents: outcome.documents,
            chunks: outcome.chunks,
            time_ms: outcome.time_ms,
            detected_format: prepared.format,
            file_hash: prepared.file_hash,
            duplicate: false,
        })
    }

    /// Ingest a batch of files. Extraction failures are per-file and do
    /// not poison the batch; an embedding or store failure rolls back
    /// every point this batch minted and surfaces as the batch error.
    pub async fn ingest_batch(&self, files: Vec<FileUpload>) -> Result<BatchReport> {
        let started = Instant::now();

        let total: u64 = files.iter().map(|f| f.content.len() as u64).sum();
        self.frontend.check_batch_size(total)?;

        let collection = self.documents_collection();
        let mut reports = Vec::with_capacity(files.len());
        let mut documents = 0usize;
        let mut chunks = 0usize;
        let mut minted: Vec<String> = Vec::new();

        for file in files {
            let options = ExtractOptions::default();
            let prepared = match self
                .frontend
                .prepare(
                    &file.content,
                    &file.filename,
                    file.declared_mime.as_deref(),
                    &options,
                    &collection,
                )
                .await
            {
                Ok(prepared) => prepared,
                Err(err @ (DalilError::Extraction(_) | DalilError::ResourceExceeded(_))) => {
                    tracing::warn!(filename = %file.filename, error = %err, "File failed in batch");
                    reports.push(FileReport {
                        filename: file.filename,
                        format: None,
                        documents: 0,
                        chunks: 0,
                        error: Some(err.to_string()),
                    });
                    continue;
                }
                Err(err) => {
                    self.rollback(&minted).await;
                    return Err(err);
                }
            };

            if prepared.duplicate {
                reports.push(FileReport {
                    filename: file.filename,
                    format: Some(prepared.format),
                    documents: 1,
                    chunks: 0,
                    error: None,
                });
                continue;
            }

            let custom = file.custom_metadata.unwrap_or_default();
            match self
                .pipeline
                .ingest_prepared(
                    prepared.documents,
                    &prepared.format,
                    Some(&prepared.file_hash),
                    &custom,
                )
                .await
            {
                Ok(outcome) => {
                    documents += outcome.documents;
                    chunks += outcome.chunks;
                    minted.extend(outcome.point_ids);
                    reports.push(FileReport {
                        filename: file.filename,
                        format: Some(prepared.format),
                        documents: outcome.documents,
                        chunks: outcome.chunks,
                        error: None,
                    });
                }
                Err(err) => {
                    // Embedding and store failures abort the batch whole
                    self.rollback(&minted).await;
                    return Err(err);
                }
            }
        }

        Ok(BatchReport {
            files: reports,
            documents,
            chunks,
            time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Session history in chronological order; empty for unknown sessions.
    pub async fn history(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<StoredMessage>> {
        self.memory.history(session_id, limit).await
    }

    /// Delete a session's messages; returns how many were removed.
    pub async fn clear_history(&self, session_id: &str) -> Result<u64> {
        self.memory.clear(session_id).await
    }

    /// Delete expired messages across all sessions per the configured TTL.
    pub async fn sweep_expired(&self) -> Result<u64> {
        self.memory.sweep_expired().await
    }

    /// Drop and recreate the documents collection. The only way chunks
    /// are ever mutated is this wholesale clear.
    pub async fn clear_documents(&self) -> Result<()> {
        let collection = self.documents_collection();
        self.store.drop_collection(&collection).await?;
        self.store
            .ensure_collection(&collection, self.embedding_dimension)
            .await?;
        tracing::info!(collection = %collection, "Cleared documents collection");
        Ok(())
    }

    /// Collection statistics.
    pub async fn collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        self.store.collection_info(collection).await.map_err(|err| {
            match err {
                DalilError::Storage(StorageError::CollectionNotFound(name)) => {
                    DalilError::NotFound(format!("collection {name}"))
                }
                other => other,
            }
        })
    }

    fn documents_collection(&self) -> String {
        // Collection name lives in the pipeline's retrieval config; the
        // store itself is collection-agnostic.
        self.pipeline.documents_collection().to_string()
    }

    async fn rollback(&self, minted: &[String]) {
        if minted.is_empty() {
            return;
        }
        let collection = self.documents_collection();
        if let Err(err) = self.store.delete_by_ids(&collection, minted).await {
            tracing::error!(
                collection = %collection,
                points = minted.len(),
                error = %err,
                "Batch rollback failed; orphaned points remain"
            );
        } else {
            tracing::info!(collection = %collection, points = minted.len(), "Rolled back batch");
        }
    }
}
