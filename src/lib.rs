//! Dalil: Arabic-first retrieval-augmented query core.
//!
//! Ingests heterogeneous documents into a Qdrant collection as
//! normalized, chunked, embedded points; answers questions over them
//! with two-stage retrieval (dense recall, then cross-encoder rerank);
//! routes greetings, pleasantries, and arithmetic around the expensive
//! path entirely; and keeps per-session conversation history in the same
//! store.

pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod memory;
pub mod pipeline;
pub mod rerank;
pub mod retrieval;
pub mod retry;
pub mod router;
pub mod service;
pub mod storage;
pub mod text;

pub use config::Config;
pub use embedding::{ApiEmbedder, Embedder};
pub use error::{DalilError, Result};
pub use generation::{build_generator, ChatMessage, GeminiGenerator, Generator, OpenAiGenerator, Role};
pub use ingestion::{
    detect_format, FileFormat, ImageMode, IngestionFrontend, VisionApiClient, VisionModel,
};
pub use memory::{ConversationMemory, MessageRole, StoredMessage};
pub use pipeline::{IngestOutcome, QueryResult, RagPipeline, Source};
pub use rerank::{ApiReranker, Reranker, ScoredIndex};
pub use retrieval::{RetrievalEngine, RetrievalOutcome, RetrievedChunk};
pub use router::{QueryRoute, QueryRouter};
pub use service::{BatchReport, DalilService, FileIngestResult, FileUpload};
pub use storage::{
    CollectionInfo, MemoryStore, PayloadFilter, Point, QdrantStore, ScoredPoint, StoredPoint,
    VectorStore,
};
pub use text::{normalize, Block, BlockKind, Chunk, ContentType, SentenceChunker, StructureChunker};
