//! Error types for the dalil query core.

use thiserror::Error;

/// Main error type for dalil operations.
#[derive(Error, Debug)]
pub enum DalilError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Resource limit exceeded: {0}")]
    ResourceExceeded(String),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Rerank error: {0}")]
    Rerank(#[from] RerankError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DalilError {
    /// Map to the process exit taxonomy used by the procedure surface:
    /// 0 success, 2 validation, 3 not-found, 4 backend-unavailable,
    /// 5 resource-exceeded, 1 unknown.
    pub fn exit_code(&self) -> i32 {
        match self {
            DalilError::Validation(_) => 2,
            DalilError::Extraction(_) => 2,
            DalilError::NotFound(_) => 3,
            DalilError::Embedding(_)
            | DalilError::Rerank(_)
            | DalilError::Generation(_)
            | DalilError::Storage(_) => 4,
            DalilError::ResourceExceeded(_) => 5,
            _ => 1,
        }
    }

    /// Stable machine-readable kind for structured surfacing.
    pub fn kind(&self) -> &'static str {
        match self {
            DalilError::Config(_) => "config",
            DalilError::Validation(_) => "validation",
            DalilError::NotFound(_) => "not_found",
            DalilError::ResourceExceeded(_) => "resource_exceeded",
            DalilError::Extraction(_) => "extraction",
            DalilError::Embedding(_) => "embedding",
            DalilError::Rerank(_) => "rerank",
            DalilError::Generation(_) => "generation",
            DalilError::Storage(_) => "storage",
            DalilError::Io(_) => "io",
            DalilError::Serialization(_) => "serialization",
        }
    }
}

/// Configuration-related errors. Raised at startup, never per-request.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown generator backend: {0}")]
    UnknownBackend(String),
}

/// Extraction errors (per-file; do not poison a batch).
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),

    #[error("HTML extraction failed: {0}")]
    Html(String),

    #[error("JSON extraction failed: {0}")]
    Json(String),

    #[error("Image decoding failed: {0}")]
    Image(String),

    #[error("Vision model failed: {0}")]
    Vision(String),

    #[error("Text decoding failed: {0}")]
    Encoding(String),
}

/// Embedding backend errors. `Unreachable` and `RateLimited` are the
/// transient kinds worth retrying; `Api` failures are permanent.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Reranker backend errors. `Unreachable` failures are retried within
/// the call; once retries are exhausted the retrieval engine falls back
/// to dense order, so these only surface when the fallback itself is
/// unusable.
#[derive(Error, Debug)]
pub enum RerankError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Score count mismatch: {candidates} candidates, {scores} scores")]
    ScoreMismatch { candidates: usize, scores: usize },
}

/// Generator backend errors.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Empty completion returned")]
    EmptyCompletion,
}

/// Vector store errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Dimension mismatch: collection {collection} expects {expected}, got {got}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        got: usize,
    },
}

/// Result type alias for dalil operations.
pub type Result<T> = std::result::Result<T, DalilError>;
