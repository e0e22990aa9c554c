//! Configuration settings for the dalil query core.
//!
//! The whole tree is immutable after startup; the service validates it once
//! at construction and misconfiguration is a startup failure, not a
//! per-request one.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub qdrant: QdrantConfig,
    pub embedding: EmbeddingConfig,
    pub reranker: RerankerConfig,
    pub generator: GeneratorConfig,
    pub vision: VisionConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub memory: MemoryConfig,
    pub router: RouterConfig,
    pub ingestion: IngestionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant: QdrantConfig::default(),
            embedding: EmbeddingConfig::default(),
            reranker: RerankerConfig::default(),
            generator: GeneratorConfig::default(),
            vision: VisionConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            memory: MemoryConfig::default(),
            router: RouterConfig::default(),
            ingestion: IngestionConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadFile)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations or use defaults.
    pub fn load() -> Result<Self> {
        let config_paths = [
            PathBuf::from("dalil.toml"),
            PathBuf::from("config.toml"),
            dirs::config_dir()
                .map(|p| p.join("dalil/config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. Fatal errors surface here, at startup.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Invalid("embedding.dimension must be > 0".to_string()).into());
        }
        if self.embedding.base_url.is_empty() {
            return Err(ConfigError::MissingField("embedding.base_url".to_string()).into());
        }
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunking.chunk_size must be > 0".to_string()).into());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::Invalid(
                "chunking.chunk_overlap must be smaller than chunk_size".to_string(),
            )
            .into());
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("retrieval.top_k must be > 0".to_string()).into());
        }
        if self.reranker.top_n > self.retrieval.top_k {
            return Err(ConfigError::Invalid(
                "reranker.top_n cannot exceed retrieval.top_k".to_string(),
            )
            .into());
        }
        if self.memory.collection == self.retrieval.documents_collection {
            return Err(ConfigError::Invalid(
                "memory.collection must differ from the documents collection".to_string(),
            )
            .into());
        }
        match self.generator.backend {
            GeneratorBackend::Gemini
                if self.generator.api_key.is_none()
                    && std::env::var("GEMINI_API_KEY").is_err() =>
            {
                Err(ConfigError::MissingField("generator.api_key".to_string()).into())
            }
            _ => Ok(()),
        }
    }
}

/// Qdrant connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    /// Qdrant server URL (gRPC port)
    pub url: String,
    /// API key (optional)
    pub api_key: Option<String>,
    /// Per-operation timeout in seconds
    pub timeout_secs: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            timeout_secs: 5,
        }
    }
}

/// Embedding service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible embedding endpoint
    pub base_url: String,
    /// Model name
    pub model: String,
    /// API key (falls back to EMBEDDING_API_KEY env var)
    pub api_key: Option<String>,
    /// Vector dimension; must match the model
    pub dimension: usize,
    /// Texts per request
    pub batch_size: usize,
    /// Concurrent in-flight batches during ingestion
    pub parallel_batches: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081/v1".to_string(),
            model: "BAAI/bge-m3".to_string(),
            api_key: None,
            dimension: 1024,
            batch_size: 32,
            parallel_batches: 4,
            timeout_secs: 10,
        }
    }
}

/// Cross-encoder reranker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    /// Rerank endpoint URL
    pub base_url: String,
    /// Model name
    pub model: String,
    /// API key (optional)
    pub api_key: Option<String>,
    /// Candidates kept after reranking
    pub top_n: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8082".to_string(),
            model: "Omartificial-Intelligence-Space/ARA-Reranker-V1".to_string(),
            api_key: None,
            top_n: 5,
            timeout_secs: 10,
        }
    }
}

/// Generator backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBackend {
    /// Hosted OpenAI-compatible chat completions API
    OpenAi,
    /// Google Gemini generateContent API
    Gemini,
    /// OpenRouter (OpenAI-compatible, different base URL)
    OpenRouter,
    /// Local vLLM server (OpenAI-compatible, health-checked at startup)
    Vllm,
}

/// Text generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub backend: GeneratorBackend,
    /// Base URL for OpenAI-compatible backends
    pub base_url: String,
    /// Model name
    pub model: String,
    /// API key (falls back to GENERATOR_API_KEY env var)
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Approximate context budget in characters; oldest non-system
    /// messages are dropped first when exceeded
    pub context_window_chars: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retry attempts for transient failures
    pub max_retries: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::OpenRouter,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "google/gemini-2.5-flash".to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 1024,
            context_window_chars: 24_000,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

/// Vision-LLM configuration used by the image extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// OpenAI-compatible chat endpoint of a vision-capable model
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Default extraction mode: "text", "description", or "auto"
    pub default_mode: String,
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            model: "llava-1.5-7b-hf".to_string(),
            api_key: None,
            default_mode: "auto".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters. Arabic text is dense; 350 beats
    /// the common 512 default on retrieval accuracy.
    pub chunk_size: usize,
    /// Overlap carried from the tail of one chunk to the next
    pub chunk_overlap: usize,
    /// Chunks shorter than this are merged or dropped
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 350,
            chunk_overlap: 100,
            min_chunk_size: 50,
        }
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Documents collection name
    pub documents_collection: String,
    /// Candidates requested from dense search
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            documents_collection: "arabic_documents".to_string(),
            top_k: 15,
        }
    }
}

/// Conversation memory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Collection name for message history
    pub collection: String,
    /// Messages loaded from memory per query
    pub max_history: usize,
    /// Messages older than this are sweep-eligible
    pub ttl_hours: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            collection: "conversation_memory".to_string(),
            max_history: 10,
            ttl_hours: 24,
        }
    }
}

/// Query router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Queries at or above this many whitespace tokens never classify
    /// as simple
    pub simple_max_tokens: usize,
    /// Arithmetic expressions longer than this route to rag instead of
    /// the calculator
    pub calculator_max_len: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            simple_max_tokens: 8,
            calculator_max_len: 64,
        }
    }
}

/// Ingestion frontend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Single-file upload limit in bytes
    pub max_file_size_bytes: u64,
    /// Aggregate batch limit in bytes
    pub max_batch_size_bytes: u64,
    /// When true, a re-ingested file hash is skipped instead of warned about
    pub dedup_enabled: bool,
    /// When true, the dedup cache ignores the target collection
    pub dedup_global: bool,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 26_214_400,
            max_batch_size_bytes: 52_428_800,
            dedup_enabled: false,
            dedup_global: false,
        }
    }
}
