//! Text preprocessing: Arabic normalization and chunking.

mod chunker;
mod normalizer;
mod structure;

pub use chunker::SentenceChunker;
pub use normalizer::normalize;
pub use structure::{Block, BlockKind, StructureChunker};

use serde::{Deserialize, Serialize};

/// Content classification of a chunk, carried into the store payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Heading,
    Table,
    Code,
    List,
    ImageText,
    ImageDescription,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Heading => "heading",
            ContentType::Table => "table",
            ContentType::Code => "code",
            ContentType::List => "list",
            ContentType::ImageText => "image_text",
            ContentType::ImageDescription => "image_description",
        }
    }
}

/// The atomic unit of retrieval: a slice of a document plus its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text content
    pub content: String,
    /// 0-based position within the document
    pub chunk_index: usize,
    /// Size of the document in chunks
    pub total_chunks: usize,
    /// Content classification
    pub content_type: ContentType,
    /// Governing section header, when produced by the structure chunker
    pub section_header: Option<String>,
}

impl Chunk {
    pub(crate) fn new(content: String, content_type: ContentType) -> Self {
        Self {
            content,
            chunk_index: 0,
            total_chunks: 0,
            content_type,
            section_header: None,
        }
    }
}

/// Assign final positions to an ordered chunk list.
pub(crate) fn finalize_positions(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    let total = chunks.len();
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_index = i;
        chunk.total_chunks = total;
    }
    chunks
}
