//! Format-specific extractors.
//!
//! Every extractor turns raw bytes into one or more logical documents of
//! typed blocks; the pipeline chunks each document separately. A failed
//! extraction names the stage precisely and fails only its own file.

mod docx;
mod html;
mod image;
mod json;
mod markdown;
mod pdf;
mod text;

pub use docx::DocxExtractor;
pub use html::HtmlExtractor;
pub use image::{ImageContentKind, ImageExtractor, ImageMode, VisionApiClient, VisionModel};
pub use json::JsonExtractor;
pub use markdown::MarkdownExtractor;
pub use pdf::PdfExtractor;
pub(crate) use pdf::tag_text_blocks;
pub use text::TextExtractor;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::ingestion::FileFormat;
use crate::text::Block;

/// One logical document produced by extraction. Most formats yield a
/// single document; JSON uploads can yield one per page or array element.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub blocks: Vec<Block>,
    /// Format-specific metadata carried onto every chunk of the document
    pub format_metadata: Map<String, Value>,
    /// Disambiguating suffix for multi-document sources ("#page-2")
    pub source_suffix: Option<String>,
}

impl ExtractedDocument {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            format_metadata: Map::new(),
            source_suffix: None,
        }
    }
}

/// Result of extracting one uploaded file.
#[derive(Debug, Clone)]
pub struct ExtractionOutput {
    /// Refined source format string ("pdf", "json-firecrawl", ...)
    pub format: String,
    pub documents: Vec<ExtractedDocument>,
}

/// Per-call extraction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Image handling mode; `None` uses the configured default.
    pub image_mode: Option<ImageMode>,
}

/// Trait for format-specific extractors.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract logical documents from raw bytes.
    async fn extract(
        &self,
        content: &[u8],
        filename: &str,
        options: &ExtractOptions,
    ) -> crate::error::Result<ExtractionOutput>;

    /// Formats this extractor handles.
    fn formats(&self) -> &[FileFormat];

    /// Extractor name for logging.
    fn name(&self) -> &str;
}
