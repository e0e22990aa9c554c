//! Ingestion frontend: format detection and format-specific extraction.
//!
//! Turns raw uploaded bytes into the typed block stream the pipeline
//! chunks and embeds. Detection never trusts a single signal: declared
//! MIME type first, then magic bytes, then the filename extension, then
//! plain text as the last resort.

pub mod detect;
pub mod extractors;
mod frontend;

pub use detect::detect_format;
pub use extractors::{
    ExtractOptions, ExtractedDocument, ExtractionOutput, Extractor, ImageContentKind, ImageMode,
    VisionApiClient, VisionModel,
};
pub use frontend::{hash_bytes, FileReport, IngestionFrontend, PreparedDocument, PreparedFile};

use serde::{Deserialize, Serialize};

/// Detected file format. JSON is refined into firecrawl/generic by the
/// JSON extractor once the layout is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Pdf,
    Html,
    Markdown,
    Docx,
    Text,
    Image,
    Json,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Pdf => "pdf",
            FileFormat::Html => "html",
            FileFormat::Markdown => "markdown",
            FileFormat::Docx => "docx",
            FileFormat::Text => "text",
            FileFormat::Image => "image",
            FileFormat::Json => "json",
        }
    }
}
