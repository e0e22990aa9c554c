//! Plain text extractor with legacy-encoding fallback.
//!
//! Arabic plain text still arrives in Windows-1256 often enough that
//! lossy UTF-8 decoding would silently destroy it. Decode order: BOM-led
//! UTF-16, strict UTF-8, Windows-1256, then UTF-8 with replacement.

use async_trait::async_trait;
use serde_json::json;

use crate::ingestion::extractors::{
    ExtractOptions, ExtractedDocument, ExtractionOutput, Extractor,
};
use crate::ingestion::FileFormat;
use crate::text::Block;

pub struct TextExtractor;

const FORMATS: [FileFormat; 1] = [FileFormat::Text];

#[async_trait]
impl Extractor for TextExtractor {
    async fn extract(
        &self,
        content: &[u8],
        _filename: &str,
        _options: &ExtractOptions,
    ) -> crate::error::Result<ExtractionOutput> {
        let (text, encoding) = decode_text(content);
        let text = text.trim_start_matches('\u{feff}').to_string();

        let mut document = ExtractedDocument::new(vec![Block::paragraph(text)]);
        document
            .format_metadata
            .insert("encoding".to_string(), json!(encoding));

        Ok(ExtractionOutput {
            format: FileFormat::Text.as_str().to_string(),
            documents: vec![document],
        })
    }

    fn formats(&self) -> &[FileFormat] {
        &FORMATS
    }

    fn name(&self) -> &str {
        "text"
    }
}

/// Decode bytes to text, reporting which encoding won.
fn decode_text(content: &[u8]) -> (String, &'static str) {
    // UTF-16 byte-order marks
    if content.starts_with(&[0xFF, 0xFE]) {
        let (decoded, _, _) = encoding_rs::UTF_16LE.decode(content);
        return (decoded.into_owned(), "utf-16le");
    }
    if content.starts_with(&[0xFE, 0xFF]) {
        let (decoded, _, _) = encoding_rs::UTF_16BE.decode(content);
        return (decoded.into_owned(), "utf-16be");
    }

    if let Ok(text) = std::str::from_utf8(content) {
        return (text.to_string(), "utf-8");
    }

    let (decoded, _, had_errors) = encoding_rs::WINDOWS_1256.decode(content);
    if !had_errors {
        return (decoded.into_owned(), "windows-1256");
    }

    (
        String::from_utf8_lossy(content).into_owned(),
        "utf-8-lossy",
    )
}
