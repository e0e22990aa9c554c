//! JSON extractor for crawler exports.
//!
//! Two layouts: a Firecrawl export (`{"pages": [{"text": ...}, ...]}`)
//! where each page becomes its own document, and a generic array of
//! objects with a `text` field. Anything else is a precise extraction
//! error, not a guess.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ExtractionError;
use crate::ingestion::extractors::{
    ExtractOptions, ExtractedDocument, ExtractionOutput, Extractor,
};
use crate::ingestion::FileFormat;
use crate::text::Block;

pub struct JsonExtractor;

const FORMATS: [FileFormat; 1] = [FileFormat::Json];

/// Keys tried, in order, for a page's textual content.
const TEXT_KEYS: [&str; 3] = ["text", "markdown", "content"];

#[async_trait]
impl Extractor for JsonExtractor {
    async fn extract(
        &self,
        content: &[u8],
        _filename: &str,
        _options: &ExtractOptions,
    ) -> crate::error::Result<ExtractionOutput> {
        let value: Value = serde_json::from_slice(content)
            .map_err(|e| ExtractionError::Json(format!("parse: {e}")))?;

        if let Some(pages) = value.get("pages").and_then(Value::as_array) {
            let documents = documents_from_entries(pages, "pages")?;
            return Ok(ExtractionOutput {
                format: "json-firecrawl".to_string(),
                documents,
            });
        }

        if let Some(entries) = value.as_array() {
            let documents = documents_from_entries(entries, "array")?;
            return Ok(ExtractionOutput {
                format: "json-generic".to_string(),
                documents,
            });
        }

        Err(ExtractionError::Json(
            "unrecognized layout: expected a top-level array or a \"pages\" array".to_string(),
        )
        .into())
    }

    fn formats(&self) -> &[FileFormat] {
        &FORMATS
    }

    fn name(&self) -> &str {
        "json"
    }
}

fn documents_from_entries(
    entries: &[Value],
    layout: &str,
) -> crate::error::Result<Vec<ExtractedDocument>> {
    let mut documents = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let text = entry_text(entry).ok_or_else(|| {
            ExtractionError::Json(format!(
                "{layout}[{index}] has no textual field ({})",
                TEXT_KEYS.join("/")
            ))
        })?;

        if text.trim().is_empty() {
            continue;
        }

        let mut document = ExtractedDocument::new(vec![Block::paragraph(text)]);
        document.source_suffix = Some(format!("#{}", index));

        // Carry obvious provenance fields when the crawler provides them
        for key in ["url", "title", "sourceURL"] {
            if let Some(value) = entry.get(key).and_then(Value::as_str) {
                document
                    .format_metadata
                    .insert(key.to_string(), json!(value));
            }
        }
        if let Some(meta) = entry.get("metadata").and_then(Value::as_object) {
            for key in ["url", "title", "sourceURL"] {
                if let Some(value) = meta.get(key).and_then(Value::as_str) {
                    document
                        .format_metadata
                        .entry(key.to_string())
                        .or_insert(json!(value));
                }
            }
        }

        documents.push(document);
    }

    Ok(documents)
}

fn entry_text(entry: &Value) -> Option<String> {
    if let Some(s) = entry.as_str() {
        return Some(s.to_string());
    }
    for key in TEXT_KEYS {
        if let Some(s) = entry.get(key).and_then(Value::as_str) {
            return Some(s.to_string());
        }
    }
    None
}
