//! Ingestion dispatch: size limits, format detection, extractor
//! selection, and file-hash deduplication.

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::IngestionConfig;
use crate::error::{DalilError, ExtractionError, Result};
use crate::ingestion::extractors::{
    DocxExtractor, ExtractOptions, Extractor, HtmlExtractor, ImageExtractor, ImageMode,
    JsonExtractor, MarkdownExtractor, PdfExtractor, TextExtractor, VisionModel,
};
use crate::ingestion::{detect_format, FileFormat};
use crate::text::Block;

/// One logical document ready for chunking.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    /// Source name for chunk payloads: the filename, suffixed for
    /// multi-document sources ("export.json#2")
    pub source_name: String,
    pub blocks: Vec<Block>,
    pub format_metadata: Map<String, Value>,
}

/// The outcome of preparing one uploaded file.
#[derive(Debug, Clone)]
pub struct PreparedFile {
    /// Refined source format ("pdf", "json-firecrawl", ...)
    pub format: String,
    /// SHA-256 of the raw bytes
    pub file_hash: String,
    /// True when dedup-on-hash is enabled and this hash was seen before;
    /// `documents` is empty in that case.
    pub duplicate: bool,
    pub documents: Vec<PreparedDocument>,
}

/// Per-file outcome inside a batch report.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub filename: String,
    pub format: Option<String>,
    pub documents: usize,
    pub chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Format detection plus format-specific extraction dispatch.
pub struct IngestionFrontend {
    extractors: Vec<Arc<dyn Extractor>>,
    config: IngestionConfig,
    /// Hashes already ingested, keyed `collection:hash` (or bare hash
    /// when dedup is global).
    seen_hashes: RwLock<HashSet<String>>,
}

impl IngestionFrontend {
    pub fn new(
        config: IngestionConfig,
        vision: Arc<dyn VisionModel>,
        default_image_mode: ImageMode,
    ) -> Self {
        let extractors: Vec<Arc<dyn Extractor>> = vec![
            Arc::new(TextExtractor),
            Arc::new(PdfExtractor),
            Arc::new(HtmlExtractor),
            Arc::new(MarkdownExtractor),
            Arc::new(DocxExtractor),
            Arc::new(JsonExtractor),
            Arc::new(ImageExtractor::new(vision, default_image_mode)),
        ];

        Self {
            extractors,
            config,
            seen_hashes: RwLock::new(HashSet::new()),
        }
    }

    /// Validate, detect, and extract a single uploaded file into
    /// prepared documents. Fails with a precise stage-naming error;
    /// callers decide whether that poisons a batch (it should not).
    pub async fn prepare(
        &self,
        content: &[u8],
        filename: &str,
        declared_mime: Option<&str>,
        options: &ExtractOptions,
        collection: &str,
    ) -> Result<PreparedFile> {
        if content.len() as u64 > self.config.max_file_size_bytes {
            return Err(DalilError::ResourceExceeded(format!(
                "file {} is {} bytes, limit is {}",
                filename,
                content.len(),
                self.config.max_file_size_bytes
            )));
        }

        let file_hash = hash_bytes(content);
        let dedup_key = if self.config.dedup_global {
            file_hash.clone()
        } else {
            format!("{collection}:{file_hash}")
        };

        if self.seen_hashes.read().contains(&dedup_key) {
            if self.config.dedup_enabled {
                tracing::info!(filename, hash = %file_hash, "Duplicate file skipped");
                return Ok(PreparedFile {
                    format: detect_format(declared_mime, content, filename)
                        .as_str()
                        .to_string(),
                    file_hash,
                    duplicate: true,
                    documents: Vec::new(),
                });
            }
            tracing::warn!(filename, hash = %file_hash, "File hash seen before, ingesting anyway");
        }

        let format = detect_format(declared_mime, content, filename);
        let extractor = self
            .extractor_for(format)
            .ok_or_else(|| ExtractionError::UnsupportedFormat(format.as_str().to_string()))?;

        tracing::debug!(
            filename,
            format = format.as_str(),
            extractor = extractor.name(),
            size = content.len(),
            "Extracting file"
        );

        let output = extractor.extract(content, filename, options).await?;

        let documents = output
            .documents
            .into_iter()
            .map(|doc| {
                let source_name = match &doc.source_suffix {
                    Some(suffix) => format!("{filename}{suffix}"),
                    None => filename.to_string(),
                };
                PreparedDocument {
                    source_name,
                    blocks: doc.blocks,
                    format_metadata: doc.format_metadata,
                }
            })
            .collect();

        self.seen_hashes.write().insert(dedup_key);

        Ok(PreparedFile {
            format: output.format,
            file_hash,
            duplicate: false,
            documents,
        })
    }

    /// Enforce the aggregate size limit before a batch starts.
    pub fn check_batch_size(&self, total_bytes: u64) -> Result<()> {
        if total_bytes > self.config.max_batch_size_bytes {
            return Err(DalilError::ResourceExceeded(format!(
                "batch is {} bytes, limit is {}",
                total_bytes, self.config.max_batch_size_bytes
            )));
        }
        Ok(())
    }

    fn extractor_for(&self, format: FileFormat) -> Option<Arc<dyn Extractor>> {
        self.extractors
            .iter()
            .find(|e| e.formats().contains(&format))
            .cloned()
    }
}

/// SHA-256 hex digest of raw file bytes.
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::extractors::ImageContentKind;
    use async_trait::async_trait;

    struct NoVision;

    #[async_trait]
    impl VisionModel for NoVision {
        async fn extract_text(&self, _: &[u8], _: &str) -> Result<String> {
            Err(ExtractionError::Vision("no vision model in tests".into()).into())
        }
        async fn describe(&self, _: &[u8], _: &str) -> Result<String> {
            Err(ExtractionError::Vision("no vision model in tests".into()).into())
        }
        async fn classify(&self, _: &[u8], _: &str) -> Result<ImageContentKind> {
            Err(ExtractionError::Vision("no vision model in tests".into()).into())
        }
    }

    fn frontend(config: IngestionConfig) -> IngestionFrontend {
        IngestionFrontend::new(config, Arc::new(NoVision), ImageMode::Auto)
    }

    #[tokio::test]
    async fn test_plain_text_roundtrip() {
        let frontend = frontend(IngestionConfig::default());
        let prepared = frontend
            .prepare(
                "القاهرة عاصمة مصر.".as_bytes(),
                "doc.txt",
                Some("text/plain"),
                &ExtractOptions::default(),
                "docs",
            )
            .await
            .unwrap();

        assert_eq!(prepared.format, "text");
        assert!(!prepared.duplicate);
        assert_eq!(prepared.documents.len(), 1);
        assert_eq!(prepared.documents[0].source_name, "doc.txt");
        assert_eq!(prepared.file_hash.len(), 64);
    }

    #[tokio::test]
    async fn test_file_at_limit_passes_over_limit_fails() {
        let config = IngestionConfig {
            max_file_size_bytes: 8,
            ..IngestionConfig::default()
        };
        let frontend = frontend(config);

        let ok = frontend
            .prepare(b"12345678", "ok.txt", None, &ExtractOptions::default(), "docs")
            .await;
        assert!(ok.is_ok());

        let too_big = frontend
            .prepare(b"123456789", "big.txt", None, &ExtractOptions::default(), "docs")
            .await;
        match too_big {
            Err(DalilError::ResourceExceeded(_)) => {}
            other => panic!("expected ResourceExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dedup_warn_and_continue_by_default() {
        let frontend = frontend(IngestionConfig::default());
        let bytes = "same content".as_bytes();

        let first = frontend
            .prepare(bytes, "a.txt", None, &ExtractOptions::default(), "docs")
            .await
            .unwrap();
        let second = frontend
            .prepare(bytes, "b.txt", None, &ExtractOptions::default(), "docs")
            .await
            .unwrap();

        assert!(!first.duplicate);
        assert!(!second.duplicate);
        assert_eq!(second.documents.len(), 1);
    }

    #[tokio::test]
    async fn test_dedup_enabled_skips_second_ingest() {
        let config = IngestionConfig {
            dedup_enabled: true,
            ..IngestionConfig::default()
        };
        let frontend = frontend(config);
        let bytes = "same content".as_bytes();

        let first = frontend
            .prepare(bytes, "a.txt", None, &ExtractOptions::default(), "docs")
            .await
            .unwrap();
        let second = frontend
            .prepare(bytes, "a.txt", None, &ExtractOptions::default(), "docs")
            .await
            .unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert!(second.documents.is_empty());
    }

    #[tokio::test]
    async fn test_dedup_scope_per_collection() {
        let config = IngestionConfig {
            dedup_enabled: true,
            ..IngestionConfig::default()
        };
        let frontend = frontend(config);
        let bytes = "same content".as_bytes();

        frontend
            .prepare(bytes, "a.txt", None, &ExtractOptions::default(), "docs")
            .await
            .unwrap();
        // Same bytes, different collection: not a duplicate
        let other = frontend
            .prepare(bytes, "a.txt", None, &ExtractOptions::default(), "other")
            .await
            .unwrap();
        assert!(!other.duplicate);
    }

    #[tokio::test]
    async fn test_json_multi_document_source_names() {
        let frontend = frontend(IngestionConfig::default());
        let prepared = frontend
            .prepare(
                br#"[{"text": "one"}, {"text": "two"}]"#,
                "export.json",
                None,
                &ExtractOptions::default(),
                "docs",
            )
            .await
            .unwrap();

        assert_eq!(prepared.format, "json-generic");
        assert_eq!(prepared.documents[0].source_name, "export.json#0");
        assert_eq!(prepared.documents[1].source_name, "export.json#1");
    }

    #[tokio::test]
    async fn test_corrupt_file_precise_error() {
        let frontend = frontend(IngestionConfig::default());
        let result = frontend
            .prepare(
                b"%PDF-1.7 but actually garbage",
                "broken.pdf",
                None,
                &ExtractOptions::default(),
                "docs",
            )
            .await;
        match result {
            Err(DalilError::Extraction(ExtractionError::Pdf(_))) => {}
            other => panic!("expected a PDF extraction error, got {other:?}"),
        }
    }

    #[test]
    fn test_batch_size_check() {
        let config = IngestionConfig {
            max_batch_size_bytes: 100,
            ..IngestionConfig::default()
        };
        let frontend = frontend(config);
        assert!(frontend.check_batch_size(100).is_ok());
        assert!(frontend.check_batch_size(101).is_err());
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_ne!(hash_bytes(b"abc"), hash_bytes(b"abd"));
    }
}
