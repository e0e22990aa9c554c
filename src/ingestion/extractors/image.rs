//! Image extractor backed by a vision-capable LLM.
//!
//! Three modes: extract the printed text (OCR-like), describe pictorial
//! content for searchability, or auto — a cheap pre-classification call
//! decides which of the two fits the image. Multi-page TIFFs yield one
//! block per page.

use async_trait::async_trait;
use base64::Engine;
use image::GenericImageView;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::VisionConfig;
use crate::error::{ExtractionError, Result};
use crate::ingestion::extractors::{
    ExtractOptions, ExtractedDocument, ExtractionOutput, Extractor,
};
use crate::ingestion::FileFormat;
use crate::text::{Block, BlockKind};

/// Image handling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageMode {
    /// Extract printed text
    Text,
    /// Generate a searchable description
    Description,
    /// Pre-classify, then pick one of the above
    Auto,
}

impl ImageMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ImageMode::Text),
            "description" => Some(ImageMode::Description),
            "auto" => Some(ImageMode::Auto),
            _ => None,
        }
    }
}

/// What the pre-classification decided an image mostly is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageContentKind {
    TextDocument,
    VisualContent,
}

/// Capability: a vision-LLM viewed through the three calls the extractor
/// needs.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Extract all printed text from the image.
    async fn extract_text(&self, image: &[u8], mime: &str) -> Result<String>;

    /// Describe the image for retrieval.
    async fn describe(&self, image: &[u8], mime: &str) -> Result<String>;

    /// Quick classification: mostly text, or mostly visual content.
    async fn classify(&self, image: &[u8], mime: &str) -> Result<ImageContentKind>;
}

const TEXT_EXTRACTION_PROMPT: &str = "\
Extract ALL text visible in this document image. Preserve reading order \
and paragraph structure; for Arabic keep the right-to-left order; for \
tables keep the tabular layout. Mark unclear words with [?]. Output the \
extracted text only, with no commentary.";

const DESCRIPTION_PROMPT: &str = "\
Describe this image in detail for search and retrieval. Name the kind of \
visual (chart, diagram, photo, infographic), the key elements and data \
points, and any visible labels or titles, in clear searchable language. \
Support Arabic and English content.";

const CLASSIFY_PROMPT: &str = "\
Does this image contain primarily readable text (a scanned document or \
screenshot), or primarily visual content (chart, diagram, photo)? Answer \
with exactly TEXT_DOCUMENT or VISUAL_CONTENT.";

/// OpenAI-compatible vision chat client.
pub struct VisionApiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: Option<String>,
}

impl VisionApiClient {
    pub fn from_config(config: &VisionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExtractionError::Vision(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config
                .api_key
                .clone()
                .or_else(|| std::env::var("VISION_API_KEY").ok()),
        })
    }

    async fn ask(&self, prompt: &str, image: &[u8], mime: &str) -> Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let data_url = format!("data:{mime};base64,{encoded}");

        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }],
            "max_tokens": 1024
        });

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ExtractionError::Vision(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Vision(format!("API error ({status}): {text}")).into());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Vision(format!("Failed to parse response: {e}")))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl VisionModel for VisionApiClient {
    async fn extract_text(&self, image: &[u8], mime: &str) -> Result<String> {
        self.ask(TEXT_EXTRACTION_PROMPT, image, mime).await
    }

    async fn describe(&self, image: &[u8], mime: &str) -> Result<String> {
        self.ask(DESCRIPTION_PROMPT, image, mime).await
    }

    async fn classify(&self, image: &[u8], mime: &str) -> Result<ImageContentKind> {
        let answer = self.ask(CLASSIFY_PROMPT, image, mime).await?;
        if answer.to_uppercase().contains("TEXT_DOCUMENT") {
            Ok(ImageContentKind::TextDocument)
        } else {
            Ok(ImageContentKind::VisualContent)
        }
    }
}

/// Image extractor.
pub struct ImageExtractor {
    vision: Arc<dyn VisionModel>,
    default_mode: ImageMode,
}

const FORMATS: [FileFormat; 1] = [FileFormat::Image];

impl ImageExtractor {
    pub fn new(vision: Arc<dyn VisionModel>, default_mode: ImageMode) -> Self {
        Self {
            vision,
            default_mode,
        }
    }

    /// One block for a single image, mode resolved first when auto.
    async fn extract_one(&self, image: &[u8], mime: &str, mode: ImageMode) -> Result<Block> {
        let mode = match mode {
            ImageMode::Auto => match self.vision.classify(image, mime).await? {
                ImageContentKind::TextDocument => ImageMode::Text,
                ImageContentKind::VisualContent => ImageMode::Description,
            },
            other => other,
        };

        match mode {
            ImageMode::Text => Ok(Block {
                kind: BlockKind::ImageText,
                text: self.vision.extract_text(image, mime).await?,
            }),
            ImageMode::Description => Ok(Block {
                kind: BlockKind::ImageDescription,
                text: self.vision.describe(image, mime).await?,
            }),
            ImageMode::Auto => unreachable!("auto resolved above"),
        }
    }
}

#[async_trait]
impl Extractor for ImageExtractor {
    async fn extract(
        &self,
        content: &[u8],
        filename: &str,
        options: &ExtractOptions,
    ) -> Result<ExtractionOutput> {
        let mode = options.image_mode.unwrap_or(self.default_mode);

        let mut document = if is_tiff(content) {
            let pages = tiff_pages_as_png(content)?;
            let page_count = pages.len();
            let mut blocks = Vec::with_capacity(page_count);
            for (index, png) in pages.iter().enumerate() {
                tracing::debug!(filename, page = index + 1, "Processing TIFF page");
                blocks.push(self.extract_one(png, "image/png", mode).await?);
            }
            let mut document = ExtractedDocument::new(blocks);
            document
                .format_metadata
                .insert("page_count".to_string(), json!(page_count));
            document
        } else {
            let img = image::load_from_memory(content)
                .map_err(|e| ExtractionError::Image(e.to_string()))?;
            let (width, height) = img.dimensions();

            let mime = detect_image_mime(content);
            let block = self.extract_one(content, mime, mode).await?;

            let mut document = ExtractedDocument::new(vec![block]);
            document
                .format_metadata
                .insert("width".to_string(), json!(width));
            document
                .format_metadata
                .insert("height".to_string(), json!(height));
            document
        };

        document
            .format_metadata
            .insert("image_mode".to_string(), json!(mode_str(mode)));

        Ok(ExtractionOutput {
            format: FileFormat::Image.as_str().to_string(),
            documents: vec![document],
        })
    }

    fn formats(&self) -> &[FileFormat] {
        &FORMATS
    }

    fn name(&self) -> &str {
        "image"
    }
}

fn mode_str(mode: ImageMode) -> &'static str {
    match mode {
        ImageMode::Text => "text",
        ImageMode::Description => "description",
        ImageMode::Auto => "auto",
    }
}

fn is_tiff(content: &[u8]) -> bool {
    content.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || content.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
}

fn detect_image_mime(content: &[u8]) -> &'static str {
    if content.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if content.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if content.starts_with(b"GIF8") {
        "image/gif"
    } else if content.len() >= 12 && &content[0..4] == b"RIFF" && &content[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/png"
    }
}

/// Decode every page of a TIFF and re-encode each as PNG for the vision
/// API, which does not accept TIFF uploads.
fn tiff_pages_as_png(content: &[u8]) -> Result<Vec<Vec<u8>>> {
    use tiff::decoder::{Decoder, DecodingResult};
    use tiff::ColorType;

    let cursor = std::io::Cursor::new(content);
    let mut decoder =
        Decoder::new(cursor).map_err(|e| ExtractionError::Image(format!("TIFF: {e}")))?;

    let mut pages = Vec::new();
    loop {
        let (width, height) = decoder
            .dimensions()
            .map_err(|e| ExtractionError::Image(format!("TIFF dimensions: {e}")))?;
        let color_type = decoder
            .colortype()
            .map_err(|e| ExtractionError::Image(format!("TIFF color type: {e}")))?;
        let data = decoder
            .read_image()
            .map_err(|e| ExtractionError::Image(format!("TIFF decode: {e}")))?;

        let rgba = match (color_type, data) {
            (ColorType::Gray(8), DecodingResult::U8(buf)) => {
                image::GrayImage::from_raw(width, height, buf)
                    .map(|g| image::DynamicImage::ImageLuma8(g).to_rgba8())
            }
            (ColorType::RGB(8), DecodingResult::U8(buf)) => {
                image::RgbImage::from_raw(width, height, buf)
                    .map(|g| image::DynamicImage::ImageRgb8(g).to_rgba8())
            }
            (ColorType::RGBA(8), DecodingResult::U8(buf)) => {
                image::RgbaImage::from_raw(width, height, buf)
            }
            _ => None,
        }
        .ok_or_else(|| {
            ExtractionError::Image(format!("Unsupported TIFF layout: {color_type:?}"))
        })?;

        let mut png = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(rgba)
            .write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| ExtractionError::Image(format!("PNG encode: {e}")))?;
        pages.push(png.into_inner());

        if !decoder.more_images() {
            break;
        }
        decoder
            .next_image()
            .map_err(|e| ExtractionError::Image(format!("TIFF next page: {e}")))?;
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeVision {
        kind: ImageContentKind,
    }

    #[async_trait]
    impl VisionModel for FakeVision {
        async fn extract_text(&self, _image: &[u8], _mime: &str) -> Result<String> {
            Ok("extracted text".to_string())
        }

        async fn describe(&self, _image: &[u8], _mime: &str) -> Result<String> {
            Ok("a chart showing numbers".to_string())
        }

        async fn classify(&self, _image: &[u8], _mime: &str) -> Result<ImageContentKind> {
            Ok(self.kind)
        }
    }

    fn png_bytes() -> Vec<u8> {
        let mut img = image::RgbaImage::new(2, 2);
        img.put_pixel(0, 0, image::Rgba([255, 255, 255, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn extractor(kind: ImageContentKind, mode: ImageMode) -> ImageExtractor {
        ImageExtractor::new(Arc::new(FakeVision { kind }), mode)
    }

    #[tokio::test]
    async fn test_text_mode() {
        let output = extractor(ImageContentKind::TextDocument, ImageMode::Text)
            .extract(&png_bytes(), "scan.png", &ExtractOptions::default())
            .await
            .unwrap();
        let block = &output.documents[0].blocks[0];
        assert_eq!(block.kind, BlockKind::ImageText);
        assert_eq!(block.text, "extracted text");
    }

    #[tokio::test]
    async fn test_auto_mode_follows_classification() {
        let output = extractor(ImageContentKind::VisualContent, ImageMode::Auto)
            .extract(&png_bytes(), "chart.png", &ExtractOptions::default())
            .await
            .unwrap();
        let block = &output.documents[0].blocks[0];
        assert_eq!(block.kind, BlockKind::ImageDescription);
        assert_eq!(block.text, "a chart showing numbers");
    }

    #[tokio::test]
    async fn test_per_call_mode_overrides_default() {
        let options = ExtractOptions {
            image_mode: Some(ImageMode::Description),
        };
        let output = extractor(ImageContentKind::TextDocument, ImageMode::Text)
            .extract(&png_bytes(), "photo.png", &options)
            .await
            .unwrap();
        assert_eq!(output.documents[0].blocks[0].kind, BlockKind::ImageDescription);
    }

    #[tokio::test]
    async fn test_invalid_image_rejected() {
        let result = extractor(ImageContentKind::TextDocument, ImageMode::Text)
            .extract(b"not an image", "bad.png", &ExtractOptions::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_multipage_tiff_one_block_per_page() {
        // Two-page grayscale TIFF built with the tiff encoder
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut encoder = tiff::encoder::TiffEncoder::new(&mut buffer).unwrap();
            let page: Vec<u8> = vec![128; 4];
            encoder
                .write_image::<tiff::encoder::colortype::Gray8>(2, 2, &page)
                .unwrap();
            encoder
                .write_image::<tiff::encoder::colortype::Gray8>(2, 2, &page)
                .unwrap();
        }
        let bytes = buffer.into_inner();

        let output = extractor(ImageContentKind::TextDocument, ImageMode::Text)
            .extract(&bytes, "pages.tiff", &ExtractOptions::default())
            .await
            .unwrap();
        assert_eq!(output.documents[0].blocks.len(), 2);
        assert_eq!(output.documents[0].format_metadata["page_count"], 2);
    }
}
