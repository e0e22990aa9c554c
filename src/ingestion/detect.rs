//! File format detection.
//!
//! Order of trust: declared MIME type from the upload, magic bytes in the
//! leading 2 KB, filename extension, then plain text as the fallback.

use crate::ingestion::FileFormat;

/// Bytes examined for magic-number detection.
const MAGIC_WINDOW: usize = 2048;

/// Detect the format of an uploaded file.
pub fn detect_format(
    declared_mime: Option<&str>,
    content: &[u8],
    filename: &str,
) -> FileFormat {
    if let Some(format) = declared_mime.and_then(format_from_mime) {
        return format;
    }
    if let Some(format) = format_from_magic(&content[..content.len().min(MAGIC_WINDOW)]) {
        return format;
    }
    if let Some(format) = format_from_extension(filename) {
        return format;
    }
    FileFormat::Text
}

fn format_from_mime(mime: &str) -> Option<FileFormat> {
    let mime = mime.split(';').next().unwrap_or(mime).trim();
    match mime {
        "application/pdf" => Some(FileFormat::Pdf),
        "text/html" | "application/xhtml+xml" => Some(FileFormat::Html),
        "text/markdown" | "text/x-markdown" => Some(FileFormat::Markdown),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        | "application/msword" => Some(FileFormat::Docx),
        "text/plain" => Some(FileFormat::Text),
        "application/json" | "application/ld+json" | "text/json" => Some(FileFormat::Json),
        _ if mime.starts_with("image/") => Some(FileFormat::Image),
        _ if mime.starts_with("text/") => Some(FileFormat::Text),
        _ => None,
    }
}

fn format_from_magic(head: &[u8]) -> Option<FileFormat> {
    if head.starts_with(b"%PDF") {
        return Some(FileFormat::Pdf);
    }
    if head.starts_with(&[0x89, b'P', b'N', b'G'])
        || head.starts_with(&[0xFF, 0xD8, 0xFF])
        || head.starts_with(b"GIF8")
        || head.starts_with(b"BM")
        || head.starts_with(&[0x49, 0x49, 0x2A, 0x00])
        || head.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
        || is_webp(head)
    {
        return Some(FileFormat::Image);
    }
    // DOCX is a ZIP container; plain ZIPs of other kinds are rejected
    // later by the extractor with a precise error.
    if head.starts_with(b"PK\x03\x04") {
        return Some(FileFormat::Docx);
    }

    // Textual sniffing on the decoded head
    let text = String::from_utf8_lossy(head);
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    let lowered = trimmed.to_lowercase();
    if lowered.starts_with("<!doctype html") || lowered.starts_with("<html") {
        return Some(FileFormat::Html);
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(FileFormat::Json);
    }
    None
}

fn is_webp(head: &[u8]) -> bool {
    head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP"
}

fn format_from_extension(filename: &str) -> Option<FileFormat> {
    let ext = filename.rsplit('.').next()?.to_lowercase();
    match ext.as_str() {
        "pdf" => Some(FileFormat::Pdf),
        "html" | "htm" | "xhtml" => Some(FileFormat::Html),
        "md" | "markdown" | "mdown" | "mkd" => Some(FileFormat::Markdown),
        "docx" | "doc" => Some(FileFormat::Docx),
        "txt" | "text" | "log" => Some(FileFormat::Text),
        "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tif" | "tiff" | "webp" => {
            Some(FileFormat::Image)
        }
        "json" | "jsonl" | "ndjson" => Some(FileFormat::Json),
        _ => None,
    }
}
