//! PDF extractor.
//!
//! Extracts per-page text, then cleans the artifacts that poison
//! retrieval: page-number lines, headers and footers repeated verbatim
//! across pages, and whitespace noise. Surviving lines are tagged as
//! headings, table rows, or prose for the structure chunker.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;

use crate::error::ExtractionError;
use crate::ingestion::extractors::{
    ExtractOptions, ExtractedDocument, ExtractionOutput, Extractor,
};
use crate::ingestion::FileFormat;
use crate::text::{Block, BlockKind};

pub struct PdfExtractor;

const FORMATS: [FileFormat; 1] = [FileFormat::Pdf];

/// A line repeated verbatim on at least this many pages is a running
/// header or footer.
const REPEAT_THRESHOLD: usize = 3;

/// Lines this short without terminal punctuation read as headings.
const HEADING_MAX_CHARS: usize = 60;

#[async_trait]
impl Extractor for PdfExtractor {
    async fn extract(
        &self,
        content: &[u8],
        _filename: &str,
        _options: &ExtractOptions,
    ) -> crate::error::Result<ExtractionOutput> {
        let pages = pdf_extract::extract_text_from_mem_by_pages(content)
            .map_err(|e| ExtractionError::Pdf(e.to_string()))?;

        let page_count = pages.len();
        let repeated = repeated_lines(&pages);

        let mut blocks = Vec::new();
        for page in &pages {
            collect_blocks(page, &repeated, &mut blocks);
        }

        let mut document = ExtractedDocument::new(blocks);
        document
            .format_metadata
            .insert("page_count".to_string(), json!(page_count));

        Ok(ExtractionOutput {
            format: FileFormat::Pdf.as_str().to_string(),
            documents: vec![document],
        })
    }

    fn formats(&self) -> &[FileFormat] {
        &FORMATS
    }

    fn name(&self) -> &str {
        "pdf"
    }
}

/// Lines appearing verbatim on `REPEAT_THRESHOLD`+ pages (counted once
/// per page), i.e. running headers and footers.
fn repeated_lines(pages: &[String]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for page in pages {
        let mut seen_this_page: Vec<&str> = Vec::new();
        for line in page.lines() {
            let line = line.trim();
            if line.is_empty() || seen_this_page.contains(&line) {
                continue;
            }
            seen_this_page.push(line);
            *counts.entry(line).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n >= REPEAT_THRESHOLD)
        .map(|(line, _)| line.to_string())
        .collect()
}

/// True for bare page numbers and "Page N" / "صفحة N" footer lines.
fn is_page_number_line(line: &str) -> bool {
    let line = line.trim();
    if line.chars().all(|c| c.is_ascii_digit() || c.is_whitespace() || c == '-')
        && line.chars().any(|c| c.is_ascii_digit())
    {
        return true;
    }
    let lowered = line.to_lowercase();
    for prefix in ["page ", "صفحة ", "صفحه "] {
        if let Some(rest) = lowered.strip_prefix(prefix) {
            if rest.trim().chars().all(|c| c.is_ascii_digit()) {
                return true;
            }
        }
    }
    false
}

fn looks_like_table_row(line: &str) -> bool {
    line.matches('|').count() >= 2 || line.matches('\t').count() >= 2
}

fn looks_like_heading(line: &str) -> bool {
    let count = line.chars().count();
    count > 0
        && count <= HEADING_MAX_CHARS
        && !line.ends_with(['.', '؟', '!', '?', '،', ':', '؛'])
        && !line.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Tag already-extracted text that carries PDF-style layout (used when
/// callers ingest raw text flagged as pdf).
pub(crate) fn tag_text_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    collect_blocks(text, &[], &mut blocks);
    blocks
}

/// Classify one page's cleaned lines into blocks, grouping consecutive
/// prose lines into paragraphs and consecutive table rows into tables.
fn collect_blocks(page: &str, repeated: &[String], blocks: &mut Vec<Block>) {
    let mut paragraph: Vec<&str> = Vec::new();
    let mut table: Vec<&str> = Vec::new();

    let flush_paragraph = |lines: &mut Vec<&str>, blocks: &mut Vec<Block>| {
        if !lines.is_empty() {
            blocks.push(Block::paragraph(lines.join(" ")));
            lines.clear();
        }
    };
    let flush_table = |lines: &mut Vec<&str>, blocks: &mut Vec<Block>| {
        if !lines.is_empty() {
            blocks.push(Block::table(lines.join("\n")));
            lines.clear();
        }
    };

    for line in page.lines() {
        let line = line.trim();
        if line.is_empty() {
            flush_table(&mut table, blocks);
            flush_paragraph(&mut paragraph, blocks);
            continue;
        }
        if is_page_number_line(line) || repeated.iter().any(|r| r == line) {
            continue;
        }

        if looks_like_table_row(line) {
            flush_paragraph(&mut paragraph, blocks);
            table.push(line);
        } else if looks_like_heading(line) && paragraph.is_empty() && table.is_empty() {
            blocks.push(Block {
                kind: BlockKind::Heading { level: 2 },
                text: line.to_string(),
            });
        } else {
            flush_table(&mut table, blocks);
            paragraph.push(line);
        }
    }

    flush_table(&mut table, blocks);
    flush_paragraph(&mut paragraph, blocks);
}
