//! DOCX extractor.
//!
//! Walks the document tree, maps paragraph style names to heading
//! levels, and emits each table as a single block with rows linearized.

use async_trait::async_trait;

use crate::error::ExtractionError;
use crate::ingestion::extractors::{
    ExtractOptions, ExtractedDocument, ExtractionOutput, Extractor,
};
use crate::ingestion::FileFormat;
use crate::text::{Block, BlockKind};

pub struct DocxExtractor;

const FORMATS: [FileFormat; 1] = [FileFormat::Docx];

#[async_trait]
impl Extractor for DocxExtractor {
    async fn extract(
        &self,
        content: &[u8],
        _filename: &str,
        _options: &ExtractOptions,
    ) -> crate::error::Result<ExtractionOutput> {
        let docx =
            docx_rs::read_docx(content).map_err(|e| ExtractionError::Docx(e.to_string()))?;

        let mut blocks = Vec::new();
        for child in docx.document.children.iter() {
            collect_child(child, &mut blocks);
        }

        Ok(ExtractionOutput {
            format: FileFormat::Docx.as_str().to_string(),
            documents: vec![ExtractedDocument::new(blocks)],
        })
    }

    fn formats(&self) -> &[FileFormat] {
        &FORMATS
    }

    fn name(&self) -> &str {
        "docx"
    }
}

fn collect_child(child: &docx_rs::DocumentChild, blocks: &mut Vec<Block>) {
    match child {
        docx_rs::DocumentChild::Paragraph(para) => {
            let text = paragraph_text(para);
            if text.is_empty() {
                return;
            }
            match heading_level(para) {
                Some(level) => blocks.push(Block {
                    kind: BlockKind::Heading { level },
                    text,
                }),
                None => blocks.push(Block::paragraph(text)),
            }
        }
        docx_rs::DocumentChild::Table(table) => {
            let text = table_text(table);
            if !text.is_empty() {
                blocks.push(Block::table(text));
            }
        }
        _ => {}
    }
}

/// Map Word paragraph style names to heading levels: "Heading1"..
/// "Heading6" (and the space-separated variants) plus "Title".
fn heading_level(para: &docx_rs::Paragraph) -> Option<u8> {
    let style = para.property.style.as_ref()?.val.to_lowercase();
    if style == "title" {
        return Some(1);
    }
    let rest = style.strip_prefix("heading")?;
    let digits: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u8>() {
        Ok(level @ 1..=6) => Some(level),
        _ => Some(2),
    }
}

fn paragraph_text(para: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &para.children {
        match child {
            docx_rs::ParagraphChild::Run(run) => {
                push_run_text(run, &mut text);
            }
            docx_rs::ParagraphChild::Hyperlink(link) => {
                for child in &link.children {
                    if let docx_rs::ParagraphChild::Run(run) = child {
                        push_run_text(run, &mut text);
                    }
                }
            }
            _ => {}
        }
    }
    text.trim().to_string()
}

fn push_run_text(run: &docx_rs::Run, text: &mut String) {
    for child in &run.children {
        if let docx_rs::RunChild::Text(t) = child {
            text.push_str(&t.text);
        }
    }
}

/// Rows become lines, cells joined with " | ".
fn table_text(table: &docx_rs::Table) -> String {
    let mut rows_out = Vec::new();

    for row in &table.rows {
        let docx_rs::TableChild::TableRow(tr) = row;
        let mut cells_out = Vec::new();
        for cell in &tr.cells {
            let docx_rs::TableRowChild::TableCell(tc) = cell;
            let mut cell_text = String::new();
            for child in &tc.children {
                if let docx_rs::TableCellContent::Paragraph(p) = child {
                    let pt = paragraph_text(p);
                    if !pt.is_empty() {
                        if !cell_text.is_empty() {
                            cell_text.push(' ');
                        }
                        cell_text.push_str(&pt);
                    }
                }
            }
            if !cell_text.is_empty() {
                cells_out.push(cell_text);
            }
        }
        if !cells_out.is_empty() {
            rows_out.push(cells_out.join(" | "));
        }
    }

    rows_out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx_rs::{Docx, Paragraph, Run};

    fn roundtrip(docx: Docx) -> Vec<Block> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        docx.build().pack(&mut buffer).unwrap();
        let bytes = buffer.into_inner();

        let extractor = DocxExtractor;
        futures::executor::block_on(extractor.extract(
            &bytes,
            "file.docx",
            &ExtractOptions::default(),
        ))
        .unwrap()
        .documents
        .remove(0)
        .blocks
    }

    #[test]
    fn test_paragraphs_extracted() {
        let docx = Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("النص الاول.")))
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("النص الثاني.")));
        let blocks = roundtrip(docx);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "النص الاول.");
        assert_eq!(blocks[1].kind, BlockKind::Paragraph);
    }

    #[test]
    fn test_heading_style_mapped() {
        let docx = Docx::new().add_paragraph(
            Paragraph::new()
                .style("Heading1")
                .add_run(Run::new().add_text("عنوان")),
        );
        let blocks = roundtrip(docx);
        assert_eq!(blocks[0].kind, BlockKind::Heading { level: 1 });
    }

    #[test]
    fn test_invalid_bytes_rejected() {
        let extractor = DocxExtractor;
        let result = futures::executor::block_on(extractor.extract(
            b"not a zip archive",
            "file.docx",
            &ExtractOptions::default(),
        ));
        assert!(result.is_err());
    }
}
