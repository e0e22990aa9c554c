//! HTML extractor.
//!
//! Lenient parse via `scraper`; navigation chrome (script, style, nav,
//! footer) is dropped, headings keep their level, tables are linearized
//! row by row, and lists keep one item per line.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;

use crate::error::ExtractionError;
use crate::ingestion::extractors::{
    ExtractOptions, ExtractedDocument, ExtractionOutput, Extractor,
};
use crate::ingestion::FileFormat;
use crate::text::{Block, BlockKind};

pub struct HtmlExtractor;

const FORMATS: [FileFormat; 1] = [FileFormat::Html];

/// Subtrees that never carry document content.
const DROPPED: [&str; 4] = ["script", "style", "nav", "footer"];

/// Containers whose inner elements are already captured when the
/// container itself is.
const CONTAINERS: [&str; 4] = ["table", "ul", "ol", "pre"];

#[async_trait]
impl Extractor for HtmlExtractor {
    async fn extract(
        &self,
        content: &[u8],
        _filename: &str,
        _options: &ExtractOptions,
    ) -> crate::error::Result<ExtractionOutput> {
        let html = String::from_utf8_lossy(content);
        let document = Html::parse_document(&html);

        let selector = Selector::parse("h1, h2, h3, h4, h5, h6, p, table, ul, ol, pre, blockquote")
            .map_err(|e| ExtractionError::Html(format!("selector: {e}")))?;

        let mut blocks = Vec::new();
        for element in document.select(&selector) {
            if has_excluded_ancestor(&element) {
                continue;
            }
            if let Some(block) = element_to_block(&element) {
                if !block.text.trim().is_empty() {
                    blocks.push(block);
                }
            }
        }

        let title = Selector::parse("title")
            .ok()
            .and_then(|s| document.select(&s).next())
            .map(|t| collect_text(&t));

        let mut extracted = ExtractedDocument::new(blocks);
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            extracted
                .format_metadata
                .insert("title".to_string(), json!(title));
        }

        Ok(ExtractionOutput {
            format: FileFormat::Html.as_str().to_string(),
            documents: vec![extracted],
        })
    }

    fn formats(&self) -> &[FileFormat] {
        &FORMATS
    }

    fn name(&self) -> &str {
        "html"
    }
}

fn has_excluded_ancestor(element: &ElementRef) -> bool {
    element.ancestors().skip(1).any(|node| {
        ElementRef::wrap(node).is_some_and(|el| {
            let name = el.value().name();
            DROPPED.contains(&name) || CONTAINERS.contains(&name)
        })
    })
}

fn element_to_block(element: &ElementRef) -> Option<Block> {
    let name = element.value().name();
    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse().unwrap_or(1);
            Some(Block {
                kind: BlockKind::Heading { level },
                text: collect_text(element),
            })
        }
        "p" | "blockquote" => Some(Block::paragraph(collect_text(element))),
        "table" => Some(Block::table(linearize_table(element))),
        "ul" | "ol" => Some(Block::list(linearize_list(element))),
        "pre" => Some(Block {
            kind: BlockKind::Code { language: None },
            text: element.text().collect::<String>().trim().to_string(),
        }),
        _ => None,
    }
}

/// Element text with whitespace collapsed.
fn collect_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// One line per row, cells joined with " | ".
fn linearize_table(table: &ElementRef) -> String {
    let row_selector = Selector::parse("tr").expect("static selector");
    let cell_selector = Selector::parse("th, td").expect("static selector");

    table
        .select(&row_selector)
        .filter_map(|row| {
            let cells: Vec<String> = row
                .select(&cell_selector)
                .map(|cell| collect_text(&cell))
                .filter(|c| !c.is_empty())
                .collect();
            (!cells.is_empty()).then(|| cells.join(" | "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per item, nested items flattened into their parent's text.
fn linearize_list(list: &ElementRef) -> String {
    let item_selector = Selector::parse("li").expect("static selector");
    list.select(&item_selector)
        .map(|item| format!("- {}", collect_text(&item)))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn extract(html: &str) -> Vec<Block> {
        HtmlExtractor
            .extract(html.as_bytes(), "page.html", &ExtractOptions::default())
            .await
            .unwrap()
            .documents
            .remove(0)
            .blocks
    }

    #[tokio::test]
    async fn test_headings_with_levels() {
        let blocks = extract("<h1>العنوان</h1><h3>فرعي</h3><p>نص.</p>").await;
        assert_eq!(blocks[0].kind, BlockKind::Heading { level: 1 });
        assert_eq!(blocks[0].text, "العنوان");
        assert_eq!(blocks[1].kind, BlockKind::Heading { level: 3 });
        assert_eq!(blocks[2].kind, BlockKind::Paragraph);
    }

    #[tokio::test]
    async fn test_script_style_nav_footer_dropped() {
        let blocks = extract(
            "<nav><p>menu item</p></nav>\
             <script>var x = 1;</script>\
             <style>p { color: red }</style>\
             <p>actual content here.</p>\
             <footer><p>copyright</p></footer>",
        )
        .await;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "actual content here.");
    }

    #[tokio::test]
    async fn test_table_linearized_by_rows() {
        let blocks = extract(
            "<table>\
             <tr><th>الاسم</th><th>المدينة</th></tr>\
             <tr><td>احمد</td><td>القاهره</td></tr>\
             </table>",
        )
        .await;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Table);
        let lines: Vec<&str> = blocks[0].text.lines().collect();
        assert_eq!(lines[0], "الاسم | المدينة");
        assert_eq!(lines[1], "احمد | القاهره");
    }

    #[tokio::test]
    async fn test_lists_one_item_per_line() {
        let blocks = extract("<ul><li>اول</li><li>ثاني</li></ul>").await;
        assert_eq!(blocks[0].kind, BlockKind::List);
        assert_eq!(blocks[0].text, "- اول\n- ثاني");
    }

    #[tokio::test]
    async fn test_malformed_html_tolerated() {
        let blocks = extract("<p>unclosed paragraph <b>bold text").await;
        assert!(!blocks.is_empty());
        assert!(blocks[0].text.contains("unclosed paragraph"));
    }

    #[tokio::test]
    async fn test_title_in_metadata() {
        let output = HtmlExtractor
            .extract(
                b"<html><head><title>My Page</title></head><body><p>x.</p></body></html>",
                "page.html",
                &ExtractOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(output.documents[0].format_metadata["title"], "My Page");
    }
}
