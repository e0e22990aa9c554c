//! Markdown extractor.
//!
//! Line-oriented tokenizer: ATX headings, fenced code (with language
//! attribute), list runs, pipe tables, and paragraphs. Inline emphasis is
//! left in place; it does not hurt embeddings.

use async_trait::async_trait;

use crate::ingestion::extractors::{
    ExtractOptions, ExtractedDocument, ExtractionOutput, Extractor,
};
use crate::ingestion::FileFormat;
use crate::text::{Block, BlockKind};

pub struct MarkdownExtractor;

const FORMATS: [FileFormat; 1] = [FileFormat::Markdown];

#[async_trait]
impl Extractor for MarkdownExtractor {
    async fn extract(
        &self,
        content: &[u8],
        _filename: &str,
        _options: &ExtractOptions,
    ) -> crate::error::Result<ExtractionOutput> {
        let text = String::from_utf8_lossy(content);
        let blocks = tokenize(&text);

        Ok(ExtractionOutput {
            format: FileFormat::Markdown.as_str().to_string(),
            documents: vec![ExtractedDocument::new(blocks)],
        })
    }

    fn formats(&self) -> &[FileFormat] {
        &FORMATS
    }

    fn name(&self) -> &str {
        "markdown"
    }
}

fn tokenize(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut list: Vec<String> = Vec::new();
    let mut table: Vec<&str> = Vec::new();
    let mut code: Option<(Option<String>, Vec<&str>)> = None;

    macro_rules! flush {
        () => {
            if !paragraph.is_empty() {
                blocks.push(Block::paragraph(paragraph.join(" ")));
                paragraph.clear();
            }
            if !list.is_empty() {
                blocks.push(Block::list(list.join("\n")));
                list.clear();
            }
            if !table.is_empty() {
                blocks.push(Block::table(table.join("\n")));
                table.clear();
            }
        };
    }

    for line in text.lines() {
        // Inside a fence everything is code until the closing fence
        if let Some((language, lines)) = &mut code {
            if line.trim_start().starts_with("```") {
                blocks.push(Block {
                    kind: BlockKind::Code {
                        language: language.clone(),
                    },
                    text: lines.join("\n"),
                });
                code = None;
            } else {
                lines.push(line);
            }
            continue;
        }

        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix("```") {
            flush!();
            let language = {
                let lang = rest.trim();
                (!lang.is_empty()).then(|| lang.to_string())
            };
            code = Some((language, Vec::new()));
            continue;
        }

        if trimmed.is_empty() {
            flush!();
            continue;
        }

        if let Some((level, heading)) = parse_heading(trimmed) {
            flush!();
            blocks.push(Block {
                kind: BlockKind::Heading { level },
                text: heading.to_string(),
            });
            continue;
        }

        if is_table_line(trimmed) {
            if !paragraph.is_empty() {
                blocks.push(Block::paragraph(paragraph.join(" ")));
                paragraph.clear();
            }
            if !is_table_separator(trimmed) {
                table.push(trimmed);
            }
            continue;
        }

        if let Some(item) = parse_list_item(trimmed) {
            if !paragraph.is_empty() {
                blocks.push(Block::paragraph(paragraph.join(" ")));
                paragraph.clear();
            }
            list.push(format!("- {item}"));
            continue;
        }

        if !list.is_empty() {
            blocks.push(Block::list(list.join("\n")));
            list.clear();
        }
        if !table.is_empty() {
            blocks.push(Block::table(table.join("\n")));
            table.clear();
        }
        paragraph.push(trimmed);
    }

    // An unterminated fence still yields its code
    if let Some((language, lines)) = code {
        blocks.push(Block {
            kind: BlockKind::Code { language },
            text: lines.join("\n"),
        });
    }
    flush!();

    blocks
}

fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&hashes) {
        let rest = &line[hashes..];
        if let Some(text) = rest.strip_prefix(' ') {
            return Some((hashes as u8, text.trim()));
        }
    }
    None
}

fn parse_list_item(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "+ "] {
        if let Some(item) = line.strip_prefix(marker) {
            return Some(item.trim());
        }
    }
    // Ordered items: "1. text"
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(item) = line[digits..].strip_prefix(". ") {
            return Some(item.trim());
        }
    }
    None
}

fn is_table_line(line: &str) -> bool {
    line.starts_with('|') && line.matches('|').count() >= 2
}

fn is_table_separator(line: &str) -> bool {
    line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headings() {
        let blocks = tokenize("# عنوان رئيسي\n\n## فرعي\n\nفقرة نصية.");
        assert_eq!(blocks[0].kind, BlockKind::Heading { level: 1 });
        assert_eq!(blocks[0].text, "عنوان رئيسي");
        assert_eq!(blocks[1].kind, BlockKind::Heading { level: 2 });
        assert_eq!(blocks[2].kind, BlockKind::Paragraph);
    }

    #[test]
    fn test_hash_without_space_is_not_heading() {
        let blocks = tokenize("#hashtag text here");
        assert_eq!(blocks[0].kind, BlockKind::Paragraph);
    }

    #[test]
    fn test_code_fence_with_language() {
        let blocks = tokenize("```rust\nfn main() {}\n```\n\ntext after.");
        assert_eq!(
            blocks[0].kind,
            BlockKind::Code {
                language: Some("rust".to_string())
            }
        );
        assert_eq!(blocks[0].text, "fn main() {}");
        assert_eq!(blocks[1].kind, BlockKind::Paragraph);
    }

    #[test]
    fn test_unterminated_fence_kept() {
        let blocks = tokenize("```\ncode line");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "code line");
    }

    #[test]
    fn test_lists_unordered_and_ordered() {
        let blocks = tokenize("- اول\n- ثاني\n\n1. one\n2. two");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::List);
        assert_eq!(blocks[0].text, "- اول\n- ثاني");
        assert_eq!(blocks[1].text, "- one\n- two");
    }

    #[test]
    fn test_pipe_table_without_separator_row() {
        let blocks = tokenize("| a | b |\n| --- | --- |\n| 1 | 2 |");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Table);
        assert_eq!(blocks[0].text.lines().count(), 2);
    }

    #[test]
    fn test_paragraph_lines_joined() {
        let blocks = tokenize("سطر اول\nسطر ثاني\n\nفقرة جديدة");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "سطر اول سطر ثاني");
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("\n\n\n").is_empty());
    }
}
