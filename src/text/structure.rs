//! Structure-aware chunking for documents with typographic structure.
//!
//! Consumes pre-parsed blocks (headings, paragraphs, tables, lists, code)
//! as produced by the format extractors. Headings open a new chunk and are
//! carried as `section_header` on every following chunk until the next
//! heading; tables stay whole when they fit, and split row-wise with the
//! header row repeated when they do not.

use crate::text::{finalize_positions, Chunk, ContentType, SentenceChunker};

/// A typed block of extracted document content.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub text: String,
}

/// Block classification from the format extractors.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Heading { level: u8 },
    Paragraph,
    Table,
    List,
    Code { language: Option<String> },
    ImageText,
    ImageDescription,
}

impl Block {
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Heading { level },
            text: text.into(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            text: text.into(),
        }
    }

    pub fn table(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Table,
            text: text.into(),
        }
    }

    pub fn list(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::List,
            text: text.into(),
        }
    }

    fn content_type(&self) -> ContentType {
        match self.kind {
            BlockKind::Heading { .. } => ContentType::Heading,
            BlockKind::Paragraph => ContentType::Text,
            BlockKind::Table => ContentType::Table,
            BlockKind::List => ContentType::List,
            BlockKind::Code { .. } => ContentType::Code,
            BlockKind::ImageText => ContentType::ImageText,
            BlockKind::ImageDescription => ContentType::ImageDescription,
        }
    }
}

/// Per-type chunk size targets. Dense content types pack tighter than
/// prose so a retrieved chunk stays focused.
const HEADING_TARGET: usize = 150;
const TABLE_TARGET: usize = 250;
const LIST_TARGET: usize = 300;
const PROSE_TARGET: usize = 400;

/// Structure-aware chunker.
#[derive(Debug, Clone)]
pub struct StructureChunker {
    max_chunk_size: usize,
    overlap: usize,
}

impl StructureChunker {
    pub fn new(max_chunk_size: usize, overlap: usize) -> Self {
        Self {
            max_chunk_size,
            overlap,
        }
    }

    /// Chunk an ordered block list into positioned chunks. Deterministic;
    /// an empty block list yields no chunks.
    pub fn chunk_blocks(&self, blocks: &[Block]) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut section_header: Option<String> = None;

        for block in blocks {
            if block.text.trim().is_empty() {
                continue;
            }

            match &block.kind {
                BlockKind::Heading { .. } => {
                    let text = block.text.trim().to_string();
                    let heading =
                        SentenceChunker::with_sizes(self.target(HEADING_TARGET), 0, 1);
                    for content in heading.chunk_contents(&text) {
                        let mut chunk = Chunk::new(content, ContentType::Heading);
                        chunk.section_header = section_header.clone();
                        chunks.push(chunk);
                    }
                    // Following chunks carry the full heading, split or not
                    section_header = Some(text);
                }
                BlockKind::Table => {
                    for content in self.split_table(&block.text) {
                        let mut chunk = Chunk::new(content, ContentType::Table);
                        chunk.section_header = section_header.clone();
                        chunks.push(chunk);
                    }
                }
                BlockKind::List => {
                    for content in pack_lines(&block.text, self.target(LIST_TARGET)) {
                        let mut chunk = Chunk::new(content, ContentType::List);
                        chunk.section_header = section_header.clone();
                        chunks.push(chunk);
                    }
                }
                BlockKind::Code { .. } => {
                    for content in pack_lines(&block.text, self.max_chunk_size) {
                        let mut chunk = Chunk::new(content, block.content_type());
                        chunk.section_header = section_header.clone();
                        chunks.push(chunk);
                    }
                }
                BlockKind::Paragraph | BlockKind::ImageText | BlockKind::ImageDescription => {
                    let prose = SentenceChunker::with_sizes(
                        self.target(PROSE_TARGET),
                        self.overlap,
                        1,
                    );
                    for content in prose.chunk_contents(&block.text) {
                        let mut chunk = Chunk::new(content, block.content_type());
                        chunk.section_header = section_header.clone();
                        chunks.push(chunk);
                    }
                }
            }
        }

        finalize_positions(chunks)
    }

    fn target(&self, type_target: usize) -> usize {
        type_target.min(self.max_chunk_size).max(1)
    }

    /// A table within 1.5x the chunk budget stays whole; larger tables
    /// split row-wise with the header row repeated on every fragment.
    fn split_table(&self, table: &str) -> Vec<String> {
        let whole_budget = self.max_chunk_size + self.max_chunk_size / 2;
        if table.chars().count() <= whole_budget {
            return vec![table.trim().to_string()];
        }

        let mut lines = table.lines().filter(|l| !l.trim().is_empty());
        let header = match lines.next() {
            Some(h) => h.trim().to_string(),
            None => return Vec::new(),
        };

        let target = self.target(TABLE_TARGET);
        let mut fragments = Vec::new();
        let mut current = header.clone();

        for row in lines {
            let row = row.trim();
            if current.chars().count() + 1 + row.chars().count() > target
                && current != header
            {
                fragments.push(std::mem::replace(&mut current, header.clone()));
            }
            current.push('\n');
            current.push_str(row);
        }

        if current != header {
            fragments.push(current);
        } else if fragments.is_empty() {
            fragments.push(header);
        }

        fragments
    }
}

/// Pack non-empty lines greedily up to a size target, never splitting a
/// line. Used for lists and code where line boundaries are the structure.
fn pack_lines(text: &str, target: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        if !current.is_empty()
            && current.chars().count() + 1 + line.chars().count() > target
        {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }

    if !current.is_empty() {
        out.push(current);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_blocks() {
        let chunker = StructureChunker::new(400, 50);
        assert!(chunker.chunk_blocks(&[]).is_empty());
        assert!(chunker
            .chunk_blocks(&[Block::paragraph("   ")])
            .is_empty());
    }

    #[test]
    fn test_heading_carried_as_section_header() {
        let chunker = StructureChunker::new(400, 50);
        let blocks = vec![
            Block::heading(1, "المقدمة"),
            Block::paragraph("الفقره الاولى هنا."),
            Block::paragraph("الفقره الثانيه هنا."),
            Block::heading(2, "الفصل الاول"),
            Block::paragraph("فقره تحت الفصل الاول."),
        ];
        let chunks = chunker.chunk_blocks(&blocks);

        assert_eq!(chunks[0].content_type, ContentType::Heading);
        assert_eq!(chunks[0].section_header, None);
        assert_eq!(chunks[1].section_header.as_deref(), Some("المقدمة"));
        assert_eq!(chunks[2].section_header.as_deref(), Some("المقدمة"));

        let last = chunks.last().unwrap();
        assert_eq!(last.section_header.as_deref(), Some("الفصل الاول"));
    }

    #[test]
    fn test_oversize_heading_split_to_target() {
        let chunker = StructureChunker::new(400, 50);
        let long_heading =
            "عنوان طويل جدا يتكرر فيه الكلام مرارا وتكرارا حتي يتجاوز حد العنوان المسموح "
                .repeat(4);
        let blocks = vec![
            Block::heading(1, long_heading.trim()),
            Block::paragraph("فقره تحت العنوان الطويل."),
        ];
        let chunks = chunker.chunk_blocks(&blocks);

        let headings: Vec<_> = chunks
            .iter()
            .filter(|c| c.content_type == ContentType::Heading)
            .collect();
        assert!(headings.len() > 1);
        for heading in &headings {
            assert!(heading.content.chars().count() <= 150);
            assert!(!heading.content.is_empty());
        }
        // The paragraph still carries the full heading as its section
        let paragraph = chunks.last().unwrap();
        assert_eq!(paragraph.content_type, ContentType::Text);
        assert_eq!(
            paragraph.section_header.as_deref(),
            Some(long_heading.trim())
        );
    }

    #[test]
    fn test_small_table_stays_whole() {
        let chunker = StructureChunker::new(400, 50);
        let table = "name | city\nاحمد | القاهره\nساره | الرياض";
        let chunks = chunker.chunk_blocks(&[Block::table(table)]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content_type, ContentType::Table);
        assert_eq!(chunks[0].content, table);
    }

    #[test]
    fn test_large_table_splits_with_header_retained() {
        let chunker = StructureChunker::new(100, 0);
        let mut table = String::from("id | value | description");
        for i in 0..30 {
            table.push_str(&format!("\n{i} | item number {i} | a row of data"));
        }
        let chunks = chunker.chunk_blocks(&[Block::table(&table)]);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(
                chunk.content.starts_with("id | value | description"),
                "fragment lost header: {:?}",
                chunk.content
            );
            assert!(chunk.content.lines().count() > 1);
        }
    }

    #[test]
    fn test_list_packs_items() {
        let chunker = StructureChunker::new(400, 0);
        let list = "- البند الاول\n- البند الثاني\n- البند الثالث";
        let chunks = chunker.chunk_blocks(&[Block::list(list)]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content_type, ContentType::List);
        assert_eq!(chunks[0].content.lines().count(), 3);
    }

    #[test]
    fn test_code_keeps_line_boundaries() {
        let chunker = StructureChunker::new(40, 0);
        let code = "fn main() {\n    println!(\"hi\");\n}\nfn other() {\n    do_work();\n}";
        let blocks = vec![Block {
            kind: BlockKind::Code {
                language: Some("rust".to_string()),
            },
            text: code.to_string(),
        }];
        let chunks = chunker.chunk_blocks(&blocks);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert_eq!(chunk.content_type, ContentType::Code);
            for line in chunk.content.lines() {
                assert!(code.contains(line));
            }
        }
    }

    #[test]
    fn test_positions_span_all_blocks() {
        let chunker = StructureChunker::new(400, 50);
        let blocks = vec![
            Block::heading(1, "Title"),
            Block::paragraph("Some prose."),
            Block::list("- a\n- b"),
        ];
        let chunks = chunker.chunk_blocks(&blocks);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.total_chunks, total);
        }
    }

    #[test]
    fn test_deterministic() {
        let chunker = StructureChunker::new(120, 30);
        let blocks = vec![
            Block::heading(1, "عنوان"),
            Block::paragraph("جملة اولى. جملة ثانيه. جملة ثالثه. جملة رابعه."),
            Block::table("a | b\n1 | 2"),
        ];
        assert_eq!(chunker.chunk_blocks(&blocks), chunker.chunk_blocks(&blocks));
    }
}
