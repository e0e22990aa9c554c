//! Sentence-aware chunking.
//!
//! Splits at Arabic and Latin sentence terminators and greedily packs
//! sentences into chunks, carrying a character overlap across chunk
//! boundaries. Keeping sentences intact preserves the semantic coherence
//! the embedding model depends on; a sentence is only broken when it alone
//! exceeds the chunk budget, and then only at whitespace.

use crate::config::ChunkingConfig;
use crate::text::{finalize_positions, Chunk, ContentType};

/// Sentence terminators recognized for both scripts.
const SENTENCE_TERMINATORS: [char; 4] = ['.', '؟', '!', '?'];

/// Sentence-aware chunker for prose.
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    max_chunk_size: usize,
    overlap: usize,
    min_chunk_size: usize,
}

impl SentenceChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            max_chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
            min_chunk_size: config.min_chunk_size,
        }
    }

    /// Chunker with an explicit size target, used by the structure chunker
    /// for its per-type budgets.
    pub(crate) fn with_sizes(max_chunk_size: usize, overlap: usize, min_chunk_size: usize) -> Self {
        Self {
            max_chunk_size,
            overlap,
            min_chunk_size,
        }
    }

    /// Split a document into ordered chunks with positions assigned.
    /// Empty or whitespace-only input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let chunks = self
            .chunk_contents(text)
            .into_iter()
            .map(|content| Chunk::new(content, ContentType::Text))
            .collect();
        finalize_positions(chunks)
    }

    /// Chunk raw text, returning just the contents. Deterministic for a
    /// given input and configuration.
    pub(crate) fn chunk_contents(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut pieces = Vec::new();
        for sentence in split_sentences(text) {
            if char_len(&sentence) > self.max_chunk_size {
                pieces.extend(split_at_whitespace(&sentence, self.max_chunk_size));
            } else {
                pieces.push(sentence);
            }
        }

        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for piece in pieces {
            let projected = char_len(&current)
                + if current.is_empty() { 0 } else { 1 }
                + char_len(&piece);

            if !current.is_empty() && projected > self.max_chunk_size {
                let finished = current.trim().to_string();
                current = overlap_tail(&finished, self.overlap);
                chunks.push(finished);
                if !current.is_empty() {
                    current.push(' ');
                }
            }

            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
            current.push_str(&piece);
        }

        let last = current.trim().to_string();
        if !last.is_empty() {
            // A trailing fragment below the minimum merges into its
            // predecessor rather than standing alone.
            if char_len(&last) < self.min_chunk_size {
                if let Some(prev) = chunks.last_mut() {
                    prev.push(' ');
                    prev.push_str(&last);
                } else {
                    chunks.push(last);
                }
            } else {
                chunks.push(last);
            }
        }

        chunks
    }
}

/// Split text into sentences, keeping each terminator attached.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        current.push(c);
        if SENTENCE_TERMINATORS.contains(&c) {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }

    sentences
}

/// Break an oversize sentence at whitespace into pieces within the budget.
/// A single word longer than the budget is hard-split at the budget so no
/// piece is ever empty.
fn split_at_whitespace(sentence: &str, max_size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for word in sentence.split_whitespace() {
        let word = if char_len(word) > max_size {
            // Pathological unbroken token; flush and hard-split it.
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            for slab in chars.chunks(max_size) {
                pieces.push(slab.iter().collect());
            }
            continue;
        } else {
            word
        };

        let projected =
            char_len(&current) + if current.is_empty() { 0 } else { 1 } + char_len(word);
        if !current.is_empty() && projected > max_size {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}

/// Tail of the previous chunk carried into the next, cut at a char
/// boundary and trimmed so the next chunk never starts mid-whitespace.
fn overlap_tail(chunk: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let chars: Vec<char> = chunk.chars().collect();
    let start = chars.len().saturating_sub(overlap);
    chars[start..].iter().collect::<String>().trim().to_string()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max: usize, overlap: usize, min: usize) -> SentenceChunker {
        SentenceChunker::with_sizes(max, overlap, min)
    }

    #[test]
    fn test_empty_input() {
        let c = chunker(100, 20, 10);
        assert!(c.chunk("").is_empty());
        assert!(c.chunk("   \n  ").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let c = chunker(100, 20, 5);
        let chunks = c.chunk("جملة قصيرة.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "جملة قصيرة.");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].total_chunks, 1);
    }

    #[test]
    fn test_sentences_not_split() {
        let c = chunker(50, 10, 5);
        let text = "الجملة الاولى هنا. الجملة الثانيه هنا؟ الجملة الثالثه هنا! الجملة الرابعه هنا.";
        let chunks = c.chunk(text);
        assert!(chunks.len() >= 2);
        // Every chunk ends at a sentence boundary (overlap fragments aside,
        // the packed tail always carries its terminator).
        for chunk in &chunks {
            let last = chunk.content.chars().last().unwrap();
            assert!(
                SENTENCE_TERMINATORS.contains(&last),
                "chunk does not end at a boundary: {:?}",
                chunk.content
            );
        }
    }

    #[test]
    fn test_overlap_carried() {
        let c = chunker(40, 15, 5);
        let text = "sentence number one right here. sentence number two right here. sentence number three right here.";
        let chunks = c.chunk(text);
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            let tail: String = {
                let chars: Vec<char> = pair[0].content.chars().collect();
                chars[chars.len().saturating_sub(15)..].iter().collect()
            };
            assert!(
                pair[1].content.starts_with(tail.trim()),
                "no overlap between {:?} and {:?}",
                pair[0].content,
                pair[1].content
            );
        }
    }

    #[test]
    fn test_oversize_sentence_splits_at_whitespace() {
        let c = chunker(20, 0, 1);
        let text = "كلمه كلمه كلمه كلمه كلمه كلمه كلمه كلمه كلمه كلمه";
        let chunks = c.chunk(text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.content.is_empty());
            assert!(chunk.content.chars().count() <= 20);
        }
    }

    #[test]
    fn test_single_word_longer_than_budget() {
        let c = chunker(10, 0, 1);
        let chunks = c.chunk("abcdefghijklmnopqrstuvwxyz");
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(!chunk.content.is_empty());
        }
    }

    #[test]
    fn test_positions_are_sequential() {
        let c = chunker(30, 5, 2);
        let text = "one two three. four five six. seven eight nine. ten eleven twelve.";
        let chunks = c.chunk(text);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.total_chunks, total);
        }
    }

    #[test]
    fn test_reconstruction_after_overlap_removal() {
        let c = chunker(60, 20, 2);
        let text = "alpha beta gamma delta. epsilon zeta eta theta. iota kappa lambda mu. nu xi omicron pi.";
        let chunks = c.chunk(text);

        let mut rebuilt = String::new();
        let mut prev: Option<&str> = None;
        for chunk in &chunks {
            let content = chunk.content.as_str();
            let body = match prev {
                Some(p) => {
                    let tail: String = {
                        let chars: Vec<char> = p.chars().collect();
                        chars[chars.len().saturating_sub(20)..].iter().collect()
                    };
                    content
                        .strip_prefix(tail.trim())
                        .unwrap_or(content)
                        .trim_start()
                }
                None => content,
            };
            if !rebuilt.is_empty() {
                rebuilt.push(' ');
            }
            rebuilt.push_str(body);
            prev = Some(content);
        }

        let collapse = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(collapse(&rebuilt), collapse(text));
    }

    #[test]
    fn test_deterministic() {
        let c = chunker(50, 10, 5);
        let text = "جملة اولى. جملة ثانيه. جملة ثالثه. جملة رابعه. جملة خامسه.";
        assert_eq!(c.chunk(text), {
            let again = c.chunk(text);
            again
        });
    }

    #[test]
    fn test_trailing_fragment_merges() {
        let c = chunker(40, 0, 15);
        let text = "a long enough first sentence here. ok.";
        let chunks = c.chunk(text);
        // "ok." is below the minimum and must not stand alone
        assert!(chunks.iter().all(|ch| ch.content.chars().count() >= 15
            || chunks.len() == 1));
    }
}
