//! Query routing.
//!
//! Classifies each normalized query into one of four handler routes
//! before any model is touched. Roughly a third of real traffic is
//! greetings, pleasantries, or arithmetic; skipping retrieval and
//! generation for those queries is a direct cost and latency win.

mod calculator;

pub use calculator::{evaluate, format_result, is_expression};

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::config::RouterConfig;

/// The closed set of query handler routes, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryRoute {
    Greeting,
    Calculator,
    Simple,
    Rag,
}

impl QueryRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryRoute::Greeting => "greeting",
            QueryRoute::Calculator => "calculator",
            QueryRoute::Simple => "simple",
            QueryRoute::Rag => "rag",
        }
    }
}

/// Greeting phrases, Arabic and Latin. Matched against the normalized
/// query with punctuation stripped, so Alef and Taa-marbuta variants are
/// already folded.
static GREETINGS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^مرحبا$",
        r"^اهلا( وسهلا)?$",
        r"^هلا$",
        r"^سلام$",
        r"^السلام عليكم( ورحمه الله( وبركاته)?)?$",
        r"^صباح (الخير|النور)$",
        r"^مساء (الخير|النور)$",
        r"^ازيك$",
        r"^كيف حالك$",
        r"^تحيه طيبه$",
        r"^(?i)hello$",
        r"^(?i)hi$",
        r"^(?i)hey$",
        r"^(?i)good morning$",
        r"^(?i)good evening$",
        r"^(?i)greetings$",
        r"^(?i)salam$",
    ])
    .expect("greeting patterns are valid")
});

/// Question words that signal a factual lookup; their presence pushes a
/// short query to the rag route. Arabic forms are post-normalization.
static QUESTION_WORDS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(^| )ما( |$)",
        r"(^| )ماذا( |$)",
        r"(^| )متي( |$)",
        r"(^| )اين( |$)",
        r"(^| )كيف( |$)",
        r"(^| )لماذا( |$)",
        r"(^| )من( |$)",
        r"(^| )كم( |$)",
        r"(?i)(^| )what( |$)",
        r"(?i)(^| )what's( |$)",
        r"(?i)(^| )why( |$)",
        r"(?i)(^| )when( |$)",
        r"(?i)(^| )where( |$)",
        r"(?i)(^| )who( |$)",
        r"(?i)(^| )how( |$)",
        r"(?i)(^| )which( |$)",
    ])
    .expect("question-word patterns are valid")
});

/// Rule-based query router. Deterministic; classification never fails.
pub struct QueryRouter {
    simple_max_tokens: usize,
    calculator_max_len: usize,
}

impl QueryRouter {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            simple_max_tokens: config.simple_max_tokens,
            calculator_max_len: config.calculator_max_len,
        }
    }

    /// Classify a normalized query. Priority: greeting beats calculator
    /// beats simple beats rag. Empty input classifies as simple and the
    /// handler produces a help reply.
    pub fn classify(&self, query: &str) -> QueryRoute {
        let query = query.trim();
        if query.is_empty() {
            return QueryRoute::Simple;
        }

        let stripped = strip_punctuation(query);

        if GREETINGS.is_match(&stripped) {
            return QueryRoute::Greeting;
        }

        // Overlong "arithmetic" is more likely pasted data than a sum;
        // it goes to retrieval rather than the evaluator.
        if is_expression(query) {
            return if query.chars().count() <= self.calculator_max_len {
                QueryRoute::Calculator
            } else {
                QueryRoute::Rag
            };
        }

        let token_count = query.split_whitespace().count();
        if token_count < self.simple_max_tokens && !QUESTION_WORDS.is_match(&stripped) {
            return QueryRoute::Simple;
        }

        QueryRoute::Rag
    }
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self::new(&RouterConfig::default())
    }
}

/// Drop punctuation and collapse the leftovers for phrase matching.
fn strip_punctuation(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
