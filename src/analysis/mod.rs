//! Text analysis for queries.
//!
//! Queries are short, so analysis works on owned vectors instead of token
//! streams. Every entry point bounds its input: text is cut to a character
//! budget before tokenizing and the token list to a token budget after.

pub mod analyzer;
pub mod token;
pub mod token_filter;
pub mod tokenizer;

pub use analyzer::{Analyzer, SimpleAnalyzer, StandardAnalyzer};
pub use token::Token;
pub use token_filter::{Filter, LowercaseFilter, StopFilter};
pub use tokenizer::{Tokenizer, UnicodeWordTokenizer};

/// Default character budget for analyzed text.
pub const DEFAULT_MAX_CHARS: usize = 1024;

/// Default token budget for analyzed text.
pub const DEFAULT_MAX_TOKENS: usize = 64;

/// The longest prefix of `text` with at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Canonical form of a query used as a lookup key: truncated to
/// `max_chars`, lowercased, inner whitespace collapsed to single spaces.
pub fn normalize_query(query: &str, max_chars: usize) -> String {
    truncate_chars(query, max_chars)
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
