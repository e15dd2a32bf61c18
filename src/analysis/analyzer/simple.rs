//! Simple analyzer: Unicode words, lowercased, nothing removed.
//!
//! Used where function words matter, such as intent cues ("how", "vs") and
//! sentiment negation ("not").

use crate::analysis::analyzer::Analyzer;
use crate::analysis::token::Token;
use crate::analysis::token_filter::{Filter, LowercaseFilter};
use crate::analysis::tokenizer::{Tokenizer, UnicodeWordTokenizer};
use crate::analysis::{DEFAULT_MAX_CHARS, DEFAULT_MAX_TOKENS, truncate_chars};

/// A lowercasing analyzer without stop word removal.
#[derive(Clone, Debug)]
pub struct SimpleAnalyzer {
    tokenizer: UnicodeWordTokenizer,
    lowercase: LowercaseFilter,
    max_chars: usize,
    max_tokens: usize,
}

impl SimpleAnalyzer {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_CHARS, DEFAULT_MAX_TOKENS)
    }

    pub fn with_limits(max_chars: usize, max_tokens: usize) -> Self {
        SimpleAnalyzer {
            tokenizer: UnicodeWordTokenizer::new(),
            lowercase: LowercaseFilter::new(),
            max_chars,
            max_tokens,
        }
    }
}

impl Default for SimpleAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for SimpleAnalyzer {
    fn analyze_tokens(&self, text: &str) -> Vec<Token> {
        let mut tokens = self
            .lowercase
            .filter(self.tokenizer.tokenize(truncate_chars(text, self.max_chars)));
        tokens.truncate(self.max_tokens);
        tokens
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}
