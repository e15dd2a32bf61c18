//! Standard analyzer: Unicode words, lowercased, English stop words removed.
//!
//! # Pipeline
//!
//! 1. Truncate to the character budget
//! 2. UnicodeWordTokenizer
//! 3. LowercaseFilter
//! 4. StopFilter (33 common English stop words)
//! 5. Cap at the token budget

use crate::analysis::analyzer::Analyzer;
use crate::analysis::token::Token;
use crate::analysis::token_filter::{Filter, LowercaseFilter, StopFilter};
use crate::analysis::tokenizer::{Tokenizer, UnicodeWordTokenizer};
use crate::analysis::{DEFAULT_MAX_CHARS, DEFAULT_MAX_TOKENS, truncate_chars};

/// The analyzer used for matching terms.
#[derive(Clone, Debug)]
pub struct StandardAnalyzer {
    tokenizer: UnicodeWordTokenizer,
    lowercase: LowercaseFilter,
    stop: StopFilter,
    max_chars: usize,
    max_tokens: usize,
}

impl StandardAnalyzer {
    /// Create a new standard analyzer with the default budgets.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_CHARS, DEFAULT_MAX_TOKENS)
    }

    /// Create a standard analyzer with explicit character and token budgets.
    pub fn with_limits(max_chars: usize, max_tokens: usize) -> Self {
        StandardAnalyzer {
            tokenizer: UnicodeWordTokenizer::new(),
            lowercase: LowercaseFilter::new(),
            stop: StopFilter::new(),
            max_chars,
            max_tokens,
        }
    }

    /// Replace the stop word filter.
    pub fn with_stop_filter(mut self, stop: StopFilter) -> Self {
        self.stop = stop;
        self
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }
}

impl Default for StandardAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze_tokens(&self, text: &str) -> Vec<Token> {
        let tokens = self.tokenizer.tokenize(truncate_chars(text, self.max_chars));
        let mut tokens = self.stop.filter(self.lowercase.filter(tokens));
        tokens.truncate(self.max_tokens);
        tokens
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_analyzer() {
        let analyzer = StandardAnalyzer::new();
        assert_eq!(
            analyzer.analyze("Hello the world and test"),
            vec!["hello", "world", "test"]
        );
    }

    #[test]
    fn test_budgets_bound_output() {
        let analyzer = StandardAnalyzer::with_limits(11, 1);
        assert_eq!(analyzer.analyze("VSAM status 35"), vec!["vsam"]);

        let long = "abend ".repeat(10_000);
        assert_eq!(StandardAnalyzer::new().analyze(&long).len(), DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_custom_stop_filter() {
        let analyzer = StandardAnalyzer::new().with_stop_filter(StopFilter::from_words(["how"]));
        assert_eq!(analyzer.analyze("How to reset"), vec!["to", "reset"]);
    }
}
