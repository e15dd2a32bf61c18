//! Core analyzer trait definition.
//!
//! An analyzer is the complete text processing pipeline:
//!
//! ```text
//! Raw Text → truncate → Tokenizer → Filter 1 … Filter N → cap → Terms
//! ```
//!
//! # Examples
//!
//! ```
//! use xiphos::analysis::{Analyzer, StandardAnalyzer};
//!
//! let analyzer = StandardAnalyzer::new();
//! assert_eq!(analyzer.analyze("The CICS region is down"), vec!["cics", "region", "down"]);
//! ```

use crate::analysis::token::Token;

/// Trait for analyzers that convert text into processed terms.
///
/// The trait requires `Send + Sync` so analyzers can live inside models
/// that are shared across threads.
pub trait Analyzer: Send + Sync {
    /// Run the full pipeline and keep token positions and offsets.
    fn analyze_tokens(&self, text: &str) -> Vec<Token>;

    /// Get the name of this analyzer (for debugging and configuration).
    fn name(&self) -> &'static str;

    /// Run the full pipeline and return the term texts in order.
    fn analyze(&self, text: &str) -> Vec<String> {
        self.analyze_tokens(text)
            .into_iter()
            .map(|token| token.text)
            .collect()
    }
}
