//! Token filter implementations for token transformation.

use crate::analysis::token::Token;

/// Trait for filters that transform token lists.
pub trait Filter: Send + Sync {
    /// Apply this filter to the tokens.
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token>;

    /// Get the name of this filter (for debugging and configuration).
    fn name(&self) -> &'static str;
}

pub mod lowercase;
pub mod stop;

pub use lowercase::LowercaseFilter;
pub use stop::StopFilter;
