//! Lowercase filter implementation.

use crate::analysis::token::Token;
use crate::analysis::token_filter::Filter;

/// A filter that converts tokens to lowercase.
///
/// ASCII-only tokens take the cheap in-place path; everything else goes
/// through Unicode-aware lowercasing.
#[derive(Clone, Debug, Default)]
pub struct LowercaseFilter;

impl LowercaseFilter {
    /// Create a new lowercase filter.
    pub fn new() -> Self {
        LowercaseFilter
    }
}

impl Filter for LowercaseFilter {
    fn filter(&self, mut tokens: Vec<Token>) -> Vec<Token> {
        for token in &mut tokens {
            if token.text.is_ascii() {
                token.text.make_ascii_lowercase();
            } else {
                token.text = token.text.to_lowercase();
            }
        }
        tokens
    }

    fn name(&self) -> &'static str {
        "lowercase"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_filter() {
        let tokens = vec![Token::new("The", 0), Token::new("QUICK", 1), Token::new("ÉCLAIR", 2)];
        let result = LowercaseFilter::new().filter(tokens);

        assert_eq!(result[0].text, "the");
        assert_eq!(result[1].text, "quick");
        assert_eq!(result[2].text, "éclair");
        assert_eq!(result[2].position, 2);
    }
}
