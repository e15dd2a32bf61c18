//! Query complexity and sentiment scores.

use std::collections::HashSet;
use std::sync::LazyLock;

static POSITIVE_TERMS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "good", "great", "excellent", "fast", "love", "best", "happy", "helpful", "easy", "works",
        "working", "resolved", "success", "successful", "thanks", "awesome", "nice", "perfect",
        "reliable", "stable", "improved", "smooth",
    ]
    .into_iter()
    .collect()
});

static NEGATIVE_TERMS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "bad", "slow", "error", "fail", "failed", "failing", "failure", "broken", "crash",
        "crashed", "terrible", "hate", "worst", "problem", "bug", "wrong", "poor", "outage",
        "abend", "timeout", "unable", "awful", "frustrating", "stuck", "corrupt", "corrupted",
    ]
    .into_iter()
    .collect()
});

static NEGATIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "not", "no", "never", "don't", "dont", "doesn't", "isn't", "wasn't", "won't", "can't",
        "cannot", "without",
    ]
    .into_iter()
    .collect()
});

/// Complexity in [0, 1).
///
/// `1 - exp(-(token_weight * tokens + entity_weight * entities +
/// length_weight * avg_token_len))`: strictly increasing in each input for
/// positive weights, and 0 for an empty query.
pub fn complexity_score(
    tokens: usize,
    entities: usize,
    avg_token_len: f64,
    weights: (f64, f64, f64),
) -> f64 {
    if tokens == 0 && entities == 0 {
        return 0.0;
    }
    let (token_weight, entity_weight, length_weight) = weights;
    let raw = token_weight * tokens as f64
        + entity_weight * entities as f64
        + length_weight * avg_token_len.max(0.0);
    1.0 - (-raw).exp()
}

/// Sentiment in [-1, 1]; exactly 0 when no sentiment terms occur.
///
/// A negation word flips the polarity of the next token.
pub fn sentiment_score(tokens: &[String]) -> f64 {
    let mut positive = 0.0;
    let mut negative = 0.0;
    let mut negate = false;

    for token in tokens {
        let term = token.as_str();
        if NEGATIONS.contains(term) {
            negate = true;
            continue;
        }
        let polarity = if POSITIVE_TERMS.contains(term) {
            1
        } else if NEGATIVE_TERMS.contains(term) {
            -1
        } else {
            0
        };
        let polarity = if negate { -polarity } else { polarity };
        match polarity {
            1 => positive += 1.0,
            -1 => negative += 1.0,
            _ => {}
        }
        negate = false;
    }

    if positive + negative == 0.0 {
        0.0
    } else {
        (positive - negative) / (positive + negative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(String::from).collect()
    }

    const WEIGHTS: (f64, f64, f64) = (0.08, 0.25, 0.05);

    #[test]
    fn test_complexity_monotonic() {
        let base = complexity_score(2, 0, 4.0, WEIGHTS);
        assert!(complexity_score(3, 0, 4.0, WEIGHTS) > base);
        assert!(complexity_score(2, 1, 4.0, WEIGHTS) > base);
        assert!(complexity_score(2, 0, 5.0, WEIGHTS) > base);
        assert!(base > 0.0 && base < 1.0);
        assert_eq!(complexity_score(0, 0, 0.0, WEIGHTS), 0.0);
    }

    #[test]
    fn test_sentiment_polarity() {
        assert!(sentiment_score(&tokens("great fast search")) > 0.0);
        assert!(sentiment_score(&tokens("terrible slow results")) < 0.0);
        assert_eq!(sentiment_score(&tokens("db2 table layout")), 0.0);
        assert_eq!(sentiment_score(&[]), 0.0);
    }

    #[test]
    fn test_negation_flips() {
        assert!(sentiment_score(&tokens("not good")) < 0.0);
        assert!(sentiment_score(&tokens("no problem")) > 0.0);
        assert_eq!(sentiment_score(&tokens("good bad")), 0.0);
    }
}
