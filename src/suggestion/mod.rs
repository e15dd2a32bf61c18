//! Query suggestions.
//!
//! [`QuerySuggestionEngine`] answers prefix lookups from a trained
//! [`SuggestionIndex`] and blends in per-user history kept in a shared
//! [`UserContextStore`].

pub mod engine;
pub mod index;
pub mod user_context;

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use engine::QuerySuggestionEngine;
pub use index::{DEFAULT_NODE_CAPACITY, QueryStats, SuggestionIndex};
pub use user_context::{InteractionEvent, UserContext, UserContextConfig, UserContextStore};

/// Where a suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    /// The requesting user's own history.
    Personalized,
    /// Prefix match in the trained index.
    Trie,
    /// Globally most frequent queries (empty prefix).
    Frequency,
}

impl SuggestionSource {
    /// Tie-break priority; higher wins.
    pub fn priority(&self) -> u8 {
        match self {
            SuggestionSource::Personalized => 2,
            SuggestionSource::Trie => 1,
            SuggestionSource::Frequency => 0,
        }
    }
}

/// A suggested query completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionEntry {
    /// The suggested query text.
    pub text: String,
    /// Confidence score (0.0 to 1.0).
    pub confidence: f64,
    pub source: SuggestionSource,
    pub metadata: HashMap<String, String>,
}

impl SuggestionEntry {
    pub fn new(text: impl Into<String>, confidence: f64, source: SuggestionSource) -> Self {
        SuggestionEntry {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Order: confidence descending, then source priority, then text.
pub fn compare_suggestions(a: &SuggestionEntry, b: &SuggestionEntry) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.source.priority().cmp(&a.source.priority()))
        .then_with(|| a.text.cmp(&b.text))
}

/// Configuration for query suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    /// Longest query (in chars) that is indexed or looked up.
    pub max_query_chars: usize,
    /// Half-life of search log weight, in days.
    pub recency_half_life_days: f64,
    /// Weight multiplier for clicked search log entries.
    pub click_weight: f64,
    /// Confidence added to queries from the user's own history.
    pub personalization_boost: f64,
    /// Heaviest completions cached under every prefix.
    pub prefix_candidates: usize,
    /// How many suggestions count as a hit during evaluation.
    pub eval_top_k: usize,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        SuggestionConfig {
            max_query_chars: 256,
            recency_half_life_days: 30.0,
            click_weight: 2.0,
            personalization_boost: 0.5,
            prefix_candidates: DEFAULT_NODE_CAPACITY,
            eval_top_k: 5,
        }
    }
}

impl SuggestionConfig {
    /// Candidate configurations for hyperparameter tuning.
    pub fn tuning_grid(&self) -> Vec<Self> {
        let mut grid = Vec::new();
        for half_life in [7.0, 30.0, 90.0] {
            for click_weight in [1.5, 3.0] {
                grid.push(SuggestionConfig {
                    recency_half_life_days: half_life,
                    click_weight,
                    ..self.clone()
                });
            }
        }
        grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_breaks_ties_by_source() {
        let mut entries = vec![
            SuggestionEntry::new("b", 0.8, SuggestionSource::Frequency),
            SuggestionEntry::new("a", 0.8, SuggestionSource::Trie),
            SuggestionEntry::new("c", 0.8, SuggestionSource::Personalized),
            SuggestionEntry::new("d", 0.9, SuggestionSource::Frequency),
        ];
        entries.sort_by(compare_suggestions);
        let texts: Vec<_> = entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["d", "c", "a", "b"]);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(
            SuggestionEntry::new("x", 1.7, SuggestionSource::Trie).confidence,
            1.0
        );
        assert_eq!(
            SuggestionEntry::new("x", -0.2, SuggestionSource::Trie).confidence,
            0.0
        );
    }
}
