//! Intent classification.
//!
//! Two classifiers share the [`IntentClassifier`] trait: a TF-IDF centroid
//! classifier trained from labeled queries, and a keyword classifier over
//! the built-in intents used when no labeled data exists.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::semantic::UNKNOWN_INTENT;
use crate::semantic::tfidf::{SparseVector, TfIdfVectorizer, dot, normalize};

/// A predicted intent with its confidence in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentPrediction {
    pub intent: String,
    pub confidence: f64,
}

impl IntentPrediction {
    pub fn unknown() -> Self {
        IntentPrediction {
            intent: UNKNOWN_INTENT.to_string(),
            confidence: 0.0,
        }
    }
}

/// Trait for intent classifiers working on analyzed tokens.
pub trait IntentClassifier: Send + Sync {
    /// Predict the intent of an analyzed query.
    fn predict(&self, tokens: &[String]) -> IntentPrediction;

    /// Get the name of this classifier.
    fn name(&self) -> &str;
}

/// TF-IDF centroid classifier.
///
/// Each intent is represented by the normalized mean of its training
/// vectors; a query is assigned to the intent with the highest cosine
/// similarity, which doubles as the confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidIntentClassifier {
    vectorizer: TfIdfVectorizer,
    centroids: BTreeMap<String, SparseVector>,
}

impl CentroidIntentClassifier {
    /// Train from (tokens, intent) samples. Returns `None` without samples.
    pub fn train(samples: &[(Vec<String>, String)]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let documents: Vec<Vec<String>> = samples.iter().map(|(t, _)| t.clone()).collect();
        let mut vectorizer = TfIdfVectorizer::new();
        vectorizer.fit(&documents);

        let mut sums: BTreeMap<String, SparseVector> = BTreeMap::new();
        for (tokens, intent) in samples {
            let vector = vectorizer.transform(tokens);
            let centroid = sums.entry(intent.clone()).or_default();
            for (idx, w) in vector {
                *centroid.entry(idx).or_insert(0.0) += w;
            }
        }
        for centroid in sums.values_mut() {
            normalize(centroid);
        }

        Some(CentroidIntentClassifier {
            vectorizer,
            centroids: sums,
        })
    }

    pub fn intents(&self) -> impl Iterator<Item = &str> {
        self.centroids.keys().map(String::as_str)
    }

    pub fn vectorizer(&self) -> &TfIdfVectorizer {
        &self.vectorizer
    }
}

impl IntentClassifier for CentroidIntentClassifier {
    fn predict(&self, tokens: &[String]) -> IntentPrediction {
        let query = self.vectorizer.transform(tokens);
        if query.is_empty() {
            return IntentPrediction::unknown();
        }
        let mut best = IntentPrediction::unknown();
        for (intent, centroid) in &self.centroids {
            let score = dot(&query, centroid).clamp(0.0, 1.0);
            if score > best.confidence {
                best = IntentPrediction {
                    intent: intent.clone(),
                    confidence: score,
                };
            }
        }
        best
    }

    fn name(&self) -> &str {
        "centroid"
    }
}

/// Keyword-based intent classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordIntentClassifier {
    keywords: BTreeMap<String, HashSet<String>>,
}

impl KeywordIntentClassifier {
    pub fn new(keywords: BTreeMap<String, HashSet<String>>) -> Self {
        KeywordIntentClassifier { keywords }
    }
}

impl Default for KeywordIntentClassifier {
    fn default() -> Self {
        let groups: [(&str, &[&str]); 4] = [
            (
                "search",
                &["find", "search", "lookup", "show", "list", "where", "which", "get"],
            ),
            (
                "help",
                &[
                    "how", "help", "fix", "troubleshoot", "why", "guide", "resolve", "solve",
                    "tutorial", "explain",
                ],
            ),
            (
                "navigate",
                &["go", "open", "page", "homepage", "dashboard", "settings", "portal", "link"],
            ),
            (
                "compare",
                &["vs", "versus", "compare", "comparison", "difference", "better", "between"],
            ),
        ];
        KeywordIntentClassifier::new(
            groups
                .iter()
                .map(|(intent, words)| {
                    (
                        intent.to_string(),
                        words.iter().map(|w| w.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }
}

impl IntentClassifier for KeywordIntentClassifier {
    fn predict(&self, tokens: &[String]) -> IntentPrediction {
        if tokens.is_empty() {
            return IntentPrediction::unknown();
        }
        let mut best = IntentPrediction::unknown();
        let mut best_hits = 0;
        for (intent, words) in &self.keywords {
            let hits = tokens.iter().filter(|t| words.contains(t.as_str())).count();
            if hits > best_hits {
                best_hits = hits;
                best = IntentPrediction {
                    intent: intent.clone(),
                    confidence: (0.4 + 0.6 * hits as f64 / tokens.len() as f64).min(1.0),
                };
            }
        }
        best
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// The classifier held by a trained enhancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntentModel {
    Keyword(KeywordIntentClassifier),
    Centroid(CentroidIntentClassifier),
}

impl IntentModel {
    pub fn classifier(&self) -> &dyn IntentClassifier {
        match self {
            IntentModel::Keyword(c) => c,
            IntentModel::Centroid(c) => c,
        }
    }
}

impl Default for IntentModel {
    fn default() -> Self {
        IntentModel::Keyword(KeywordIntentClassifier::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(String::from).collect()
    }

    fn samples() -> Vec<(Vec<String>, String)> {
        [
            ("how to fix cics abend", "troubleshooting"),
            ("fix db2 deadlock error", "troubleshooting"),
            ("resolve jcl error", "troubleshooting"),
            ("vsam file layout", "reference"),
            ("cobol copybook layout", "reference"),
            ("ims segment layout reference", "reference"),
        ]
        .iter()
        .map(|(q, i)| (tokens(q), i.to_string()))
        .collect()
    }

    #[test]
    fn test_centroid_classifier() {
        let classifier = CentroidIntentClassifier::train(&samples()).unwrap();
        assert_eq!(classifier.intents().count(), 2);

        let prediction = classifier.predict(&tokens("fix abend error"));
        assert_eq!(prediction.intent, "troubleshooting");
        assert!(prediction.confidence > 0.3);

        let prediction = classifier.predict(&tokens("record layout"));
        assert_eq!(prediction.intent, "reference");
    }

    #[test]
    fn test_centroid_unknown_vocabulary() {
        let classifier = CentroidIntentClassifier::train(&samples()).unwrap();
        assert_eq!(
            classifier.predict(&tokens("zebra")).intent,
            UNKNOWN_INTENT
        );
        assert!(CentroidIntentClassifier::train(&[]).is_none());
    }

    #[test]
    fn test_keyword_classifier() {
        let classifier = KeywordIntentClassifier::default();
        assert_eq!(classifier.predict(&tokens("db2 vs oracle")).intent, "compare");
        assert_eq!(classifier.predict(&tokens("how do i fix this")).intent, "help");
        assert_eq!(classifier.predict(&tokens("mainframe")).intent, UNKNOWN_INTENT);
        assert_eq!(classifier.predict(&[]).confidence, 0.0);
    }
}
