//! Semantic query understanding.
//!
//! [`SemanticEnhancer`] combines a concept graph, an intent classifier, an
//! entity recognizer and a hashing embedder into one trainable model.

pub mod concept_graph;
pub mod embedding;
pub mod enhancer;
pub mod entities;
pub mod intent;
pub mod scoring;
pub mod synonyms;
pub mod tfidf;

use serde::{Deserialize, Serialize};

pub use concept_graph::{ConceptGraph, ConceptNode};
pub use embedding::HashingEmbedder;
pub use enhancer::SemanticEnhancer;
pub use entities::{EntityRecognizer, ExtractedEntity};
pub use intent::{CentroidIntentClassifier, IntentClassifier, IntentPrediction, KeywordIntentClassifier};
pub use synonyms::SynonymDictionary;

/// Intent reported when no classifier is confident enough.
pub const UNKNOWN_INTENT: &str = "unknown";

/// Where an expansion term came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionType {
    Synonym,
    RelatedConcept,
}

/// A term added to a query by expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expansion {
    pub term: String,
    pub expansion_type: ExpansionType,
    pub weight: f64,
}

/// Result of enhancing a single query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEnhancement {
    pub original_query: String,
    /// The original query with expansion terms appended.
    pub expanded_query: String,
    pub intent: String,
    pub intent_confidence: f64,
    pub entities: Vec<ExtractedEntity>,
    /// Fixed-length, L2-normalized query embedding.
    pub embedding: Vec<f64>,
    pub synonyms: Vec<String>,
    pub expansions: Vec<Expansion>,
}

/// Configuration for the semantic enhancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    /// Minimum confidence to report an intent instead of `unknown`.
    pub intent_threshold: f64,
    /// Maximum number of expansion terms appended to a query.
    pub max_expansions: usize,
    /// Minimum concept graph edge weight used for expansion.
    pub min_edge_weight: f64,
    /// Weight given to synonym expansions.
    pub synonym_weight: f64,
    /// Maximum related concepts kept per node.
    pub max_related: usize,
    /// Embedding dimension.
    pub embedding_dim: usize,
    /// Longest query (in chars) that is analyzed.
    pub max_query_chars: usize,
    /// Longest prefix (in chars) scanned for entities.
    pub max_entity_scan_chars: usize,
    /// Complexity weight per token.
    pub complexity_token_weight: f64,
    /// Complexity weight per entity.
    pub complexity_entity_weight: f64,
    /// Complexity weight per character of average token length.
    pub complexity_length_weight: f64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        SemanticConfig {
            intent_threshold: 0.3,
            max_expansions: 5,
            min_edge_weight: 0.2,
            synonym_weight: 0.8,
            max_related: 20,
            embedding_dim: 64,
            max_query_chars: 1024,
            max_entity_scan_chars: 2048,
            complexity_token_weight: 0.08,
            complexity_entity_weight: 0.25,
            complexity_length_weight: 0.05,
        }
    }
}

impl SemanticConfig {
    /// Candidate configurations for hyperparameter tuning.
    pub fn tuning_grid(&self) -> Vec<Self> {
        let mut grid = Vec::new();
        for intent_threshold in [0.2, 0.3, 0.4] {
            for min_edge_weight in [0.1, 0.25] {
                grid.push(SemanticConfig {
                    intent_threshold,
                    min_edge_weight,
                    ..self.clone()
                });
            }
        }
        grid
    }
}
