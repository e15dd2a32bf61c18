//! Semantic enhancer: intent, entities, expansion, embeddings and scores.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{Analyzer, DEFAULT_MAX_TOKENS, SimpleAnalyzer, StandardAnalyzer, truncate_chars};
use crate::data::TrainingData;
use crate::error::Result;
use crate::ml::{ConfusionCounts, Evaluation, ModelKind, TrainableModel, f1};
use crate::semantic::concept_graph::{ConceptGraph, ConceptGraphBuilder, ConceptObservation};
use crate::semantic::embedding::HashingEmbedder;
use crate::semantic::entities::EntityRecognizer;
use crate::semantic::intent::{CentroidIntentClassifier, IntentModel};
use crate::semantic::scoring::{complexity_score, sentiment_score};
use crate::semantic::synonyms::SynonymDictionary;
use crate::semantic::{ExpansionType, QueryEnhancement, SemanticConfig, UNKNOWN_INTENT};

#[derive(Serialize, Deserialize)]
struct EnhancerSnapshot {
    config: SemanticConfig,
    graph: ConceptGraph,
    intent_model: IntentModel,
    recognizer: EntityRecognizer,
    embedder: HashingEmbedder,
    trained_at: Option<DateTime<Utc>>,
    training_samples: usize,
    feature_importance: Vec<(String, f64)>,
}

/// Trainable semantic query enhancer.
#[derive(Debug, Clone)]
pub struct SemanticEnhancer {
    config: SemanticConfig,
    /// Content terms (stop words removed): concepts, expansion, embedding.
    analyzer: StandardAnalyzer,
    /// All words: intent, entities, complexity, sentiment.
    word_analyzer: SimpleAnalyzer,
    graph: ConceptGraph,
    intent_model: IntentModel,
    recognizer: EntityRecognizer,
    embedder: HashingEmbedder,
    trained_at: Option<DateTime<Utc>>,
    training_samples: usize,
    feature_importance: Vec<(String, f64)>,
}

impl SemanticEnhancer {
    pub fn new(config: SemanticConfig) -> Self {
        SemanticEnhancer {
            analyzer: StandardAnalyzer::with_limits(config.max_query_chars, DEFAULT_MAX_TOKENS),
            word_analyzer: SimpleAnalyzer::with_limits(config.max_query_chars, DEFAULT_MAX_TOKENS),
            graph: ConceptGraph::seeded(),
            intent_model: IntentModel::default(),
            recognizer: EntityRecognizer::new(config.max_entity_scan_chars),
            embedder: HashingEmbedder::new(config.embedding_dim),
            trained_at: None,
            training_samples: 0,
            feature_importance: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &SemanticConfig {
        &self.config
    }

    pub fn graph(&self) -> &ConceptGraph {
        &self.graph
    }

    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.trained_at
    }

    /// Name of the active intent classifier.
    pub fn intent_classifier_name(&self) -> &str {
        self.intent_model.classifier().name()
    }

    /// Enhance a query. Never fails; input beyond the configured length is
    /// ignored.
    pub fn enhance_query(&self, query: &str) -> QueryEnhancement {
        let text = truncate_chars(query, self.config.max_query_chars);
        let terms = self.analyzer.analyze(text);
        let words = self.word_analyzer.analyze(text);

        let (intent, intent_confidence) = self.classify(&words);
        let entities = self.recognizer.extract(text, &words);
        let expansions = self.graph.expand(
            &terms,
            self.config.max_expansions,
            self.config.min_edge_weight,
            self.config.synonym_weight,
        );

        let expanded_query = if expansions.is_empty() {
            text.to_string()
        } else {
            let added: Vec<&str> = expansions.iter().map(|e| e.term.as_str()).collect();
            format!("{text} {}", added.join(" "))
        };
        let synonyms = expansions
            .iter()
            .filter(|e| e.expansion_type == ExpansionType::Synonym)
            .map(|e| e.term.clone())
            .collect();

        QueryEnhancement {
            original_query: text.to_string(),
            expanded_query,
            intent,
            intent_confidence,
            entities,
            embedding: self.embedder.embed(&terms),
            synonyms,
            expansions,
        }
    }

    /// Complexity in [0, 1); grows with token count, entity count and
    /// average token length. Empty input scores 0.
    pub fn analyze_query_complexity(&self, query: &str) -> f64 {
        let text = truncate_chars(query, self.config.max_query_chars);
        let words = self.word_analyzer.analyze(text);
        let entities = self.recognizer.extract(text, &words).len();
        let avg_len = if words.is_empty() {
            0.0
        } else {
            words.iter().map(|w| w.chars().count()).sum::<usize>() as f64 / words.len() as f64
        };
        complexity_score(
            words.len(),
            entities,
            avg_len,
            (
                self.config.complexity_token_weight,
                self.config.complexity_entity_weight,
                self.config.complexity_length_weight,
            ),
        )
    }

    /// Sentiment in [-1, 1]; 0 when the query carries no sentiment terms.
    pub fn analyze_sentiment(&self, query: &str) -> f64 {
        sentiment_score(&self.word_analyzer.analyze(query))
    }

    /// Majority category of the query's known concepts.
    pub fn categorize(&self, query: &str) -> Option<String> {
        let mut votes: BTreeMap<&str, u64> = BTreeMap::new();
        for term in self.analyzer.analyze(query) {
            if let Some(node) = self.graph.get(&term) {
                *votes.entry(node.category.as_str()).or_insert(0) += node.frequency;
            }
        }
        votes
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(c, _)| c.to_string())
    }

    fn classify(&self, words: &[String]) -> (String, f64) {
        let prediction = self.intent_model.classifier().predict(words);
        if prediction.intent != UNKNOWN_INTENT
            && prediction.confidence >= self.config.intent_threshold
        {
            (prediction.intent, prediction.confidence)
        } else {
            (UNKNOWN_INTENT.to_string(), prediction.confidence)
        }
    }

    /// (tokens, intent) pairs from categorical labels and annotations.
    fn intent_samples(&self, data: &TrainingData) -> Vec<(Vec<String>, String)> {
        let mut samples: Vec<(Vec<String>, String)> = data
            .samples()
            .filter_map(|(query, label)| {
                let intent = label.as_category()?.trim().to_lowercase();
                (!intent.is_empty()).then(|| (self.word_analyzer.analyze(query), intent))
            })
            .collect();
        for annotation in &data.metadata.semantic_annotations {
            if let Some(intent) = &annotation.intent {
                let intent = intent.trim().to_lowercase();
                if !intent.is_empty() {
                    samples.push((self.word_analyzer.analyze(&annotation.query), intent));
                }
            }
        }
        samples.retain(|(tokens, _)| !tokens.is_empty());
        samples
    }
}

impl Default for SemanticEnhancer {
    fn default() -> Self {
        Self::new(SemanticConfig::default())
    }
}

impl TrainableModel for SemanticEnhancer {
    fn kind(&self) -> ModelKind {
        ModelKind::SemanticSearch
    }

    fn train(&mut self, data: &TrainingData) -> Result<Evaluation> {
        let data = data.normalized();
        let mut builder = ConceptGraphBuilder::new(SynonymDictionary::with_seed_groups());
        let mut recognizer = EntityRecognizer::new(self.config.max_entity_scan_chars);
        let mut documents = Vec::with_capacity(data.len());

        for (query, label) in data.samples() {
            let terms = self.analyzer.analyze(query);
            builder.observe(ConceptObservation {
                concepts: terms.clone(),
                category: label.as_category().map(|c| c.trim().to_lowercase()),
                explicit_category: false,
            });
            documents.push(terms);
        }

        for annotation in &data.metadata.semantic_annotations {
            let concepts: Vec<String> = annotation
                .concepts
                .iter()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect();
            let mut terms = self.analyzer.analyze(&annotation.query);
            documents.push(terms.clone());
            terms.extend(concepts.iter().cloned());
            builder.observe(ConceptObservation {
                concepts: terms,
                category: annotation.category.as_ref().map(|c| c.trim().to_lowercase()),
                explicit_category: false,
            });
            if let Some(category) = &annotation.category {
                for concept in &concepts {
                    builder.assign_category(concept, category);
                }
            }
            if !annotation.synonyms.is_empty() {
                let mut group: Vec<String> = concepts.first().cloned().into_iter().collect();
                group.extend(annotation.synonyms.iter().cloned());
                builder.add_synonym_group(group);
            }
            for entity in &annotation.entities {
                recognizer.add_entity(&entity.entity_type, &entity.value);
            }
        }

        let intent_samples = self.intent_samples(&data);
        self.intent_model = CentroidIntentClassifier::train(&intent_samples)
            .map(IntentModel::Centroid)
            .unwrap_or_default();
        self.graph = builder.build(self.config.max_related);
        self.recognizer = recognizer;
        self.embedder = HashingEmbedder::new(self.config.embedding_dim);
        self.embedder.fit(&documents);

        let intents = intent_samples.len() as f64;
        let concepts = self.graph.len() as f64;
        let entities = self.recognizer.gazetteer_len() as f64;
        let total = intents + concepts + entities;
        self.feature_importance = if total > 0.0 {
            vec![
                ("intent".to_string(), intents / total),
                ("concepts".to_string(), concepts / total),
                ("entities".to_string(), entities / total),
            ]
        } else {
            Vec::new()
        };

        self.training_samples = data.len() + data.metadata.semantic_annotations.len();
        self.trained_at = Some(Utc::now());
        log::debug!(
            "Semantic enhancer trained: {} concepts, {} intent samples, {} gazetteer entries, classifier {}",
            self.graph.len(),
            intent_samples.len(),
            self.recognizer.gazetteer_len(),
            self.intent_classifier_name()
        );
        Ok(self.evaluate(&data))
    }

    fn evaluate(&self, data: &TrainingData) -> Evaluation {
        let samples = self.intent_samples(data);
        let mut evaluation = if samples.is_empty() {
            let coverages: Vec<f64> = data
                .features
                .iter()
                .map(|q| self.graph.coverage(&self.analyzer.analyze(q)))
                .collect();
            let coverage = if coverages.is_empty() {
                0.0
            } else {
                coverages.iter().sum::<f64>() / coverages.len() as f64
            };
            Evaluation {
                accuracy: coverage,
                precision: coverage,
                recall: coverage,
                f1_score: coverage,
                ..Default::default()
            }
        } else {
            let mut per_class: BTreeMap<String, ConfusionCounts> = BTreeMap::new();
            let mut correct = 0;
            for (tokens, actual) in &samples {
                let (predicted, _) = self.classify(tokens);
                if &predicted == actual {
                    correct += 1;
                }
                let classes: BTreeSet<&String> = [&predicted, actual].into_iter().collect();
                for class in classes {
                    per_class
                        .entry(class.clone())
                        .or_default()
                        .record(&predicted == class, actual == class);
                }
            }
            per_class.remove(UNKNOWN_INTENT);
            let actual_classes: BTreeSet<&str> = samples.iter().map(|(_, a)| a.as_str()).collect();
            let (mut precision, mut recall) = (0.0, 0.0);
            for class in &actual_classes {
                if let Some(counts) = per_class.get(*class) {
                    let class_eval = Evaluation::from_confusion(*counts);
                    precision += class_eval.precision;
                    recall += class_eval.recall;
                }
            }
            let n_classes = actual_classes.len().max(1) as f64;
            let (precision, recall) = (precision / n_classes, recall / n_classes);
            Evaluation {
                accuracy: correct as f64 / samples.len() as f64,
                precision,
                recall,
                f1_score: f1(precision, recall),
                ..Default::default()
            }
        };
        evaluation.feature_importance = self.feature_importance.iter().cloned().collect();
        evaluation
    }

    fn is_trained(&self) -> bool {
        self.trained_at.is_some()
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = EnhancerSnapshot {
            config: self.config.clone(),
            graph: self.graph.clone(),
            intent_model: self.intent_model.clone(),
            recognizer: self.recognizer.clone(),
            embedder: self.embedder.clone(),
            trained_at: self.trained_at,
            training_samples: self.training_samples,
            feature_importance: self.feature_importance.clone(),
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    fn restore(&mut self, bytes: &[u8]) -> Result<()> {
        let snapshot: EnhancerSnapshot = bincode::deserialize(bytes)?;
        let mut restored = SemanticEnhancer::new(snapshot.config);
        restored.graph = snapshot.graph;
        restored.intent_model = snapshot.intent_model;
        restored.recognizer = snapshot.recognizer;
        restored.embedder = snapshot.embedder;
        if !restored.embedder.hash_matches() {
            log::warn!(
                "Semantic bundle was built with a different embedding hash; embeddings will not match those of the exporting build"
            );
        }
        restored.trained_at = snapshot.trained_at;
        restored.training_samples = snapshot.training_samples;
        restored.feature_importance = snapshot.feature_importance;
        *self = restored;
        Ok(())
    }

    fn size_hint(&self) -> usize {
        self.graph.size_hint() + self.recognizer.gazetteer_len() * 64 + self.config.embedding_dim * 8
    }
}
