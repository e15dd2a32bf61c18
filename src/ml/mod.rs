//! Trainable models behind one uniform interface.
//!
//! The set of model kinds is closed ([`ModelKind`]). Every kind implements
//! [`TrainableModel`], and [`model::Model`] dispatches over the concrete
//! implementations so the training pipeline can iterate kinds without
//! inspecting types at runtime.
//!
//! Three kinds are exposed to the search path as pluggable collaborator
//! traits with minimal default implementations:
//!
//! - [`ranking::RankingCollaborator`] / [`ranking::PreferenceRanker`]
//! - [`anomaly::AnomalyCollaborator`] / [`anomaly::MetricAnomalyDetector`]
//! - [`optimization::OptimizationCollaborator`] / [`optimization::LatencyOptimizer`]

pub mod anomaly;
pub mod model;
pub mod optimization;
pub mod ranking;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::TrainingData;
use crate::error::{Result, XiphosError};
use crate::ml::anomaly::AnomalyDetectionConfig;
use crate::ml::optimization::AutoOptimizationConfig;
use crate::ml::ranking::RankingConfig;
use crate::semantic::SemanticConfig;
use crate::storage::ModelStore;
use crate::suggestion::SuggestionConfig;

/// The closed set of trainable model kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    QuerySuggestion,
    PersonalizedRanking,
    SemanticSearch,
    AnomalyDetection,
    PredictiveOptimization,
}

impl ModelKind {
    /// Every kind, in training order.
    pub const ALL: [ModelKind; 5] = [
        ModelKind::QuerySuggestion,
        ModelKind::PersonalizedRanking,
        ModelKind::SemanticSearch,
        ModelKind::AnomalyDetection,
        ModelKind::PredictiveOptimization,
    ];

    /// Stable string identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::QuerySuggestion => "query_suggestion",
            ModelKind::PersonalizedRanking => "personalized_ranking",
            ModelKind::SemanticSearch => "semantic_search",
            ModelKind::AnomalyDetection => "anomaly_detection",
            ModelKind::PredictiveOptimization => "predictive_optimization",
        }
    }

    /// Name of the bundle this kind is persisted under.
    pub fn bundle_name(&self) -> String {
        format!("{}.bin", self.as_str())
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = XiphosError;

    fn from_str(s: &str) -> Result<Self> {
        ModelKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| XiphosError::validation(format!("unknown model '{s}'")))
    }
}

/// Quality measurements of a trained model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Relative weight of each signal the model relies on.
    pub feature_importance: HashMap<String, f64>,
}

impl Evaluation {
    /// Build an evaluation from binary confusion counts.
    pub fn from_confusion(counts: ConfusionCounts) -> Self {
        let ConfusionCounts {
            true_positives: tp,
            false_positives: fp,
            false_negatives: fn_,
            true_negatives: tn,
        } = counts;
        let ratio = |num: usize, den: usize| {
            if den == 0 {
                0.0
            } else {
                num as f64 / den as f64
            }
        };
        let accuracy = ratio(tp + tn, tp + tn + fp + fn_);
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        Evaluation {
            accuracy,
            precision,
            recall,
            f1_score: f1(precision, recall),
            feature_importance: HashMap::new(),
        }
    }

    pub fn with_feature_importance(mut self, importance: &[(&str, f64)]) -> Self {
        self.feature_importance = importance
            .iter()
            .map(|(name, w)| (name.to_string(), *w))
            .collect();
        self
    }
}

/// Harmonic mean of precision and recall.
pub fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Binary confusion matrix counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
}

impl ConfusionCounts {
    /// Record one prediction against its ground truth.
    pub fn record(&mut self, predicted: bool, actual: bool) {
        match (predicted, actual) {
            (true, true) => self.true_positives += 1,
            (true, false) => self.false_positives += 1,
            (false, true) => self.false_negatives += 1,
            (false, false) => self.true_negatives += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.false_negatives + self.true_negatives
    }
}

/// Uniform interface of every trainable model kind.
pub trait TrainableModel: Send + Sync {
    /// Which kind this model is.
    fn kind(&self) -> ModelKind;

    /// Train on the given data, replacing any previous state, and return
    /// the evaluation on that data.
    fn train(&mut self, data: &TrainingData) -> Result<Evaluation>;

    /// Evaluate the current state against held-out data.
    fn evaluate(&self, data: &TrainingData) -> Evaluation;

    /// Check if the model has been trained.
    fn is_trained(&self) -> bool;

    /// Serialize the trained state into an opaque bundle.
    fn snapshot(&self) -> Result<Vec<u8>>;

    /// Replace the state with a previously taken snapshot.
    fn restore(&mut self, bytes: &[u8]) -> Result<()>;

    /// Rough in-memory footprint in bytes.
    fn size_hint(&self) -> usize;

    /// Persist the snapshot into a model store, returning the bundle size.
    fn save(&self, store: &dyn ModelStore) -> Result<u64> {
        let bytes = self.snapshot()?;
        store.put(&self.kind().bundle_name(), &bytes)?;
        Ok(bytes.len() as u64)
    }

    /// Restore from a model store.
    fn load(&mut self, store: &dyn ModelStore) -> Result<()> {
        let bytes = store.get(&self.kind().bundle_name())?;
        self.restore(&bytes)
    }
}

/// Per-kind model configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MLConfig {
    /// Query suggestion configuration.
    pub suggestion: SuggestionConfig,
    /// Semantic enhancer configuration.
    pub semantic: SemanticConfig,
    /// Preference ranking configuration.
    pub ranking: RankingConfig,
    /// Anomaly detection configuration.
    pub anomaly_detection: AnomalyDetectionConfig,
    /// Optimization insight configuration.
    pub optimization: AutoOptimizationConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_round_trip_ids() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.as_str().parse::<ModelKind>().unwrap(), kind);
        }
        assert!("neural_magic".parse::<ModelKind>().is_err());
        assert_eq!(
            ModelKind::SemanticSearch.bundle_name(),
            "semantic_search.bin"
        );
    }

    #[test]
    fn test_evaluation_from_confusion() {
        let mut counts = ConfusionCounts::default();
        counts.record(true, true);
        counts.record(true, true);
        counts.record(true, false);
        counts.record(false, true);
        counts.record(false, false);

        let eval = Evaluation::from_confusion(counts);
        assert!((eval.accuracy - 0.6).abs() < 1e-9);
        assert!((eval.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((eval.recall - 2.0 / 3.0).abs() < 1e-9);
        assert!((eval.f1_score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_confusion_is_zero() {
        let eval = Evaluation::from_confusion(ConfusionCounts::default());
        assert_eq!(eval.accuracy, 0.0);
        assert_eq!(eval.f1_score, 0.0);
    }
}
