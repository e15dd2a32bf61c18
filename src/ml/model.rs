//! Closed dispatch over every trainable model kind.

use std::sync::Arc;

use crate::data::TrainingData;
use crate::error::Result;
use crate::ml::anomaly::MetricAnomalyDetector;
use crate::ml::optimization::LatencyOptimizer;
use crate::ml::ranking::PreferenceRanker;
use crate::ml::{Evaluation, MLConfig, ModelKind, TrainableModel};
use crate::semantic::SemanticEnhancer;
use crate::storage::ModelStore;
use crate::suggestion::QuerySuggestionEngine;
use crate::suggestion::user_context::UserContextStore;

/// One trainable model of any kind.
#[derive(Debug, Clone)]
pub enum Model {
    QuerySuggestion(QuerySuggestionEngine),
    PersonalizedRanking(PreferenceRanker),
    SemanticSearch(SemanticEnhancer),
    AnomalyDetection(MetricAnomalyDetector),
    PredictiveOptimization(LatencyOptimizer),
}

impl Model {
    /// A fresh, untrained model of `kind` configured from `config`.
    pub fn new(kind: ModelKind, config: &MLConfig) -> Self {
        match kind {
            ModelKind::QuerySuggestion => {
                Model::QuerySuggestion(QuerySuggestionEngine::new(config.suggestion.clone()))
            }
            ModelKind::PersonalizedRanking => {
                Model::PersonalizedRanking(PreferenceRanker::new(config.ranking.clone()))
            }
            ModelKind::SemanticSearch => {
                Model::SemanticSearch(SemanticEnhancer::new(config.semantic.clone()))
            }
            ModelKind::AnomalyDetection => Model::AnomalyDetection(MetricAnomalyDetector::new(
                config.anomaly_detection.clone(),
            )),
            ModelKind::PredictiveOptimization => {
                Model::PredictiveOptimization(LatencyOptimizer::new(config.optimization.clone()))
            }
        }
    }

    /// Untrained candidates for hyperparameter tuning, one per grid point.
    /// The first candidate uses `config` unchanged.
    pub fn candidates(kind: ModelKind, config: &MLConfig) -> Vec<Model> {
        let mut candidates = vec![Model::new(kind, config)];
        let grid: Vec<MLConfig> = match kind {
            ModelKind::QuerySuggestion => config
                .suggestion
                .tuning_grid()
                .into_iter()
                .map(|suggestion| MLConfig {
                    suggestion,
                    ..config.clone()
                })
                .collect(),
            ModelKind::PersonalizedRanking => config
                .ranking
                .tuning_grid()
                .into_iter()
                .map(|ranking| MLConfig {
                    ranking,
                    ..config.clone()
                })
                .collect(),
            ModelKind::SemanticSearch => config
                .semantic
                .tuning_grid()
                .into_iter()
                .map(|semantic| MLConfig {
                    semantic,
                    ..config.clone()
                })
                .collect(),
            ModelKind::AnomalyDetection => config
                .anomaly_detection
                .tuning_grid()
                .into_iter()
                .map(|anomaly_detection| MLConfig {
                    anomaly_detection,
                    ..config.clone()
                })
                .collect(),
            ModelKind::PredictiveOptimization => config
                .optimization
                .tuning_grid()
                .into_iter()
                .map(|optimization| MLConfig {
                    optimization,
                    ..config.clone()
                })
                .collect(),
        };
        candidates.extend(grid.iter().map(|c| Model::new(kind, c)));
        candidates
    }

    /// Share `store` with a suggestion engine; other kinds are unchanged.
    pub fn with_user_contexts(self, store: Arc<UserContextStore>) -> Self {
        match self {
            Model::QuerySuggestion(engine) => {
                Model::QuerySuggestion(engine.with_user_contexts(store))
            }
            other => other,
        }
    }

    fn inner(&self) -> &dyn TrainableModel {
        match self {
            Model::QuerySuggestion(m) => m,
            Model::PersonalizedRanking(m) => m,
            Model::SemanticSearch(m) => m,
            Model::AnomalyDetection(m) => m,
            Model::PredictiveOptimization(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn TrainableModel {
        match self {
            Model::QuerySuggestion(m) => m,
            Model::PersonalizedRanking(m) => m,
            Model::SemanticSearch(m) => m,
            Model::AnomalyDetection(m) => m,
            Model::PredictiveOptimization(m) => m,
        }
    }
}

impl TrainableModel for Model {
    fn kind(&self) -> ModelKind {
        self.inner().kind()
    }

    fn train(&mut self, data: &TrainingData) -> Result<Evaluation> {
        self.inner_mut().train(data)
    }

    fn evaluate(&self, data: &TrainingData) -> Evaluation {
        self.inner().evaluate(data)
    }

    fn is_trained(&self) -> bool {
        self.inner().is_trained()
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        self.inner().snapshot()
    }

    fn restore(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner_mut().restore(bytes)
    }

    fn size_hint(&self) -> usize {
        self.inner().size_hint()
    }

    fn save(&self, store: &dyn ModelStore) -> Result<u64> {
        self.inner().save(store)
    }

    fn load(&mut self, store: &dyn ModelStore) -> Result<()> {
        self.inner_mut().load(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_matches_kind() {
        let config = MLConfig::default();
        for kind in ModelKind::ALL {
            let model = Model::new(kind, &config);
            assert_eq!(model.kind(), kind);
            assert!(!model.is_trained());
        }
    }

    #[test]
    fn test_candidates_start_with_base_config() {
        let config = MLConfig::default();
        for kind in ModelKind::ALL {
            let candidates = Model::candidates(kind, &config);
            assert!(candidates.len() > 1);
            assert!(candidates.iter().all(|c| c.kind() == kind));
        }
    }

    #[test]
    fn test_train_through_dispatch() {
        let mut model = Model::new(ModelKind::QuerySuggestion, &MLConfig::default());
        let data = TrainingData::from_queries(&["reset password", "reset pin"], &[1.0, 1.0]);
        model.train(&data).unwrap();
        assert!(model.is_trained());

        let mut restored = Model::new(ModelKind::QuerySuggestion, &MLConfig::default());
        restored.restore(&model.snapshot().unwrap()).unwrap();
        assert!(restored.is_trained());
    }
}
