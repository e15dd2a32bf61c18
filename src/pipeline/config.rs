//! Training pipeline configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XiphosError};
use crate::ml::{MLConfig, ModelKind};

/// Configuration for [`TrainingPipeline`](crate::pipeline::TrainingPipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model ids to train. Empty means every kind.
    pub target_models: Vec<String>,
    /// Share of samples held out when tuning hyperparameters.
    pub validation_split: f64,
    /// Default fold count for cross-validation.
    pub k_folds: usize,
    pub hyperparameter_tuning: bool,
    /// Non-improving tuning candidates tolerated before stopping.
    pub early_stopping_patience: usize,
    /// Soft training deadline per model.
    pub max_training_time_ms: u64,
    /// Train models concurrently.
    pub parallel: bool,
    /// Concurrency bound; `None` uses the number of CPUs.
    pub max_parallel_models: Option<usize>,
    /// Seed for splits and fold shuffling.
    pub seed: u64,
    /// Per-model configuration.
    pub models: MLConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            target_models: ModelKind::ALL.iter().map(|k| k.as_str().to_string()).collect(),
            validation_split: 0.2,
            k_folds: 5,
            hyperparameter_tuning: false,
            early_stopping_patience: 3,
            max_training_time_ms: 300_000,
            parallel: true,
            max_parallel_models: None,
            seed: 42,
            models: MLConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            XiphosError::invalid_config(format!("cannot read '{}': {e}", path.display()))
        })?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(XiphosError::invalid_config(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        if self.max_parallel_models == Some(0) {
            return Err(XiphosError::invalid_config(
                "max_parallel_models must be positive",
            ));
        }
        Ok(())
    }

    /// Requested ids in order, deduplicated, each with its kind if known.
    pub fn resolve_targets(&self) -> Vec<(String, Option<ModelKind>)> {
        if self.target_models.is_empty() {
            return ModelKind::ALL
                .iter()
                .map(|k| (k.as_str().to_string(), Some(*k)))
                .collect();
        }
        let mut targets: Vec<(String, Option<ModelKind>)> = Vec::new();
        for id in &self.target_models {
            let id = id.trim().to_string();
            if targets.iter().any(|(seen, _)| *seen == id) {
                continue;
            }
            let kind = id.parse().ok();
            targets.push((id, kind));
        }
        targets
    }

    /// Number of models trained at once.
    pub fn parallelism(&self) -> usize {
        if self.parallel {
            self.max_parallel_models.unwrap_or_else(num_cpus::get).max(1)
        } else {
            1
        }
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.max_training_time_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_targets_every_kind() {
        let config = PipelineConfig::default();
        let targets = config.resolve_targets();
        assert_eq!(targets.len(), ModelKind::ALL.len());
        assert!(targets.iter().all(|(_, k)| k.is_some()));
    }

    #[test]
    fn test_resolve_targets() {
        let config = PipelineConfig {
            target_models: vec![
                "query_suggestion".to_string(),
                "neural_reranker".to_string(),
                "query_suggestion".to_string(),
            ],
            ..Default::default()
        };
        let targets = config.resolve_targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].1, Some(ModelKind::QuerySuggestion));
        assert_eq!(targets[1], ("neural_reranker".to_string(), None));
    }

    #[test]
    fn test_parallelism() {
        let sequential = PipelineConfig {
            parallel: false,
            max_parallel_models: Some(4),
            ..Default::default()
        };
        assert_eq!(sequential.parallelism(), 1);

        let bounded = PipelineConfig {
            max_parallel_models: Some(2),
            ..Default::default()
        };
        assert_eq!(bounded.parallelism(), 2);
    }

    #[test]
    fn test_from_file_with_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{"target_models":["semantic_search"],"k_folds":3,"models":{"semantic":{"max_expansions":2}}}"#,
        )
        .unwrap();
        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.target_models, vec!["semantic_search"]);
        assert_eq!(config.k_folds, 3);
        assert_eq!(config.models.semantic.max_expansions, 2);
        assert_eq!(config.validation_split, 0.2);

        std::fs::write(&path, r#"{"validation_split":1.5}"#).unwrap();
        assert!(PipelineConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_equality_covers_model_configs() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<PipelineConfig>(&json).unwrap(), config);

        let mut tuned = config.clone();
        tuned.models.suggestion.click_weight = 3.0;
        assert_ne!(tuned, config);
        assert_eq!(tuned.models.semantic, config.models.semantic);
    }
}
