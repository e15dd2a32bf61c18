//! Training results, aggregated pipeline metrics and the persistence
//! manifest.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::OptimizationRecord;
use crate::ml::Evaluation;

/// Outcome of training one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Success,
    Failed,
    Timeout,
}

impl TrainingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStatus::Success => "success",
            TrainingStatus::Failed => "failed",
            TrainingStatus::Timeout => "timeout",
        }
    }
}

/// Result of training one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingResult {
    pub model_id: String,
    pub status: TrainingStatus,
    pub training_time_ms: u64,
    /// Samples in the model's sub-dataset.
    pub samples: usize,
    pub evaluation: Evaluation,
    pub error: Option<String>,
    pub trained_at: DateTime<Utc>,
    /// Tuning candidates tried; 0 without tuning.
    pub candidates_evaluated: usize,
    /// Approximate in-memory size of the trained model.
    pub model_size: usize,
}

impl TrainingResult {
    pub fn success(model_id: &str, evaluation: Evaluation, samples: usize, elapsed: Duration) -> Self {
        TrainingResult {
            model_id: model_id.to_string(),
            status: TrainingStatus::Success,
            training_time_ms: elapsed.as_millis() as u64,
            samples,
            evaluation,
            error: None,
            trained_at: Utc::now(),
            candidates_evaluated: 0,
            model_size: 0,
        }
    }

    pub fn failed(model_id: &str, error: impl Into<String>, elapsed: Duration) -> Self {
        TrainingResult {
            model_id: model_id.to_string(),
            status: TrainingStatus::Failed,
            training_time_ms: elapsed.as_millis() as u64,
            samples: 0,
            evaluation: Evaluation::default(),
            error: Some(error.into()),
            trained_at: Utc::now(),
            candidates_evaluated: 0,
            model_size: 0,
        }
    }

    pub fn timeout(model_id: &str, budget: Duration, elapsed: Duration) -> Self {
        TrainingResult {
            status: TrainingStatus::Timeout,
            error: Some(format!(
                "exceeded the {}ms training budget",
                budget.as_millis()
            )),
            ..TrainingResult::failed(model_id, String::new(), elapsed)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TrainingStatus::Success
    }
}

/// Resources consumed by a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    /// Largest approximate model footprint, in bytes.
    pub memory_peak: usize,
    /// Summed training time of all workers.
    pub cpu_time_ms: u64,
    /// Bytes written by the last persistence call.
    pub disk_space: u64,
}

/// Aggregate of one `run_full_pipeline` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetrics {
    /// Models attempted, unknown ids included.
    pub models_trained: usize,
    pub total_training_time_ms: u64,
    /// Mean accuracy over successful results.
    pub average_accuracy: f64,
    /// Successful / attempted.
    pub success_rate: f64,
    /// Most accurate successful model.
    pub best_model: Option<String>,
    pub resource_usage: ResourceUsage,
    pub results: Vec<TrainingResult>,
}

impl PipelineMetrics {
    pub fn from_results(results: Vec<TrainingResult>, wall_time: Duration, resource_usage: ResourceUsage) -> Self {
        let successful: Vec<&TrainingResult> = results.iter().filter(|r| r.is_success()).collect();
        let average_accuracy = if successful.is_empty() {
            0.0
        } else {
            successful.iter().map(|r| r.evaluation.accuracy).sum::<f64>() / successful.len() as f64
        };
        let success_rate = if results.is_empty() {
            0.0
        } else {
            successful.len() as f64 / results.len() as f64
        };
        let best_model = successful
            .iter()
            .fold(None::<&TrainingResult>, |best, r| match best {
                Some(b) if b.evaluation.accuracy >= r.evaluation.accuracy => Some(b),
                _ => Some(r),
            })
            .map(|r| r.model_id.clone());

        PipelineMetrics {
            models_trained: results.len(),
            total_training_time_ms: wall_time.as_millis() as u64,
            average_accuracy,
            success_rate,
            best_model,
            resource_usage,
            results,
        }
    }

    pub fn result(&self, model_id: &str) -> Option<&TrainingResult> {
        self.results.iter().find(|r| r.model_id == model_id)
    }
}

/// One persisted bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub model_id: String,
    pub file: String,
    pub size_bytes: u64,
    pub evaluation: Evaluation,
    pub trained_at: Option<DateTime<Utc>>,
    pub samples: usize,
}

/// Index of a directory of model bundles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelManifest {
    pub format_version: u32,
    pub crate_version: String,
    pub created_at: DateTime<Utc>,
    pub models: Vec<ManifestEntry>,
    #[serde(default)]
    pub optimization_history: Vec<OptimizationRecord>,
}

impl ModelManifest {
    pub const FORMAT_VERSION: u32 = 1;

    pub fn new(models: Vec<ManifestEntry>, optimization_history: Vec<OptimizationRecord>) -> Self {
        ModelManifest {
            format_version: Self::FORMAT_VERSION,
            crate_version: crate::VERSION.to_string(),
            created_at: Utc::now(),
            models,
            optimization_history,
        }
    }
}

/// Per-model outcome of a save or load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceReport {
    pub succeeded: Vec<String>,
    /// (model id, error message)
    pub failed: Vec<(String, String)>,
    pub bytes: u64,
}

impl PersistenceReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(id: &str, accuracy: f64) -> TrainingResult {
        TrainingResult::success(
            id,
            Evaluation {
                accuracy,
                ..Default::default()
            },
            10,
            Duration::from_millis(5),
        )
    }

    #[test]
    fn test_aggregate() {
        let metrics = PipelineMetrics::from_results(
            vec![
                success("query_suggestion", 0.8),
                success("semantic_search", 0.6),
                TrainingResult::failed("bogus", "unknown model", Duration::ZERO),
                TrainingResult::timeout("anomaly_detection", Duration::ZERO, Duration::from_millis(1)),
            ],
            Duration::from_millis(42),
            ResourceUsage::default(),
        );
        assert_eq!(metrics.models_trained, 4);
        assert!((metrics.average_accuracy - 0.7).abs() < 1e-9);
        assert!((metrics.success_rate - 0.5).abs() < 1e-9);
        assert_eq!(metrics.best_model.as_deref(), Some("query_suggestion"));
        assert_eq!(metrics.total_training_time_ms, 42);
        assert_eq!(
            metrics.result("anomaly_detection").unwrap().status,
            TrainingStatus::Timeout
        );
    }

    #[test]
    fn test_no_success_means_no_best_model() {
        let metrics = PipelineMetrics::from_results(
            vec![TrainingResult::failed("x", "boom", Duration::ZERO)],
            Duration::ZERO,
            ResourceUsage::default(),
        );
        assert_eq!(metrics.best_model, None);
        assert_eq!(metrics.average_accuracy, 0.0);
        assert_eq!(metrics.success_rate, 0.0);
    }

    #[test]
    fn test_best_model_prefers_first_on_tie() {
        let metrics = PipelineMetrics::from_results(
            vec![success("a", 0.5), success("b", 0.5)],
            Duration::ZERO,
            ResourceUsage::default(),
        );
        assert_eq!(metrics.best_model.as_deref(), Some("a"));
    }
}
