//! Optimization insights from tuning history and observed latency.
//!
//! [`LatencyOptimizer`] summarizes past parameter changes (mean relative
//! improvement per parameter) and learns a latency budget from the latencies
//! recorded alongside them. At query time it reports budget overruns and the
//! parameter changes worth repeating or reverting.

use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{OptimizationRecord, SearchMetric, TrainingData};
use crate::error::Result;
use crate::ml::{ConfusionCounts, Evaluation, ModelKind, TrainableModel};

/// Produces optimization insights for the current state of the system.
pub trait OptimizationCollaborator: Send + Sync + Debug {
    /// `history` is the optimization history known to the caller, `window`
    /// the recent search metrics (oldest first) and `current_latency_ms` the
    /// latency of the request being served.
    fn insights(
        &self,
        history: &[OptimizationRecord],
        window: &[SearchMetric],
        current_latency_ms: f64,
    ) -> Result<Vec<OptimizationInsight>>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    /// Latency above budget.
    Performance,
    /// A parameter change that helped.
    Tuning,
    /// A parameter change that hurt.
    Regression,
}

/// An actionable observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationInsight {
    pub category: InsightCategory,
    pub message: String,
    /// Estimated impact in [0, 1].
    pub impact: f64,
    pub parameter: Option<String>,
}

/// Configuration for optimization insights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoOptimizationConfig {
    /// Latency budget used until one is learned.
    pub default_latency_budget_ms: f64,
    /// Percentile of recorded latencies that becomes the learned budget.
    pub latency_percentile: f64,
    /// Smallest mean improvement (absolute) worth reporting.
    pub min_improvement: f64,
    /// Changes of a parameter required before it is reported.
    pub min_observations: usize,
    pub max_insights: usize,
}

impl Default for AutoOptimizationConfig {
    fn default() -> Self {
        AutoOptimizationConfig {
            default_latency_budget_ms: 200.0,
            latency_percentile: 0.9,
            min_improvement: 0.01,
            min_observations: 1,
            max_insights: 5,
        }
    }
}

impl AutoOptimizationConfig {
    /// Candidate configurations for hyperparameter tuning.
    pub fn tuning_grid(&self) -> Vec<Self> {
        let mut grid = Vec::new();
        for min_improvement in [0.0, 0.01, 0.05] {
            for latency_percentile in [0.9, 0.95] {
                grid.push(AutoOptimizationConfig {
                    min_improvement,
                    latency_percentile,
                    ..self.clone()
                });
            }
        }
        grid
    }
}

/// Aggregated effect of changing one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterStats {
    pub changes: usize,
    pub mean_improvement: f64,
    /// Value set by the most improving change.
    pub best_value: f64,
    best_improvement: f64,
}

impl ParameterStats {
    fn observe(&mut self, record: &OptimizationRecord) {
        self.changes += 1;
        self.mean_improvement += (record.improvement - self.mean_improvement) / self.changes as f64;
        if record.improvement > self.best_improvement {
            self.best_improvement = record.improvement;
            self.best_value = record.new_value;
        }
    }
}

fn summarize(history: &[OptimizationRecord]) -> BTreeMap<String, ParameterStats> {
    let mut stats: BTreeMap<String, ParameterStats> = BTreeMap::new();
    for record in history {
        stats
            .entry(record.parameter.clone())
            .or_insert(ParameterStats {
                changes: 0,
                mean_improvement: 0.0,
                best_value: record.new_value,
                best_improvement: f64::NEG_INFINITY,
            })
            .observe(record);
    }
    stats
}

/// Nearest-rank percentile of `values`; `None` when empty.
fn percentile(values: &mut [f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let rank = (p.clamp(0.0, 1.0) * values.len() as f64).ceil() as usize;
    Some(values[rank.clamp(1, values.len()) - 1])
}

#[derive(Serialize, Deserialize)]
struct OptimizerSnapshot {
    config: AutoOptimizationConfig,
    parameters: BTreeMap<String, ParameterStats>,
    latency_budget_ms: f64,
    trained_at: Option<DateTime<Utc>>,
    training_samples: usize,
}

/// Default optimization collaborator.
#[derive(Debug, Clone)]
pub struct LatencyOptimizer {
    config: AutoOptimizationConfig,
    parameters: BTreeMap<String, ParameterStats>,
    latency_budget_ms: f64,
    trained_at: Option<DateTime<Utc>>,
    training_samples: usize,
}

impl LatencyOptimizer {
    pub fn new(config: AutoOptimizationConfig) -> Self {
        LatencyOptimizer {
            latency_budget_ms: config.default_latency_budget_ms,
            config,
            parameters: BTreeMap::new(),
            trained_at: None,
            training_samples: 0,
        }
    }

    pub fn config(&self) -> &AutoOptimizationConfig {
        &self.config
    }

    pub fn latency_budget_ms(&self) -> f64 {
        self.latency_budget_ms
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterStats> {
        self.parameters.get(name)
    }
}

impl Default for LatencyOptimizer {
    fn default() -> Self {
        Self::new(AutoOptimizationConfig::default())
    }
}

impl OptimizationCollaborator for LatencyOptimizer {
    fn insights(
        &self,
        history: &[OptimizationRecord],
        window: &[SearchMetric],
        current_latency_ms: f64,
    ) -> Result<Vec<OptimizationInsight>> {
        let budget = self.latency_budget_ms;
        let mut insights = Vec::new();

        if budget > 0.0 && current_latency_ms > budget {
            insights.push(OptimizationInsight {
                category: InsightCategory::Performance,
                message: format!(
                    "Request latency {current_latency_ms:.1}ms exceeds the {budget:.1}ms budget"
                ),
                impact: ((current_latency_ms - budget) / budget).min(1.0),
                parameter: None,
            });
        }

        if !window.is_empty() && budget > 0.0 {
            let mean = window.iter().map(|m| m.average_response_time).sum::<f64>()
                / window.len() as f64;
            if mean > budget {
                insights.push(OptimizationInsight {
                    category: InsightCategory::Performance,
                    message: format!(
                        "Average latency {mean:.1}ms over the last {} searches exceeds the {budget:.1}ms budget",
                        window.len()
                    ),
                    impact: ((mean - budget) / budget).min(1.0),
                    parameter: None,
                });
            }
        }

        let mut parameters = self.parameters.clone();
        parameters.extend(summarize(history));
        for (name, stats) in &parameters {
            if stats.changes < self.config.min_observations
                || stats.mean_improvement.abs() < self.config.min_improvement
                || stats.mean_improvement == 0.0
            {
                continue;
            }
            let impact = stats.mean_improvement.abs().min(1.0);
            let insight = if stats.mean_improvement > 0.0 {
                OptimizationInsight {
                    category: InsightCategory::Tuning,
                    message: format!(
                        "Changing {name} improved results by {:.1}% on average; best value {}",
                        stats.mean_improvement * 100.0,
                        stats.best_value
                    ),
                    impact,
                    parameter: Some(name.clone()),
                }
            } else {
                OptimizationInsight {
                    category: InsightCategory::Regression,
                    message: format!(
                        "Changing {name} degraded results by {:.1}% on average; consider reverting",
                        stats.mean_improvement.abs() * 100.0
                    ),
                    impact,
                    parameter: Some(name.clone()),
                }
            };
            insights.push(insight);
        }

        insights.sort_by(|a, b| b.impact.total_cmp(&a.impact));
        insights.truncate(self.config.max_insights);
        Ok(insights)
    }

    fn name(&self) -> &str {
        "latency"
    }
}

impl TrainableModel for LatencyOptimizer {
    fn kind(&self) -> ModelKind {
        ModelKind::PredictiveOptimization
    }

    fn train(&mut self, data: &TrainingData) -> Result<Evaluation> {
        let history = &data.metadata.optimization_history;
        self.parameters = summarize(history);

        let mut latencies: Vec<f64> = history.iter().filter_map(|r| r.latency_ms).collect();
        self.latency_budget_ms = percentile(&mut latencies, self.config.latency_percentile)
            .unwrap_or(self.config.default_latency_budget_ms);
        self.training_samples = history.len();
        self.trained_at = Some(Utc::now());
        log::debug!(
            "Optimizer trained on {} records, {} parameters, budget {:.1}ms",
            history.len(),
            self.parameters.len(),
            self.latency_budget_ms
        );
        Ok(self.evaluate(data))
    }

    fn evaluate(&self, data: &TrainingData) -> Evaluation {
        let mut counts = ConfusionCounts::default();
        for record in &data.metadata.optimization_history {
            let predicted = self
                .parameters
                .get(&record.parameter)
                .is_some_and(|s| s.mean_improvement > 0.0);
            counts.record(predicted, record.improvement > 0.0);
        }
        let total: f64 = self.parameters.values().map(|s| s.mean_improvement.abs()).sum();
        let importance: Vec<(&str, f64)> = if total > 0.0 {
            self.parameters
                .iter()
                .map(|(name, s)| (name.as_str(), s.mean_improvement.abs() / total))
                .collect()
        } else {
            Vec::new()
        };
        Evaluation::from_confusion(counts).with_feature_importance(&importance)
    }

    fn is_trained(&self) -> bool {
        self.trained_at.is_some()
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = OptimizerSnapshot {
            config: self.config.clone(),
            parameters: self.parameters.clone(),
            latency_budget_ms: self.latency_budget_ms,
            trained_at: self.trained_at,
            training_samples: self.training_samples,
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    fn restore(&mut self, bytes: &[u8]) -> Result<()> {
        let snapshot: OptimizerSnapshot = bincode::deserialize(bytes)?;
        self.config = snapshot.config;
        self.parameters = snapshot.parameters;
        self.latency_budget_ms = snapshot.latency_budget_ms;
        self.trained_at = snapshot.trained_at;
        self.training_samples = snapshot.training_samples;
        Ok(())
    }

    fn size_hint(&self) -> usize {
        self.parameters.keys().map(|k| k.len() + 48).sum::<usize>() + std::mem::size_of::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TrainingMetadata;

    fn record(parameter: &str, new_value: f64, improvement: f64, latency: f64) -> OptimizationRecord {
        OptimizationRecord {
            timestamp: Utc::now(),
            parameter: parameter.to_string(),
            previous_value: 0.0,
            new_value,
            improvement,
            latency_ms: Some(latency),
        }
    }

    fn training_data() -> TrainingData {
        TrainingData::default().with_metadata(TrainingMetadata {
            optimization_history: vec![
                record("cache_size", 512.0, 0.10, 80.0),
                record("cache_size", 1024.0, 0.20, 90.0),
                record("max_candidates", 500.0, -0.15, 150.0),
                record("max_candidates", 400.0, -0.05, 120.0),
                record("timeout_ms", 100.0, 0.001, 100.0),
            ],
            ..Default::default()
        })
    }

    #[test]
    fn test_percentile() {
        let mut values = vec![10.0, 30.0, 20.0, 40.0];
        assert_eq!(percentile(&mut values, 0.5), Some(20.0));
        assert_eq!(percentile(&mut values, 1.0), Some(40.0));
        assert_eq!(percentile(&mut [], 0.9), None);
    }

    #[test]
    fn test_train_learns_parameters_and_budget() {
        let mut optimizer = LatencyOptimizer::default();
        let evaluation = optimizer.train(&training_data()).unwrap();
        assert!(optimizer.is_trained());
        assert_eq!(optimizer.latency_budget_ms(), 150.0);

        let cache = optimizer.parameter("cache_size").unwrap();
        assert_eq!(cache.changes, 2);
        assert!((cache.mean_improvement - 0.15).abs() < 1e-9);
        assert_eq!(cache.best_value, 1024.0);
        assert_eq!(evaluation.accuracy, 1.0);
    }

    #[test]
    fn test_insights() {
        let mut optimizer = LatencyOptimizer::default();
        optimizer.train(&training_data()).unwrap();

        let insights = optimizer.insights(&[], &[], 300.0).unwrap();
        assert_eq!(insights[0].category, InsightCategory::Performance);
        assert!(insights.iter().any(|i| i.category == InsightCategory::Tuning
            && i.parameter.as_deref() == Some("cache_size")));
        assert!(insights.iter().any(|i| i.category == InsightCategory::Regression));
        // Below min_improvement.
        assert!(!insights.iter().any(|i| i.parameter.as_deref() == Some("timeout_ms")));
        assert!(insights.windows(2).all(|w| w[0].impact >= w[1].impact));
    }

    #[test]
    fn test_untrained_without_history_is_quiet() {
        let optimizer = LatencyOptimizer::default();
        assert!(optimizer.insights(&[], &[], 10.0).unwrap().is_empty());

        let history = vec![record("shards", 4.0, 0.3, 50.0)];
        let insights = optimizer.insights(&history, &[], 10.0).unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].parameter.as_deref(), Some("shards"));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut optimizer = LatencyOptimizer::default();
        optimizer.train(&training_data()).unwrap();
        let mut restored = LatencyOptimizer::default();
        restored.restore(&optimizer.snapshot().unwrap()).unwrap();
        assert_eq!(
            restored.insights(&[], &[], 500.0).unwrap(),
            optimizer.insights(&[], &[], 500.0).unwrap()
        );
    }
}
