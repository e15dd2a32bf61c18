//! Training corpus types.
//!
//! A single [`TrainingData`] value feeds every model. It carries parallel
//! `features`/`labels` lists plus optional metadata sections; the training
//! pipeline derives per-model sub-datasets from it.
//!
//! The JSON form uses camelCase keys:
//!
//! ```
//! use xiphos::data::TrainingData;
//!
//! let json = r#"{
//!     "features": ["reset password", "db2 deadlock"],
//!     "labels": [1, "troubleshooting"],
//!     "metadata": { "searchLogs": [] }
//! }"#;
//! let data: TrainingData = serde_json::from_str(json).unwrap();
//! assert_eq!(data.len(), 2);
//! assert!(data.validate().is_ok());
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, XiphosError};

/// A training label: numeric (relevance, click, score) or categorical
/// (intent, category).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Numeric(f64),
    Categorical(String),
}

impl Label {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Label::Numeric(v) => Some(*v),
            Label::Categorical(_) => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            Label::Numeric(_) => None,
            Label::Categorical(c) => Some(c.as_str()),
        }
    }

    /// A label counts as positive when it is a numeric value above zero or
    /// any non-empty category.
    pub fn is_positive(&self) -> bool {
        match self {
            Label::Numeric(v) => *v > 0.0,
            Label::Categorical(c) => !c.trim().is_empty(),
        }
    }
}

impl From<f64> for Label {
    fn from(value: f64) -> Self {
        Label::Numeric(value)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Label::Categorical(value.to_string())
    }
}

/// One logged search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchLogEntry {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub result_count: usize,
    #[serde(default)]
    pub response_time_ms: f64,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub clicked: bool,
}

/// What a user did with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionAction {
    Click,
    View,
    Skip,
}

impl InteractionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionAction::Click => "click",
            InteractionAction::View => "view",
            InteractionAction::Skip => "skip",
        }
    }
}

impl std::str::FromStr for InteractionAction {
    type Err = XiphosError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "click" => Ok(InteractionAction::Click),
            "view" => Ok(InteractionAction::View),
            "skip" => Ok(InteractionAction::Skip),
            other => Err(XiphosError::validation(format!(
                "unknown interaction action '{other}'"
            ))),
        }
    }
}

/// A recorded user interaction with a search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInteractionRecord {
    pub user_id: String,
    pub query: String,
    #[serde(default)]
    pub result_id: Option<String>,
    pub action: InteractionAction,
    pub timestamp: DateTime<Utc>,
}

/// An entity mention attached to an annotated query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedEntity {
    pub entity_type: String,
    pub value: String,
}

/// Human annotation of a query's meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticAnnotation {
    pub query: String,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub entities: Vec<AnnotatedEntity>,
}

/// Aggregated traffic metrics for one point in time.
///
/// The search service appends one of these per `search()` call; training
/// data may carry a history of them under `timeSeriesMetrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetric {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub query_count: u64,
    /// Milliseconds.
    #[serde(default)]
    pub average_response_time: f64,
    #[serde(default)]
    pub error_rate: f64,
    #[serde(default)]
    pub click_through_rate: f64,
    #[serde(default)]
    pub is_anomaly: bool,
}

/// A past tuning change and its measured effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRecord {
    pub timestamp: DateTime<Utc>,
    pub parameter: String,
    #[serde(default)]
    pub previous_value: f64,
    #[serde(default)]
    pub new_value: f64,
    /// Relative improvement; negative values are regressions.
    pub improvement: f64,
    #[serde(default)]
    pub latency_ms: Option<f64>,
}

/// Optional metadata sections of a training corpus. Missing sections are
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrainingMetadata {
    pub search_logs: Vec<SearchLogEntry>,
    pub user_interactions: Vec<UserInteractionRecord>,
    pub semantic_annotations: Vec<SemanticAnnotation>,
    pub time_series_metrics: Vec<SearchMetric>,
    pub optimization_history: Vec<OptimizationRecord>,
}

impl TrainingMetadata {
    pub fn is_empty(&self) -> bool {
        self.search_logs.is_empty()
            && self.user_interactions.is_empty()
            && self.semantic_annotations.is_empty()
            && self.time_series_metrics.is_empty()
            && self.optimization_history.is_empty()
    }
}

/// Shared training corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingData {
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub metadata: TrainingMetadata,
}

impl TrainingData {
    pub fn new(features: Vec<String>, labels: Vec<Label>) -> Self {
        TrainingData {
            features,
            labels,
            metadata: TrainingMetadata::default(),
        }
    }

    /// Build from plain query strings with numeric labels.
    pub fn from_queries<S: AsRef<str>>(queries: &[S], labels: &[f64]) -> Self {
        TrainingData::new(
            queries.iter().map(|q| q.as_ref().to_string()).collect(),
            labels.iter().map(|v| Label::Numeric(*v)).collect(),
        )
    }

    pub fn with_metadata(mut self, metadata: TrainingMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Load a corpus from a JSON file.
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Number of usable (feature, label) samples.
    pub fn len(&self) -> usize {
        self.features.len().min(self.labels.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check the parallel-list invariant.
    pub fn validate(&self) -> Result<()> {
        if !self.features.is_empty()
            && !self.labels.is_empty()
            && self.features.len() != self.labels.len()
        {
            return Err(XiphosError::validation(format!(
                "features ({}) and labels ({}) must have the same length",
                self.features.len(),
                self.labels.len()
            )));
        }
        Ok(())
    }

    /// A copy whose features and labels are truncated to the shorter of the
    /// two. Used by training paths that degrade instead of failing.
    pub fn normalized(&self) -> Self {
        if let Err(e) = self.validate() {
            log::warn!("{e}; truncating to {} samples", self.len());
        }
        let n = self.len();
        TrainingData {
            features: self.features[..n].to_vec(),
            labels: self.labels[..n].to_vec(),
            metadata: self.metadata.clone(),
        }
    }

    /// Iterate over aligned (feature, label) pairs.
    pub fn samples(&self) -> impl Iterator<Item = (&str, &Label)> {
        self.features
            .iter()
            .map(String::as_str)
            .zip(self.labels.iter())
    }

    /// Select samples by index.
    ///
    /// Metadata sections with exactly one record per sample are treated as
    /// aligned with the samples and subset by the same indices; other
    /// sections are carried whole.
    pub fn subset(&self, indices: &[usize]) -> Self {
        let n = self.len();
        let pick = |i: &usize| *i < n;
        let features = indices
            .iter()
            .filter(|i| pick(i))
            .map(|&i| self.features[i].clone())
            .collect();
        let labels = indices
            .iter()
            .filter(|i| pick(i))
            .map(|&i| self.labels[i].clone())
            .collect();

        fn aligned<T: Clone>(section: &[T], n: usize, indices: &[usize]) -> Vec<T> {
            if n > 0 && section.len() == n {
                indices
                    .iter()
                    .filter(|&&i| i < n)
                    .map(|&i| section[i].clone())
                    .collect()
            } else {
                section.to_vec()
            }
        }

        let m = &self.metadata;
        TrainingData {
            features,
            labels,
            metadata: TrainingMetadata {
                search_logs: aligned(&m.search_logs, n, indices),
                user_interactions: aligned(&m.user_interactions, n, indices),
                semantic_annotations: aligned(&m.semantic_annotations, n, indices),
                time_series_metrics: aligned(&m.time_series_metrics, n, indices),
                optimization_history: aligned(&m.optimization_history, n, indices),
            },
        }
    }

    /// Counts of each categorical label.
    pub fn category_counts(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for label in &self.labels {
            if let Some(c) = label.as_category() {
                *counts.entry(c).or_insert(0) += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_labels_from_json() {
        let json = r#"{"features": ["a", "b", "c"], "labels": [1, 0.5, "help"]}"#;
        let data: TrainingData = serde_json::from_str(json).unwrap();
        assert_eq!(data.labels[0], Label::Numeric(1.0));
        assert_eq!(data.labels[2], Label::Categorical("help".to_string()));
        assert!(data.metadata.is_empty());
    }

    #[test]
    fn test_partial_metadata_sections() {
        let json = r#"{
            "features": ["x"],
            "labels": [1],
            "metadata": {
                "optimizationHistory": [
                    {"timestamp": "2024-01-01T00:00:00Z", "parameter": "cache_size", "improvement": 0.1}
                ]
            }
        }"#;
        let data: TrainingData = serde_json::from_str(json).unwrap();
        assert_eq!(data.metadata.optimization_history.len(), 1);
        assert!(data.metadata.search_logs.is_empty());
    }

    #[test]
    fn test_validate_mismatch() {
        let data = TrainingData::from_queries(&["a", "b", "c"], &[1.0, 0.0]);
        assert!(matches!(data.validate(), Err(XiphosError::Validation(_))));

        let normalized = data.normalized();
        assert_eq!(normalized.features.len(), 2);
        assert!(normalized.validate().is_ok());
    }

    #[test]
    fn test_label_positivity() {
        assert!(Label::Numeric(1.0).is_positive());
        assert!(!Label::Numeric(0.0).is_positive());
        assert!(!Label::Numeric(-1.0).is_positive());
        assert!(Label::from("search").is_positive());
        assert!(!Label::from("  ").is_positive());
    }

    #[test]
    fn test_subset_aligned_metadata() {
        let mut data = TrainingData::from_queries(&["p1", "p2", "p3"], &[0.1, 0.2, 0.3]);
        let ts = Utc::now();
        for (i, p) in ["p1", "p2", "p3"].iter().enumerate() {
            data.metadata.optimization_history.push(OptimizationRecord {
                timestamp: ts,
                parameter: p.to_string(),
                previous_value: 0.0,
                new_value: i as f64,
                improvement: 0.1,
                latency_ms: None,
            });
        }
        data.metadata.search_logs.push(SearchLogEntry {
            query: "unaligned".to_string(),
            timestamp: ts,
            result_count: 0,
            response_time_ms: 0.0,
            user_id: None,
            clicked: false,
        });

        let sub = data.subset(&[2, 0, 99]);
        assert_eq!(sub.features, vec!["p3", "p1"]);
        assert_eq!(sub.metadata.optimization_history.len(), 2);
        assert_eq!(sub.metadata.optimization_history[0].parameter, "p3");
        assert_eq!(sub.metadata.search_logs.len(), 1);
    }

    #[test]
    fn test_interaction_action_parse() {
        assert_eq!(
            "Click".parse::<InteractionAction>().unwrap(),
            InteractionAction::Click
        );
        assert!("hover".parse::<InteractionAction>().is_err());
    }
}
