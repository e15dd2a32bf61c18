//! Per-model sub-datasets derived from the shared corpus.
//!
//! Every sub-dataset keeps `features`, `labels` and the metadata section its
//! model trains on aligned one-to-one where the section is the sample source,
//! so [`TrainingData::subset`] splits them together.

use crate::data::{InteractionAction, Label, TrainingData, TrainingMetadata};
use crate::ml::ModelKind;

/// The slice of `data` that `kind` trains on.
pub fn derive(kind: ModelKind, data: &TrainingData) -> TrainingData {
    let metadata = &data.metadata;
    match kind {
        ModelKind::QuerySuggestion => {
            TrainingData::new(data.features.clone(), data.labels.clone()).with_metadata(
                TrainingMetadata {
                    search_logs: metadata.search_logs.clone(),
                    ..Default::default()
                },
            )
        }
        ModelKind::SemanticSearch => {
            TrainingData::new(data.features.clone(), data.labels.clone()).with_metadata(
                TrainingMetadata {
                    semantic_annotations: metadata.semantic_annotations.clone(),
                    ..Default::default()
                },
            )
        }
        ModelKind::PersonalizedRanking => {
            let interactions = &metadata.user_interactions;
            TrainingData::new(
                interactions.iter().map(|i| i.query.clone()).collect(),
                interactions
                    .iter()
                    .map(|i| {
                        let clicked = i.action == InteractionAction::Click;
                        Label::Numeric(if clicked { 1.0 } else { 0.0 })
                    })
                    .collect(),
            )
            .with_metadata(TrainingMetadata {
                user_interactions: interactions.clone(),
                ..Default::default()
            })
        }
        ModelKind::AnomalyDetection => {
            let metrics = &metadata.time_series_metrics;
            TrainingData::new(
                metrics.iter().map(|m| m.timestamp.to_rfc3339()).collect(),
                metrics
                    .iter()
                    .map(|m| Label::Numeric(if m.is_anomaly { 1.0 } else { 0.0 }))
                    .collect(),
            )
            .with_metadata(TrainingMetadata {
                time_series_metrics: metrics.clone(),
                ..Default::default()
            })
        }
        ModelKind::PredictiveOptimization => {
            let history = &metadata.optimization_history;
            TrainingData::new(
                history.iter().map(|r| r.parameter.clone()).collect(),
                history.iter().map(|r| Label::Numeric(r.improvement)).collect(),
            )
            .with_metadata(TrainingMetadata {
                optimization_history: history.clone(),
                ..Default::default()
            })
        }
    }
}
