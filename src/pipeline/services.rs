//! Trained model instances handed to the search service.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::data::OptimizationRecord;
use crate::ml::ModelKind;
use crate::ml::anomaly::AnomalyCollaborator;
use crate::ml::optimization::OptimizationCollaborator;
use crate::ml::ranking::RankingCollaborator;
use crate::pipeline::metrics::TrainingResult;
use crate::semantic::SemanticEnhancer;
use crate::suggestion::QuerySuggestionEngine;

/// Clones of the pipeline's current models.
#[derive(Clone)]
pub struct ModelServices {
    pub suggestion: QuerySuggestionEngine,
    pub semantic: SemanticEnhancer,
    pub ranking: Arc<dyn RankingCollaborator>,
    pub anomaly: Arc<dyn AnomalyCollaborator>,
    pub optimization: Arc<dyn OptimizationCollaborator>,
    pub optimization_history: Vec<OptimizationRecord>,
    /// Latest successful training result per kind.
    pub results: BTreeMap<ModelKind, TrainingResult>,
}

impl fmt::Debug for ModelServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelServices")
            .field("ranking", &self.ranking.name())
            .field("anomaly", &self.anomaly.name())
            .field("optimization", &self.optimization.name())
            .field("optimization_history", &self.optimization_history.len())
            .field("results", &self.results.keys().collect::<Vec<_>>())
            .finish()
    }
}
