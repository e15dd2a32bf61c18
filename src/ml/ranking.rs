//! Preference-based result re-ranking.
//!
//! [`RankingCollaborator`] is the seam the search service re-ranks through.
//! The default [`PreferenceRanker`] learns term and result affinities from
//! recorded user interactions and boosts each result's base score by the
//! affinity of its terms for the requesting user.

use std::collections::HashMap;
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{Analyzer, StandardAnalyzer};
use crate::data::{InteractionAction, TrainingData, UserInteractionRecord};
use crate::error::Result;
use crate::ml::{ConfusionCounts, Evaluation, ModelKind, TrainableModel};
use crate::service::SearchResult;

/// Signals about the user a ranking is computed for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankingContext {
    pub user_id: Option<String>,
    pub search_history: Vec<String>,
    /// Ids of results the user clicked before.
    pub click_history: Vec<String>,
    /// Term -> preference weight in [-1, 1].
    pub preferences: HashMap<String, f64>,
}

impl RankingContext {
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
            && self.search_history.is_empty()
            && self.click_history.is_empty()
            && self.preferences.is_empty()
    }
}

/// Re-ranks base search results.
pub trait RankingCollaborator: Send + Sync + Debug {
    /// Reorder (and rescore) `results` for `context`. Must return the same
    /// set of results.
    fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        context: &RankingContext,
    ) -> Result<Vec<SearchResult>>;

    fn name(&self) -> &str;
}

/// Configuration for the preference ranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub click_weight: f64,
    pub view_weight: f64,
    pub skip_weight: f64,
    /// Largest relative score change a result can receive.
    pub max_boost: f64,
    /// Share of the population-wide term affinity mixed into every user.
    pub global_weight: f64,
    /// Terms of a result considered when scoring it.
    pub max_result_terms: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        RankingConfig {
            click_weight: 1.0,
            view_weight: 0.2,
            skip_weight: -0.5,
            max_boost: 0.5,
            global_weight: 0.3,
            max_result_terms: 32,
        }
    }
}

impl RankingConfig {
    /// Candidate configurations for hyperparameter tuning.
    pub fn tuning_grid(&self) -> Vec<Self> {
        let mut grid = Vec::new();
        for max_boost in [0.25, 0.5, 1.0] {
            for global_weight in [0.0, 0.3] {
                grid.push(RankingConfig {
                    max_boost,
                    global_weight,
                    ..self.clone()
                });
            }
        }
        grid
    }

    fn action_weight(&self, action: InteractionAction) -> f64 {
        match action {
            InteractionAction::Click => self.click_weight,
            InteractionAction::View => self.view_weight,
            InteractionAction::Skip => self.skip_weight,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RankerSnapshot {
    config: RankingConfig,
    global_terms: HashMap<String, f64>,
    user_terms: HashMap<String, HashMap<String, f64>>,
    result_affinity: HashMap<String, f64>,
    trained_at: Option<DateTime<Utc>>,
    training_samples: usize,
}

/// Learns which terms and results users engage with.
#[derive(Debug, Clone)]
pub struct PreferenceRanker {
    config: RankingConfig,
    analyzer: StandardAnalyzer,
    global_terms: HashMap<String, f64>,
    user_terms: HashMap<String, HashMap<String, f64>>,
    result_affinity: HashMap<String, f64>,
    trained_at: Option<DateTime<Utc>>,
    training_samples: usize,
}

impl PreferenceRanker {
    pub fn new(config: RankingConfig) -> Self {
        PreferenceRanker {
            config,
            analyzer: StandardAnalyzer::new(),
            global_terms: HashMap::new(),
            user_terms: HashMap::new(),
            result_affinity: HashMap::new(),
            trained_at: None,
            training_samples: 0,
        }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn known_users(&self) -> usize {
        self.user_terms.len()
    }

    /// Affinity of a user for a term, in (-1, 1).
    fn term_affinity(&self, term: &str, context: &RankingContext) -> f64 {
        let mut raw = self.config.global_weight * self.global_terms.get(term).copied().unwrap_or(0.0);
        if let Some(terms) = context
            .user_id
            .as_deref()
            .and_then(|user| self.user_terms.get(user))
        {
            raw += terms.get(term).copied().unwrap_or(0.0);
        }
        raw += context.preferences.get(term).copied().unwrap_or(0.0);
        (raw / 2.0).tanh()
    }

    /// Affinity of a user for one result, in (-1, 1).
    fn result_score(&self, result: &SearchResult, context: &RankingContext) -> f64 {
        let text = format!(
            "{} {} {}",
            result.title,
            result.category.as_deref().unwrap_or(""),
            result.content
        );
        let terms: Vec<String> = self
            .analyzer
            .analyze(&text)
            .into_iter()
            .take(self.config.max_result_terms)
            .collect();
        let term_part = if terms.is_empty() {
            0.0
        } else {
            terms.iter().map(|t| self.term_affinity(t, context)).sum::<f64>() / terms.len() as f64
        };

        let mut result_part = self.result_affinity.get(&result.id).copied().unwrap_or(0.0);
        if context.click_history.iter().any(|id| id == &result.id) {
            result_part += self.config.click_weight;
        }
        (term_part + (result_part / 2.0).tanh()).clamp(-1.0, 1.0)
    }

    /// Predicted engagement of a user with a result id for a query.
    fn predict(&self, interaction: &UserInteractionRecord) -> f64 {
        let context = RankingContext {
            user_id: Some(interaction.user_id.clone()),
            ..Default::default()
        };
        let query_terms = self.analyzer.analyze(&interaction.query);
        let term_part = if query_terms.is_empty() {
            0.0
        } else {
            query_terms
                .iter()
                .map(|t| self.term_affinity(t, &context))
                .sum::<f64>()
                / query_terms.len() as f64
        };
        let result_part = interaction
            .result_id
            .as_ref()
            .and_then(|id| self.result_affinity.get(id))
            .map(|a| (a / 2.0).tanh())
            .unwrap_or(0.0);
        term_part + result_part
    }
}

impl Default for PreferenceRanker {
    fn default() -> Self {
        Self::new(RankingConfig::default())
    }
}

impl RankingCollaborator for PreferenceRanker {
    fn rerank(
        &self,
        _query: &str,
        results: Vec<SearchResult>,
        context: &RankingContext,
    ) -> Result<Vec<SearchResult>> {
        let mut rescored: Vec<SearchResult> = results
            .into_iter()
            .map(|mut result| {
                let boost = self.config.max_boost * self.result_score(&result, context);
                result.score *= 1.0 + boost;
                result
            })
            .collect();
        // Stable: equal scores keep their retrieval order.
        rescored.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(rescored)
    }

    fn name(&self) -> &str {
        "preference"
    }
}

impl TrainableModel for PreferenceRanker {
    fn kind(&self) -> ModelKind {
        ModelKind::PersonalizedRanking
    }

    fn train(&mut self, data: &TrainingData) -> Result<Evaluation> {
        let mut global_terms: HashMap<String, f64> = HashMap::new();
        let mut user_terms: HashMap<String, HashMap<String, f64>> = HashMap::new();
        let mut result_affinity: HashMap<String, f64> = HashMap::new();

        for interaction in &data.metadata.user_interactions {
            let weight = self.config.action_weight(interaction.action);
            let terms = self.analyzer.analyze(&interaction.query);
            let user = user_terms.entry(interaction.user_id.clone()).or_default();
            for term in terms {
                *global_terms.entry(term.clone()).or_insert(0.0) += weight;
                *user.entry(term).or_insert(0.0) += weight;
            }
            if let Some(result_id) = &interaction.result_id {
                *result_affinity.entry(result_id.clone()).or_insert(0.0) += weight;
            }
        }

        let users = user_terms.len().max(1) as f64;
        for weight in global_terms.values_mut() {
            *weight /= users;
        }

        self.global_terms = global_terms;
        self.user_terms = user_terms;
        self.result_affinity = result_affinity;
        self.training_samples = data.metadata.user_interactions.len();
        self.trained_at = Some(Utc::now());
        log::debug!(
            "Preference ranker trained on {} interactions from {} users",
            self.training_samples,
            self.user_terms.len()
        );
        Ok(self.evaluate(data))
    }

    fn evaluate(&self, data: &TrainingData) -> Evaluation {
        let mut counts = ConfusionCounts::default();
        for interaction in &data.metadata.user_interactions {
            let predicted = self.predict(interaction) > 0.0;
            counts.record(predicted, interaction.action == InteractionAction::Click);
        }
        let total_terms: f64 = self.global_terms.values().map(|w| w.abs()).sum();
        let total_results: f64 = self.result_affinity.values().map(|w| w.abs()).sum();
        let total = total_terms + total_results;
        let importance = if total > 0.0 {
            vec![("terms", total_terms / total), ("results", total_results / total)]
        } else {
            Vec::new()
        };
        Evaluation::from_confusion(counts).with_feature_importance(&importance)
    }

    fn is_trained(&self) -> bool {
        self.trained_at.is_some()
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = RankerSnapshot {
            config: self.config.clone(),
            global_terms: self.global_terms.clone(),
            user_terms: self.user_terms.clone(),
            result_affinity: self.result_affinity.clone(),
            trained_at: self.trained_at,
            training_samples: self.training_samples,
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    fn restore(&mut self, bytes: &[u8]) -> Result<()> {
        let snapshot: RankerSnapshot = bincode::deserialize(bytes)?;
        self.config = snapshot.config;
        self.global_terms = snapshot.global_terms;
        self.user_terms = snapshot.user_terms;
        self.result_affinity = snapshot.result_affinity;
        self.trained_at = snapshot.trained_at;
        self.training_samples = snapshot.training_samples;
        Ok(())
    }

    fn size_hint(&self) -> usize {
        let terms: usize = self.global_terms.keys().map(|k| k.len() + 16).sum();
        let users: usize = self
            .user_terms
            .iter()
            .map(|(u, t)| u.len() + t.keys().map(|k| k.len() + 16).sum::<usize>())
            .sum();
        let results: usize = self.result_affinity.keys().map(|k| k.len() + 16).sum();
        terms + users + results
    }
}
