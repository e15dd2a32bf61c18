//! Query suggestion engine.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::normalize_query;
use crate::data::{InteractionAction, TrainingData};
use crate::error::Result;
use crate::ml::{ConfusionCounts, Evaluation, ModelKind, TrainableModel};
use crate::suggestion::index::{QueryStats, SuggestionIndex};
use crate::suggestion::user_context::{UserContextConfig, UserContextStore};
use crate::suggestion::{SuggestionConfig, SuggestionEntry, SuggestionSource, compare_suggestions};

/// Serialized form of a trained engine.
#[derive(Serialize, Deserialize)]
struct EngineSnapshot {
    config: SuggestionConfig,
    entries: Vec<QueryStats>,
    trained_at: Option<DateTime<Utc>>,
    training_samples: usize,
    feature_importance: Vec<(String, f64)>,
}

/// Prefix, frequency and personalization aware query suggestions.
///
/// The index is replaced wholesale by [`TrainableModel::train`]. User
/// contexts are shared through an `Arc` so the same store survives model
/// swaps; use [`QuerySuggestionEngine::with_user_contexts`] to attach one.
#[derive(Debug, Clone)]
pub struct QuerySuggestionEngine {
    config: SuggestionConfig,
    index: SuggestionIndex,
    user_contexts: Arc<UserContextStore>,
    trained_at: Option<DateTime<Utc>>,
    training_samples: usize,
    feature_importance: Vec<(String, f64)>,
}

impl QuerySuggestionEngine {
    pub fn new(config: SuggestionConfig) -> Self {
        QuerySuggestionEngine {
            index: SuggestionIndex::with_capacity(config.prefix_candidates),
            user_contexts: Arc::new(UserContextStore::new(
                UserContextConfig::with_max_query_chars(config.max_query_chars),
            )),
            config,
            trained_at: None,
            training_samples: 0,
            feature_importance: Vec::new(),
        }
    }

    /// Share an externally owned user context store.
    pub fn with_user_contexts(mut self, store: Arc<UserContextStore>) -> Self {
        self.user_contexts = store;
        self
    }

    pub fn user_contexts(&self) -> &Arc<UserContextStore> {
        &self.user_contexts
    }

    pub fn config(&self) -> &SuggestionConfig {
        &self.config
    }

    pub fn index(&self) -> &SuggestionIndex {
        &self.index
    }

    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.trained_at
    }

    /// Suggest up to `max` completions for `partial`.
    ///
    /// An empty `partial` yields the globally most frequent queries. When
    /// `user_id` has a context, matching queries from that user's history
    /// are merged in as personalized entries.
    pub fn get_suggestions(
        &self,
        partial: &str,
        user_id: Option<&str>,
        max: usize,
    ) -> Vec<SuggestionEntry> {
        if max == 0 {
            return Vec::new();
        }
        let prefix = normalize_query(partial, self.config.max_query_chars);
        let wanted = max.max(self.config.eval_top_k);
        let (candidates, source, floor) = if prefix.is_empty() {
            (self.index.most_frequent(wanted), SuggestionSource::Frequency, 0.0)
        } else {
            (self.index.prefix_matches(&prefix, wanted), SuggestionSource::Trie, 0.5)
        };
        let max_weight = candidates.first().map_or(0.0, |s| s.weight);
        let score = |stats: &QueryStats| {
            if max_weight > 0.0 {
                floor + (1.0 - floor) * (stats.weight / max_weight).min(1.0)
            } else {
                floor
            }
        };

        let mut merged: HashMap<String, SuggestionEntry> = HashMap::new();
        for stats in candidates {
            merged.insert(
                stats.query.clone(),
                SuggestionEntry::new(&stats.query, score(stats), source)
                    .with_metadata("count", stats.count),
            );
        }

        if let Some(user_id) = user_id {
            for (query, affinity) in self.user_contexts.matching_history(user_id, &prefix) {
                let base = merged
                    .get(&query)
                    .map(|e| e.confidence)
                    .or_else(|| self.index.get(&query).map(score))
                    .unwrap_or(0.5);
                let confidence = base + self.config.personalization_boost * affinity;
                merged.insert(
                    query.clone(),
                    SuggestionEntry::new(query, confidence, SuggestionSource::Personalized)
                        .with_metadata("affinity", format!("{affinity:.3}")),
                );
            }
        }

        let mut suggestions: Vec<SuggestionEntry> = merged.into_values().collect();
        suggestions.sort_by(compare_suggestions);
        suggestions.truncate(max);
        suggestions
    }

    /// Fold an interaction into the user's profile.
    ///
    /// `meta` may carry an `"action"` key (`click`, `view` or `skip`) that
    /// overrides the `clicked` flag.
    pub fn update_user_context(
        &self,
        user_id: &str,
        query: &str,
        clicked: bool,
        meta: Option<&HashMap<String, String>>,
    ) {
        let action = meta
            .and_then(|m| m.get("action"))
            .and_then(|a| a.parse::<InteractionAction>().ok())
            .unwrap_or(if clicked {
                InteractionAction::Click
            } else {
                InteractionAction::View
            });
        self.record_interaction(user_id, query, action);
    }

    pub fn record_interaction(&self, user_id: &str, query: &str, action: InteractionAction) {
        self.user_contexts.record(user_id, query, action);
    }

    fn build_index(&self, data: &TrainingData) -> (SuggestionIndex, Vec<(String, f64)>) {
        let mut index = SuggestionIndex::with_capacity(self.config.prefix_candidates);
        let mut feature_weight = 0.0;
        let mut log_weight = 0.0;

        for (query, label) in data.samples() {
            if matches!(label.as_f64(), Some(v) if v <= 0.0) {
                continue;
            }
            let normalized = normalize_query(query, self.config.max_query_chars);
            if !normalized.is_empty() {
                index.insert(&normalized, 1.0, None);
                feature_weight += 1.0;
            }
        }

        let logs = &data.metadata.search_logs;
        if let Some(reference) = logs.iter().map(|l| l.timestamp).max() {
            let half_life = self.config.recency_half_life_days.max(f64::EPSILON);
            for log in logs {
                let normalized = normalize_query(&log.query, self.config.max_query_chars);
                if normalized.is_empty() {
                    continue;
                }
                let age_days = (reference - log.timestamp).num_seconds().max(0) as f64 / 86_400.0;
                let decay = 0.5_f64.powf(age_days / half_life);
                let weight = decay * if log.clicked { self.config.click_weight } else { 1.0 };
                index.insert(&normalized, weight, Some(log.timestamp));
                log_weight += weight;
            }
        }
        index.rebuild_rankings();

        let total = feature_weight + log_weight + self.config.personalization_boost;
        let importance = if total > 0.0 {
            vec![
                ("frequency".to_string(), feature_weight / total),
                ("recency".to_string(), log_weight / total),
                (
                    "personalization".to_string(),
                    self.config.personalization_boost / total,
                ),
            ]
        } else {
            Vec::new()
        };
        (index, importance)
    }
}

impl Default for QuerySuggestionEngine {
    fn default() -> Self {
        Self::new(SuggestionConfig::default())
    }
}

impl TrainableModel for QuerySuggestionEngine {
    fn kind(&self) -> ModelKind {
        ModelKind::QuerySuggestion
    }

    fn train(&mut self, data: &TrainingData) -> Result<Evaluation> {
        let data = data.normalized();
        let (index, importance) = self.build_index(&data);
        log::debug!(
            "Suggestion index built: {} queries from {} samples and {} log entries",
            index.len(),
            data.len(),
            data.metadata.search_logs.len()
        );
        self.index = index;
        self.feature_importance = importance;
        self.training_samples = data.len() + data.metadata.search_logs.len();
        self.trained_at = Some(Utc::now());
        Ok(self.evaluate(&data))
    }

    fn evaluate(&self, data: &TrainingData) -> Evaluation {
        let mut counts = ConfusionCounts::default();
        for (query, label) in data.samples() {
            let normalized = normalize_query(query, self.config.max_query_chars);
            if normalized.is_empty() {
                continue;
            }
            let prefix_chars = (normalized.chars().count() / 2).max(1);
            let prefix: String = normalized.chars().take(prefix_chars).collect();
            let found = self
                .get_suggestions(&prefix, None, self.config.eval_top_k)
                .iter()
                .any(|s| s.text == normalized);
            counts.record(found, label.is_positive());
        }
        let mut evaluation = Evaluation::from_confusion(counts);
        evaluation.feature_importance = self.feature_importance.iter().cloned().collect();
        evaluation
    }

    fn is_trained(&self) -> bool {
        self.trained_at.is_some()
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = EngineSnapshot {
            config: self.config.clone(),
            entries: self.index.entries(),
            trained_at: self.trained_at,
            training_samples: self.training_samples,
            feature_importance: self.feature_importance.clone(),
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    fn restore(&mut self, bytes: &[u8]) -> Result<()> {
        let snapshot: EngineSnapshot = bincode::deserialize(bytes)?;
        self.index =
            SuggestionIndex::from_entries(snapshot.entries, snapshot.config.prefix_candidates);
        self.config = snapshot.config;
        self.trained_at = snapshot.trained_at;
        self.training_samples = snapshot.training_samples;
        self.feature_importance = snapshot.feature_importance;
        Ok(())
    }

    fn size_hint(&self) -> usize {
        self.index.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::data::{Label, SearchLogEntry};

    fn trained_engine() -> QuerySuggestionEngine {
        let mut engine = QuerySuggestionEngine::default();
        let data = TrainingData::from_queries(
            &[
                "reset password",
                "reset password",
                "reset password",
                "reset pin",
                "report outage",
                "db2 deadlock",
            ],
            &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
        );
        engine.train(&data).unwrap();
        engine
    }

    #[test]
    fn test_untrained_returns_empty() {
        let engine = QuerySuggestionEngine::default();
        assert!(!engine.is_trained());
        assert!(engine.get_suggestions("re", None, 5).is_empty());
    }

    #[test]
    fn test_prefix_suggestions_respect_max_and_order() {
        let engine = trained_engine();
        let suggestions = engine.get_suggestions("Re", None, 2);
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].text, "reset password");
        assert_eq!(suggestions[0].source, SuggestionSource::Trie);
        assert!((suggestions[0].confidence - 1.0).abs() < 1e-9);
        assert!(suggestions[0].confidence >= suggestions[1].confidence);

        assert!(engine.get_suggestions("re", None, 0).is_empty());
        assert!(engine.get_suggestions("xyz", None, 5).is_empty());
    }

    #[test]
    fn test_empty_prefix_uses_frequency() {
        let engine = trained_engine();
        let suggestions = engine.get_suggestions("", None, 3);
        assert_eq!(suggestions.len(), 3);
        assert!(
            suggestions
                .iter()
                .all(|s| s.source == SuggestionSource::Frequency)
        );
        assert_eq!(suggestions[0].text, "reset password");
    }

    #[test]
    fn test_personalized_entries_are_prioritized() {
        let engine = trained_engine();
        engine.update_user_context("alice", "report outage", true, None);

        let suggestions = engine.get_suggestions("re", Some("alice"), 5);
        assert_eq!(suggestions[0].text, "report outage");
        assert_eq!(suggestions[0].source, SuggestionSource::Personalized);

        let anonymous = engine.get_suggestions("re", None, 5);
        assert_eq!(anonymous[0].text, "reset password");
    }

    #[test]
    fn test_meta_action_overrides_clicked() {
        let engine = trained_engine();
        let meta = HashMap::from([("action".to_string(), "skip".to_string())]);
        engine.update_user_context("bob", "reset pin", true, Some(&meta));
        let context = engine.user_contexts().get("bob").unwrap();
        assert_eq!(context.history[0].action, InteractionAction::Skip);
        assert!(
            engine
                .get_suggestions("re", Some("bob"), 5)
                .iter()
                .all(|s| s.source != SuggestionSource::Personalized)
        );
    }

    #[test]
    fn test_negative_labels_are_not_indexed() {
        let mut engine = QuerySuggestionEngine::default();
        let data = TrainingData::new(
            vec!["good query".to_string(), "bad query".to_string()],
            vec![Label::Numeric(1.0), Label::Numeric(0.0)],
        );
        let evaluation = engine.train(&data).unwrap();
        assert!(engine.index().get("bad query").is_none());
        assert!((evaluation.accuracy - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_recent_logs_weigh_more() {
        let now = Utc::now();
        let mut data = TrainingData::default();
        for (query, age_days) in [("old topic", 120), ("new topic", 0)] {
            data.metadata.search_logs.push(SearchLogEntry {
                query: query.to_string(),
                timestamp: now - Duration::days(age_days),
                result_count: 3,
                response_time_ms: 12.0,
                user_id: None,
                clicked: false,
            });
        }
        let mut engine = QuerySuggestionEngine::default();
        engine.train(&data).unwrap();
        let suggestions = engine.get_suggestions("", None, 2);
        assert_eq!(suggestions[0].text, "new topic");
        assert!(suggestions[1].confidence < 0.1);
    }

    #[test]
    fn test_training_on_empty_data() {
        let mut engine = QuerySuggestionEngine::default();
        let evaluation = engine.train(&TrainingData::default()).unwrap();
        assert!(engine.is_trained());
        assert_eq!(evaluation.accuracy, 0.0);
        assert!(engine.get_suggestions("", None, 5).is_empty());
    }

    #[test]
    fn test_snapshot_restore_reproduces_suggestions() {
        let engine = trained_engine();
        let bytes = engine.snapshot().unwrap();

        let mut restored = QuerySuggestionEngine::default();
        restored.restore(&bytes).unwrap();
        assert_eq!(
            restored.get_suggestions("re", None, 5),
            engine.get_suggestions("re", None, 5)
        );
        assert!(restored.is_trained());
    }

    #[test]
    fn test_heaviest_completion_wins_on_a_broad_prefix() {
        let mut queries: Vec<String> = (0..6000).map(|i| format!("a{i:05}")).collect();
        queries.extend(std::iter::repeat_n("azzz heavy".to_string(), 50));
        let labels = vec![1.0; queries.len()];
        let mut engine = QuerySuggestionEngine::default();
        engine
            .train(&TrainingData::from_queries(&queries, &labels))
            .unwrap();

        let top = engine.get_suggestions("a", None, 3);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].text, "azzz heavy");
        assert!((top[0].confidence - 1.0).abs() < 1e-9);
        assert!(top[1].confidence < 0.6);
        assert_eq!(engine.get_suggestions("", None, 1)[0].text, "azzz heavy");
    }

    #[test]
    fn test_personal_history_outside_cached_candidates_scores_by_weight() {
        let mut queries: Vec<String> = (0..100).map(|i| format!("job {i:03}")).collect();
        queries.extend(std::iter::repeat_n("job 099".to_string(), 9));
        let labels = vec![1.0; queries.len()];
        let mut engine = QuerySuggestionEngine::new(SuggestionConfig {
            prefix_candidates: 2,
            eval_top_k: 1,
            personalization_boost: 0.2,
            ..Default::default()
        });
        engine
            .train(&TrainingData::from_queries(&queries, &labels))
            .unwrap();
        engine.update_user_context("carol", "job 042", true, None);

        let suggestions = engine.get_suggestions("job", Some("carol"), 2);
        assert_eq!(suggestions[0].text, "job 099");
        assert_eq!(suggestions[1].text, "job 042");
        assert_eq!(suggestions[1].source, SuggestionSource::Personalized);
        // 0.5 + 0.5 * (1 / 10) from the index, plus the boost.
        assert!((suggestions[1].confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_history_keys_follow_the_engine_query_limit() {
        let mut engine = QuerySuggestionEngine::new(SuggestionConfig {
            max_query_chars: 12,
            ..Default::default()
        });
        engine
            .train(&TrainingData::from_queries(&["db2 deadlock on table space"], &[1.0]))
            .unwrap();
        engine.update_user_context("dave", "db2 deadlock on table space", true, None);

        assert_eq!(engine.user_contexts().config().max_query_chars, 12);
        let context = engine.user_contexts().get("dave").unwrap();
        assert_eq!(context.history[0].query, "db2 deadlock");
        let suggestions = engine.get_suggestions("DB2 deadlock on", Some("dave"), 3);
        assert_eq!(suggestions[0].text, "db2 deadlock");
        assert_eq!(suggestions[0].source, SuggestionSource::Personalized);
    }
}
