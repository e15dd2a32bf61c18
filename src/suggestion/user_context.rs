//! Per-user interaction history and derived term preferences.
//!
//! Contexts live in a sharded [`DashMap`], so updates for different users do
//! not contend. The store is bounded: at most `max_users` contexts are kept
//! (least recently active evicted first) and each keeps at most
//! `max_history` events.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::analysis::{Analyzer, StandardAnalyzer, normalize_query};
use crate::data::InteractionAction;

/// Configuration for user contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserContextConfig {
    /// Maximum number of users kept in memory.
    pub max_users: usize,
    /// Maximum history events kept per user.
    pub max_history: usize,
    /// Preference delta for a click.
    pub click_weight: f64,
    /// Preference delta for a view.
    pub view_weight: f64,
    /// Preference delta for a skip.
    pub skip_weight: f64,
    /// Per-event decay applied to history affinity, newest first.
    pub history_decay: f64,
    /// Longest query (in chars) kept in history. Keep equal to the
    /// suggestion engine's limit so history keys match its prefixes.
    pub max_query_chars: usize,
}

impl Default for UserContextConfig {
    fn default() -> Self {
        UserContextConfig {
            max_users: 10_000,
            max_history: 50,
            click_weight: 1.0,
            view_weight: 0.2,
            skip_weight: -0.5,
            history_decay: 0.9,
            max_query_chars: 256,
        }
    }
}

impl UserContextConfig {
    /// Defaults, with history keys truncated at `max_query_chars`.
    pub fn with_max_query_chars(max_query_chars: usize) -> Self {
        UserContextConfig {
            max_query_chars,
            ..Default::default()
        }
    }

    fn action_weight(&self, action: InteractionAction) -> f64 {
        match action {
            InteractionAction::Click => self.click_weight,
            InteractionAction::View => self.view_weight,
            InteractionAction::Skip => self.skip_weight,
        }
    }
}

/// One recorded interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// Normalized query.
    pub query: String,
    pub action: InteractionAction,
    pub timestamp: DateTime<Utc>,
}

/// A user's rolling history and term preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub history: VecDeque<InteractionEvent>,
    /// Raw accumulated preference per term.
    preferences: HashMap<String, f64>,
    pub last_active: DateTime<Utc>,
    pub interaction_count: u64,
}

impl UserContext {
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        UserContext {
            user_id: user_id.to_string(),
            history: VecDeque::new(),
            preferences: HashMap::new(),
            last_active: now,
            interaction_count: 0,
        }
    }

    fn apply(&mut self, event: InteractionEvent, terms: &[String], config: &UserContextConfig) {
        let delta = config.action_weight(event.action);
        for term in terms {
            let weight = self.preferences.entry(term.clone()).or_insert(0.0);
            *weight = (*weight + delta).clamp(-10.0, 10.0);
        }
        self.last_active = self.last_active.max(event.timestamp);
        self.interaction_count += 1;
        self.history.push_back(event);
        while self.history.len() > config.max_history {
            self.history.pop_front();
        }
    }

    /// Preference weight of a term in [-1, 1].
    pub fn preference(&self, term: &str) -> f64 {
        self.preferences.get(term).map_or(0.0, |w| (w / 2.0).tanh())
    }

    /// All term preferences, normalized to [-1, 1].
    pub fn preference_weights(&self) -> HashMap<String, f64> {
        self.preferences
            .iter()
            .map(|(term, w)| (term.clone(), (w / 2.0).tanh()))
            .collect()
    }

    /// Past queries starting with `prefix`, with an affinity in (0, 1].
    ///
    /// Affinity sums the action weights of the query's events, decayed by
    /// how far back each event is, and is normalized by the strongest query.
    /// Queries that end up with no positive affinity are left out.
    pub fn matching_history(&self, prefix: &str, config: &UserContextConfig) -> Vec<(String, f64)> {
        let mut scores: HashMap<&str, f64> = HashMap::new();
        let mut decay = 1.0;
        for event in self.history.iter().rev() {
            if event.query.starts_with(prefix) {
                let base = match event.action {
                    InteractionAction::Click => 1.0,
                    InteractionAction::View => 0.3,
                    InteractionAction::Skip => -0.5,
                };
                *scores.entry(event.query.as_str()).or_insert(0.0) += base * decay;
            }
            decay *= config.history_decay;
        }

        let max = scores.values().copied().fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return Vec::new();
        }
        let mut matches: Vec<(String, f64)> = scores
            .into_iter()
            .filter(|(_, s)| *s > 0.0)
            .map(|(q, s)| (q.to_string(), s / max))
            .collect();
        matches.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        matches
    }

    /// Queries the user searched for, most recent first, without repeats.
    pub fn recent_queries(&self, limit: usize) -> Vec<String> {
        let mut seen = Vec::new();
        for event in self.history.iter().rev() {
            if !seen.contains(&event.query) {
                seen.push(event.query.clone());
                if seen.len() >= limit {
                    break;
                }
            }
        }
        seen
    }
}

/// Concurrent, bounded store of user contexts.
#[derive(Debug)]
pub struct UserContextStore {
    config: UserContextConfig,
    contexts: DashMap<String, UserContext>,
    analyzer: StandardAnalyzer,
}

impl UserContextStore {
    pub fn new(config: UserContextConfig) -> Self {
        UserContextStore {
            config,
            contexts: DashMap::new(),
            analyzer: StandardAnalyzer::new(),
        }
    }

    pub fn config(&self) -> &UserContextConfig {
        &self.config
    }

    /// Record an interaction now.
    pub fn record(&self, user_id: &str, query: &str, action: InteractionAction) {
        self.record_at(user_id, query, action, Utc::now());
    }

    /// Record an interaction at an explicit time.
    pub fn record_at(
        &self,
        user_id: &str,
        query: &str,
        action: InteractionAction,
        timestamp: DateTime<Utc>,
    ) {
        let normalized = normalize_query(query, self.config.max_query_chars);
        if user_id.is_empty() || normalized.is_empty() {
            return;
        }
        let terms = self.analyzer.analyze(&normalized);
        let event = InteractionEvent {
            query: normalized,
            action,
            timestamp,
        };

        {
            let mut context = self
                .contexts
                .entry(user_id.to_string())
                .or_insert_with(|| UserContext::new(user_id, timestamp));
            context.apply(event, &terms, &self.config);
        }

        if self.contexts.len() > self.config.max_users {
            self.evict_least_recent();
        }
    }

    fn evict_least_recent(&self) {
        while self.contexts.len() > self.config.max_users {
            let oldest = self
                .contexts
                .iter()
                .min_by(|a, b| {
                    a.last_active
                        .cmp(&b.last_active)
                        .then_with(|| a.key().cmp(b.key()))
                })
                .map(|entry| entry.key().clone());
            match oldest {
                Some(user_id) => {
                    log::debug!("Evicting user context for {user_id}");
                    self.contexts.remove(&user_id);
                }
                None => break,
            }
        }
    }

    /// A snapshot of one user's context.
    pub fn get(&self, user_id: &str) -> Option<UserContext> {
        self.contexts.get(user_id).map(|c| c.clone())
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.contexts.contains_key(user_id)
    }

    /// History matches for a user, see [`UserContext::matching_history`].
    pub fn matching_history(&self, user_id: &str, prefix: &str) -> Vec<(String, f64)> {
        self.contexts
            .get(user_id)
            .map(|c| c.matching_history(prefix, &self.config))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn clear(&self) {
        self.contexts.clear();
    }
}

impl Default for UserContextStore {
    fn default() -> Self {
        Self::new(UserContextConfig::default())
    }
}
