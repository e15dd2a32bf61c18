//! The search service.
//!
//! [`SearchService`] serves searches from an immutable [`ModelBundle`] and
//! swaps in a new bundle after each retrain. Readers clone the bundle `Arc`
//! under a momentary read lock and never hold the lock while working.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::{self, JoinError};

use crate::data::{InteractionAction, SearchMetric, TrainingData, UserInteractionRecord};
use crate::error::{Result, XiphosError};
use crate::ml::ModelKind;
use crate::ml::anomaly::{AnomalyCollaborator, AnomalyEvent};
use crate::ml::optimization::OptimizationCollaborator;
use crate::ml::ranking::{RankingCollaborator, RankingContext};
use crate::pipeline::{ModelServices, PersistenceReport, PipelineMetrics, TrainingPipeline};
use crate::service::config::ServiceConfig;
use crate::service::result_store::{InMemoryResultStore, ResultStore};
use crate::service::types::{
    HealthStatus, ModelHealth, PageInfo, Pagination, SearchRequest, SearchResponse,
    SearchResult, SemanticAnalysis, SystemInsights, Trend, TrendDirection,
};
use crate::suggestion::UserContextStore;

/// Recent queries of a known user added to the ranking context.
const CONTEXT_HISTORY: usize = 10;

/// A published, immutable set of trained models.
#[derive(Debug)]
pub struct ModelBundle {
    /// Increases by one with every publication.
    pub version: u64,
    pub published_at: DateTime<Utc>,
    pub services: ModelServices,
}

/// Caller-supplied collaborators that replace the trained defaults.
#[derive(Debug, Default, Clone)]
struct CollaboratorOverrides {
    ranking: Option<Arc<dyn RankingCollaborator>>,
    anomaly: Option<Arc<dyn AnomalyCollaborator>>,
    optimization: Option<Arc<dyn OptimizationCollaborator>>,
}

impl CollaboratorOverrides {
    fn apply(&self, mut services: ModelServices) -> ModelServices {
        if let Some(ranking) = &self.ranking {
            services.ranking = Arc::clone(ranking);
        }
        if let Some(anomaly) = &self.anomaly {
            services.anomaly = Arc::clone(anomaly);
        }
        if let Some(optimization) = &self.optimization {
            services.optimization = Arc::clone(optimization);
        }
        services
    }
}

/// Top-level search orchestrator.
///
/// Uninitialized until [`initialize`](Self::initialize) or
/// [`import_models`](Self::import_models) publishes a bundle; `search`
/// fails with [`XiphosError::NotInitialized`] before that.
pub struct SearchService {
    config: ServiceConfig,
    store: Arc<dyn ResultStore>,
    overrides: CollaboratorOverrides,
    bundle: RwLock<Option<Arc<ModelBundle>>>,
    next_version: AtomicU64,
    pipeline: Arc<Mutex<TrainingPipeline>>,
    /// Serializes retrains, imports and exports.
    retrain_gate: tokio::sync::Mutex<()>,
    last_metrics: RwLock<Option<PipelineMetrics>>,
    user_contexts: Arc<UserContextStore>,
    metrics: Mutex<VecDeque<SearchMetric>>,
    interactions: Mutex<VecDeque<UserInteractionRecord>>,
}

impl SearchService {
    /// A service over an empty in-memory result store.
    pub fn new(config: ServiceConfig) -> Self {
        let mut contexts_config = config.user_contexts.clone();
        let query_chars = config.pipeline.models.suggestion.max_query_chars;
        if contexts_config.max_query_chars != query_chars {
            log::warn!(
                "User context query limit {} differs from the suggestion limit {query_chars}, using {query_chars}",
                contexts_config.max_query_chars
            );
            contexts_config.max_query_chars = query_chars;
        }
        let user_contexts = Arc::new(UserContextStore::new(contexts_config));
        let pipeline = TrainingPipeline::new(config.pipeline.clone())
            .with_user_contexts(Arc::clone(&user_contexts));
        SearchService {
            store: Arc::new(InMemoryResultStore::default()),
            overrides: CollaboratorOverrides::default(),
            bundle: RwLock::new(None),
            next_version: AtomicU64::new(0),
            pipeline: Arc::new(Mutex::new(pipeline)),
            retrain_gate: tokio::sync::Mutex::new(()),
            last_metrics: RwLock::new(None),
            user_contexts,
            metrics: Mutex::new(VecDeque::with_capacity(config.metric_window)),
            interactions: Mutex::new(VecDeque::new()),
            config,
        }
    }

    pub fn with_result_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = store;
        self
    }

    /// Use `ranking` instead of the trained ranker, across retrains.
    pub fn with_ranking(mut self, ranking: Arc<dyn RankingCollaborator>) -> Self {
        self.overrides.ranking = Some(ranking);
        self
    }

    /// Use `anomaly` instead of the trained detector, across retrains.
    pub fn with_anomaly_detector(mut self, anomaly: Arc<dyn AnomalyCollaborator>) -> Self {
        self.overrides.anomaly = Some(anomaly);
        self
    }

    /// Use `optimization` instead of the trained optimizer, across retrains.
    pub fn with_optimizer(mut self, optimization: Arc<dyn OptimizationCollaborator>) -> Self {
        self.overrides.optimization = Some(optimization);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn user_contexts(&self) -> &Arc<UserContextStore> {
        &self.user_contexts
    }

    pub fn is_service_initialized(&self) -> bool {
        self.bundle.read().is_some()
    }

    /// Version of the active bundle.
    pub fn bundle_version(&self) -> Option<u64> {
        self.bundle.read().as_ref().map(|b| b.version)
    }

    /// Metrics of the latest training run.
    pub fn last_training_metrics(&self) -> Option<PipelineMetrics> {
        self.last_metrics.read().clone()
    }

    /// Logged interactions, oldest first.
    pub fn recorded_interactions(&self) -> Vec<UserInteractionRecord> {
        self.interactions.lock().iter().cloned().collect()
    }

    /// Recent search metrics, oldest first.
    pub fn metric_window(&self) -> Vec<SearchMetric> {
        self.metrics.lock().iter().cloned().collect()
    }

    /// Train every configured model and start serving.
    ///
    /// Per-model training failures do not fail initialization: the affected
    /// kinds are served by untrained defaults. Only a panic of the training
    /// task is returned as an error.
    pub async fn initialize(&self, data: &TrainingData) -> Result<PipelineMetrics> {
        log::info!("Initializing search service with {} samples", data.len());
        let metrics = self.retrain_models(data).await?;
        if metrics.success_rate < 1.0 {
            log::warn!(
                "Search service initialized with {} of {} models trained",
                metrics.results.iter().filter(|r| r.is_success()).count(),
                metrics.models_trained
            );
        }
        Ok(metrics)
    }

    /// Retrain off to the side and publish the result in one swap.
    ///
    /// Logged interactions are added to the training data's user
    /// interactions. Concurrent retrains wait for each other; searches are
    /// never blocked.
    pub async fn retrain_models(&self, data: &TrainingData) -> Result<PipelineMetrics> {
        let _gate = self.retrain_gate.lock().await;

        let mut data = data.clone();
        data.metadata
            .user_interactions
            .extend(self.interactions.lock().iter().cloned());

        let pipeline = Arc::clone(&self.pipeline);
        let (metrics, services) = task::spawn_blocking(move || {
            let mut pipeline = pipeline.lock();
            let metrics = pipeline.run_full_pipeline(&data);
            (metrics, pipeline.get_model_services())
        })
        .await
        .map_err(|e| task_failed("training", e))?;

        let version = self.publish(services);
        log::info!(
            "Published model bundle v{version}: success rate {:.2}, average accuracy {:.3}",
            metrics.success_rate,
            metrics.average_accuracy
        );
        *self.last_metrics.write() = Some(metrics.clone());
        Ok(metrics)
    }

    fn publish(&self, services: ModelServices) -> u64 {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        let bundle = ModelBundle {
            version,
            published_at: Utc::now(),
            services: self.overrides.apply(services),
        };
        *self.bundle.write() = Some(Arc::new(bundle));
        version
    }

    fn active_bundle(&self) -> Result<Arc<ModelBundle>> {
        self.bundle
            .read()
            .clone()
            .ok_or_else(|| XiphosError::not_initialized("search service not initialized; call initialize() first"))
    }

    /// Run one search.
    ///
    /// Every phase is best-effort: a failing phase is logged and leaves its
    /// part of the response empty. The only error is calling this before
    /// the service is initialized.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();
        let bundle = self.active_bundle()?;
        let services = &bundle.services;
        let query = request.query.trim();

        let enhancement = services.semantic.enhance_query(query);
        let semantic_analysis = SemanticAnalysis {
            complexity: services.semantic.analyze_query_complexity(query),
            sentiment: services.semantic.analyze_sentiment(query),
            category: services.semantic.categorize(query),
            enhancement: Some(enhancement.clone()),
        };

        let mut retrieval_failed = false;
        let mut candidates = self.retrieve(query, &mut retrieval_failed);
        if candidates.is_empty()
            && !query.is_empty()
            && enhancement.expanded_query != enhancement.original_query
        {
            log::debug!("No results for '{query}'; retrying with '{}'", enhancement.expanded_query);
            candidates = self.retrieve(&enhancement.expanded_query, &mut retrieval_failed);
        }

        let user_id = request.effective_user_id();
        let mut personalization_applied = false;
        let wants_personalization = request.personalization.is_some()
            || user_id.is_some_and(|u| self.user_contexts.contains(u));
        if wants_personalization && !candidates.is_empty() {
            let context = self.ranking_context(&request);
            match services.ranking.rerank(query, candidates.clone(), &context) {
                Ok(reranked) => {
                    candidates = reranked;
                    personalization_applied = true;
                }
                Err(e) => log::warn!("Ranking with {} failed: {e}", services.ranking.name()),
            }
        }

        let suggestions = services
            .suggestion
            .get_suggestions(query, user_id, self.config.max_suggestions);

        let total_count = candidates.len();
        let (offset, limit) = clamp_page(
            request.pagination,
            self.config.default_page_size,
            self.config.max_page_size,
        );
        let results: Vec<SearchResult> = candidates.into_iter().skip(offset).take(limit).collect();

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let (anomalies_detected, window) =
            self.record_metric(services.anomaly.as_ref(), latency_ms, retrieval_failed);

        let optimization_insights = services
            .optimization
            .insights(&services.optimization_history, &window, latency_ms)
            .unwrap_or_else(|e| {
                log::warn!("Optimization insights from {} failed: {e}", services.optimization.name());
                Vec::new()
            });

        Ok(SearchResponse {
            results,
            suggestions,
            total_count,
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            semantic_analysis,
            personalization_applied,
            anomalies_detected,
            optimization_insights,
            pagination: PageInfo {
                offset,
                limit,
                total_items: total_count,
            },
        })
    }

    fn retrieve(&self, query: &str, failed: &mut bool) -> Vec<SearchResult> {
        match self.store.retrieve(query, self.config.max_candidates) {
            Ok(results) => results,
            Err(e) => {
                log::warn!("Retrieval from {} failed: {e}", self.store.name());
                *failed = true;
                Vec::new()
            }
        }
    }

    /// Request signals merged with what the service knows about the user.
    fn ranking_context(&self, request: &SearchRequest) -> RankingContext {
        let mut context = RankingContext {
            user_id: request.effective_user_id().map(str::to_string),
            ..Default::default()
        };
        if let Some(personalization) = &request.personalization {
            context.search_history = personalization.search_history.clone();
            context.click_history = personalization.click_history.clone();
            context.preferences = personalization.preferences.clone();
        }

        if let Some(user_id) = context.user_id.clone() {
            if let Some(user) = self.user_contexts.get(&user_id) {
                for query in user.recent_queries(CONTEXT_HISTORY) {
                    if !context.search_history.contains(&query) {
                        context.search_history.push(query);
                    }
                }
                // Explicit request preferences win.
                for (term, weight) in user.preference_weights() {
                    context.preferences.entry(term).or_insert(weight);
                }
            }
            for record in self.interactions.lock().iter() {
                if record.user_id == user_id
                    && record.action == InteractionAction::Click
                    && let Some(result_id) = &record.result_id
                    && !context.click_history.contains(result_id)
                {
                    context.click_history.push(result_id.clone());
                }
            }
        }
        context
    }

    /// Append this search to the metric window and check the window for
    /// anomalies. Returns the events and a copy of the window.
    fn record_metric(
        &self,
        anomaly: &dyn AnomalyCollaborator,
        latency_ms: f64,
        retrieval_failed: bool,
    ) -> (Vec<AnomalyEvent>, Vec<SearchMetric>) {
        let click_through_rate = self.click_through_rate();
        let timestamp = Utc::now();
        let mut window: Vec<SearchMetric> = {
            let mut metrics = self.metrics.lock();
            metrics.push_back(SearchMetric {
                timestamp,
                query_count: 1,
                average_response_time: latency_ms,
                error_rate: if retrieval_failed { 1.0 } else { 0.0 },
                click_through_rate,
                is_anomaly: false,
            });
            while metrics.len() > self.config.metric_window {
                metrics.pop_front();
            }
            metrics.iter().cloned().collect()
        };

        // Detection runs unlocked; concurrent searches may append meanwhile.
        let events = anomaly.detect(&window).unwrap_or_else(|e| {
            log::warn!("Anomaly detection with {} failed: {e}", anomaly.name());
            Vec::new()
        });
        if !events.is_empty() {
            log::info!("{} anomal(ies) detected in search traffic", events.len());
            if let Some(latest) = window.last_mut() {
                latest.is_anomaly = true;
            }
            let mut metrics = self.metrics.lock();
            if let Some(recorded) = metrics.iter_mut().rev().find(|m| {
                m.timestamp == timestamp && m.average_response_time == latency_ms
            }) {
                recorded.is_anomaly = true;
            }
        }
        (events, window)
    }

    /// Share of logged interactions that are clicks.
    fn click_through_rate(&self) -> f64 {
        let interactions = self.interactions.lock();
        if interactions.is_empty() {
            return 0.0;
        }
        let clicks = interactions
            .iter()
            .filter(|r| r.action == InteractionAction::Click)
            .count();
        clicks as f64 / interactions.len() as f64
    }

    /// Record what a user did with a result. Never fails; empty user ids
    /// and queries are ignored.
    pub fn update_user_interaction(
        &self,
        user_id: &str,
        result_id: &str,
        query: &str,
        action: InteractionAction,
        meta: Option<&HashMap<String, String>>,
    ) {
        if user_id.trim().is_empty() || query.trim().is_empty() {
            log::debug!("Ignoring interaction without user or query");
            return;
        }
        if let Some(meta) = meta {
            log::debug!("Interaction {} by {user_id} on {result_id}: {meta:?}", action.as_str());
        }

        let bundle = self.bundle.read().clone();
        match bundle {
            Some(bundle) => bundle.services.suggestion.record_interaction(user_id, query, action),
            None => self.user_contexts.record(user_id, query, action),
        }

        let mut interactions = self.interactions.lock();
        interactions.push_back(UserInteractionRecord {
            user_id: user_id.to_string(),
            query: query.to_string(),
            result_id: (!result_id.is_empty()).then(|| result_id.to_string()),
            action,
            timestamp: Utc::now(),
        });
        while interactions.len() > self.config.interaction_log_size {
            interactions.pop_front();
        }
    }

    /// Health of every model kind, keyed by model id.
    pub fn get_model_health(&self) -> BTreeMap<String, ModelHealth> {
        let bundle = self.bundle.read().clone();
        let now = Utc::now();
        let max_age = chrono::Duration::hours(self.config.retrain_interval_hours as i64);

        ModelKind::ALL
            .into_iter()
            .map(|kind| {
                let result = bundle.as_ref().and_then(|b| b.services.results.get(&kind));
                let health = match result {
                    None => ModelHealth {
                        status: HealthStatus::Critical,
                        accuracy: 0.0,
                        last_trained: None,
                        message: Some("never trained successfully".to_string()),
                    },
                    Some(result) => {
                        let accuracy = result.evaluation.accuracy;
                        let message = if accuracy < self.config.health_accuracy_threshold {
                            Some(format!(
                                "accuracy {accuracy:.3} below {:.3}",
                                self.config.health_accuracy_threshold
                            ))
                        } else if now - result.trained_at > max_age {
                            Some(format!(
                                "last trained more than {}h ago",
                                self.config.retrain_interval_hours
                            ))
                        } else {
                            None
                        };
                        ModelHealth {
                            status: if message.is_some() {
                                HealthStatus::Warning
                            } else {
                                HealthStatus::Healthy
                            },
                            accuracy,
                            last_trained: Some(result.trained_at),
                            message,
                        }
                    }
                };
                (kind.as_str().to_string(), health)
            })
            .collect()
    }

    /// Trends, anomalies, tuning opportunities and model alerts over the
    /// current metric window.
    pub fn get_system_insights(&self) -> SystemInsights {
        let window = self.metric_window();
        let trends = compute_trends(&window, self.config.trend_tolerance);

        let bundle = self.bundle.read().clone();
        let (anomalies, optimization_opportunities) = match bundle {
            Some(bundle) => {
                let services = &bundle.services;
                let anomalies = services.anomaly.detect(&window).unwrap_or_else(|e| {
                    log::warn!("Anomaly detection failed: {e}");
                    Vec::new()
                });
                let mean_latency = if window.is_empty() {
                    0.0
                } else {
                    window.iter().map(|m| m.average_response_time).sum::<f64>() / window.len() as f64
                };
                let insights = services
                    .optimization
                    .insights(&services.optimization_history, &window, mean_latency)
                    .unwrap_or_else(|e| {
                        log::warn!("Optimization insights failed: {e}");
                        Vec::new()
                    });
                (anomalies, insights)
            }
            None => (Vec::new(), Vec::new()),
        };

        let model_alerts = self
            .get_model_health()
            .into_iter()
            .filter(|(_, health)| health.status != HealthStatus::Healthy)
            .map(|(id, health)| match health.message {
                Some(message) => format!("{id}: {} ({message})", health.status.as_str()),
                None => format!("{id}: {}", health.status.as_str()),
            })
            .collect();

        SystemInsights {
            trends,
            anomalies,
            optimization_opportunities,
            model_alerts,
        }
    }

    /// Save the active models into `path`.
    pub async fn export_models<P: AsRef<Path>>(&self, path: P) -> Result<PersistenceReport> {
        self.active_bundle()?;
        let _gate = self.retrain_gate.lock().await;
        let path = path.as_ref().to_path_buf();
        let pipeline = Arc::clone(&self.pipeline);
        task::spawn_blocking(move || pipeline.lock().save_all_models(&path))
            .await
            .map_err(|e| task_failed("export", e))?
    }

    /// Load models saved by [`export_models`](Self::export_models) and
    /// serve them.
    pub async fn import_models<P: AsRef<Path>>(&self, path: P) -> Result<PersistenceReport> {
        let _gate = self.retrain_gate.lock().await;
        let path = path.as_ref().to_path_buf();
        let pipeline = Arc::clone(&self.pipeline);
        let (report, services) = task::spawn_blocking(move || {
            let mut pipeline = pipeline.lock();
            let report = pipeline.load_all_models(&path)?;
            Ok::<_, XiphosError>((report, pipeline.get_model_services()))
        })
        .await
        .map_err(|e| task_failed("import", e))??;

        let version = self.publish(services);
        log::info!(
            "Imported {} model(s) as bundle v{version}",
            report.succeeded.len()
        );
        Ok(report)
    }
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("store", &self.store.name())
            .field("bundle_version", &self.bundle_version())
            .field("user_contexts", &self.user_contexts.len())
            .finish()
    }
}

fn task_failed(what: &str, e: JoinError) -> XiphosError {
    XiphosError::internal(format!("{what} task failed: {e}"))
}

/// Offset and limit actually served. Negative offsets become 0,
/// non-positive limits the default page size, oversized limits the
/// maximum.
pub fn clamp_page(pagination: Option<Pagination>, default_limit: usize, max_limit: usize) -> (usize, usize) {
    let Some(Pagination { offset, limit }) = pagination else {
        return (0, default_limit.min(max_limit));
    };
    let offset = offset.max(0) as usize;
    let limit = if limit <= 0 {
        default_limit
    } else {
        (limit as usize).min(max_limit)
    };
    (offset, limit.min(max_limit))
}

/// Compare the first and second half of the window per metric.
pub fn compute_trends(window: &[SearchMetric], tolerance: f64) -> Vec<Trend> {
    if window.len() < 2 {
        return Vec::new();
    }
    let (first, second) = window.split_at(window.len() / 2);
    let mean = |metrics: &[SearchMetric], value: fn(&SearchMetric) -> f64| {
        metrics.iter().map(value).sum::<f64>() / metrics.len() as f64
    };

    let signals: [(&str, fn(&SearchMetric) -> f64); 3] = [
        ("average_response_time", |m| m.average_response_time),
        ("error_rate", |m| m.error_rate),
        ("click_through_rate", |m| m.click_through_rate),
    ];
    signals
        .into_iter()
        .map(|(metric, value)| {
            let previous = mean(first, value);
            let current = mean(second, value);
            let change = if previous.abs() > f64::EPSILON {
                (current - previous) / previous
            } else {
                0.0
            };
            let direction = if previous.abs() <= f64::EPSILON {
                if current > f64::EPSILON {
                    TrendDirection::Up
                } else {
                    TrendDirection::Stable
                }
            } else if change.abs() <= tolerance {
                TrendDirection::Stable
            } else if change > 0.0 {
                TrendDirection::Up
            } else {
                TrendDirection::Down
            };
            Trend {
                metric: metric.to_string(),
                previous,
                current,
                change,
                direction,
            }
        })
        .collect()
}
