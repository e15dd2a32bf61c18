//! The training pipeline.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;

use crate::data::{OptimizationRecord, TrainingData};
use crate::error::{Result, XiphosError};
use crate::ml::anomaly::{AnomalyCollaborator, MetricAnomalyDetector};
use crate::ml::model::Model;
use crate::ml::optimization::{LatencyOptimizer, OptimizationCollaborator};
use crate::ml::ranking::{PreferenceRanker, RankingCollaborator};
use crate::ml::{Evaluation, MLConfig, ModelKind, TrainableModel};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::dataset;
use crate::pipeline::metrics::{
    ManifestEntry, ModelManifest, PersistenceReport, PipelineMetrics, ResourceUsage,
    TrainingResult,
};
use crate::pipeline::services::ModelServices;
use crate::semantic::SemanticEnhancer;
use crate::storage::{FileModelStore, ModelStore};
use crate::suggestion::{QuerySuggestionEngine, UserContextConfig, UserContextStore};

/// Name of the manifest written next to the model bundles.
pub const MANIFEST_NAME: &str = "manifest.json";

/// A model scheduled for training.
struct Job {
    slot: usize,
    id: String,
    kind: ModelKind,
    data: TrainingData,
}

/// A job whose worker is running.
struct InFlight {
    id: String,
    kind: ModelKind,
    samples: usize,
    started: Instant,
    deadline: Instant,
}

/// Hyperparameter tuning settings handed to a worker.
#[derive(Clone, Copy)]
struct TuningPlan {
    enabled: bool,
    validation_split: f64,
    patience: usize,
    seed: u64,
}

struct TrainedModel {
    model: Model,
    evaluation: Evaluation,
    candidates: usize,
}

/// Sent by a worker when it finishes.
struct WorkerReport {
    slot: usize,
    outcome: Result<TrainedModel>,
    elapsed: Duration,
}

/// A settled job.
struct Completed {
    slot: usize,
    kind: ModelKind,
    result: TrainingResult,
    model: Option<Model>,
}

/// Trains, evaluates and persists every model kind.
///
/// The pipeline always holds one model per kind. A successful training run
/// replaces that kind's model; failed and timed-out runs leave the previous
/// model in place.
pub struct TrainingPipeline {
    config: PipelineConfig,
    models: BTreeMap<ModelKind, Model>,
    /// Latest successful result per kind.
    results: BTreeMap<ModelKind, TrainingResult>,
    optimization_history: Vec<OptimizationRecord>,
    user_contexts: Arc<UserContextStore>,
    disk_space: u64,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let user_contexts = Arc::new(UserContextStore::new(
            UserContextConfig::with_max_query_chars(config.models.suggestion.max_query_chars),
        ));
        let models = fresh_models(&config.models, &user_contexts);
        TrainingPipeline {
            config,
            models,
            results: BTreeMap::new(),
            optimization_history: Vec::new(),
            user_contexts,
            disk_space: 0,
        }
    }

    /// Share `store` with the suggestion engine across retrains.
    pub fn with_user_contexts(mut self, store: Arc<UserContextStore>) -> Self {
        self.models = std::mem::take(&mut self.models)
            .into_iter()
            .map(|(kind, model)| (kind, model.with_user_contexts(Arc::clone(&store))))
            .collect();
        self.user_contexts = store;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model(&self, kind: ModelKind) -> Option<&Model> {
        self.models.get(&kind)
    }

    pub fn results(&self) -> &BTreeMap<ModelKind, TrainingResult> {
        &self.results
    }

    pub fn user_contexts(&self) -> &Arc<UserContextStore> {
        &self.user_contexts
    }

    /// Train every target model and aggregate the outcome.
    ///
    /// Never fails: per-model errors, unknown ids and timeouts are recorded
    /// in the returned metrics.
    pub fn run_full_pipeline(&mut self, data: &TrainingData) -> PipelineMetrics {
        let started = Instant::now();
        let data = data.normalized();
        let targets = self.config.resolve_targets();
        log::info!(
            "Training {} model(s) on {} samples with parallelism {}",
            targets.len(),
            data.len(),
            self.config.parallelism()
        );

        let mut slots: Vec<Option<TrainingResult>> = vec![None; targets.len()];
        let mut jobs = VecDeque::new();
        for (slot, (id, kind)) in targets.into_iter().enumerate() {
            match kind {
                Some(kind) => jobs.push_back(Job {
                    slot,
                    data: dataset::derive(kind, &data),
                    id,
                    kind,
                }),
                None => {
                    log::warn!("Unknown model '{id}'");
                    slots[slot] = Some(TrainingResult::failed(
                        &id,
                        format!("unknown model '{id}'"),
                        Duration::ZERO,
                    ));
                }
            }
        }

        let mut usage = ResourceUsage {
            disk_space: self.disk_space,
            ..Default::default()
        };
        for completed in self.run_jobs(jobs) {
            usage.cpu_time_ms += completed.result.training_time_ms;
            if let Some(model) = completed.model {
                usage.memory_peak = usage.memory_peak.max(completed.result.model_size);
                if completed.kind == ModelKind::PredictiveOptimization {
                    self.optimization_history = data.metadata.optimization_history.clone();
                }
                self.models.insert(completed.kind, model);
                self.results.insert(completed.kind, completed.result.clone());
            }
            slots[completed.slot] = Some(completed.result);
        }

        let metrics = PipelineMetrics::from_results(
            slots.into_iter().flatten().collect(),
            started.elapsed(),
            usage,
        );
        log::info!(
            "Pipeline finished in {}ms: {}/{} succeeded, average accuracy {:.3}",
            metrics.total_training_time_ms,
            metrics.results.iter().filter(|r| r.is_success()).count(),
            metrics.models_trained,
            metrics.average_accuracy
        );
        metrics
    }

    /// Run jobs on worker threads, at most `parallelism` at a time, each
    /// under the soft deadline.
    fn run_jobs(&self, mut pending: VecDeque<Job>) -> Vec<Completed> {
        let parallelism = self.config.parallelism();
        let budget = self.config.time_budget();
        let (tx, rx) = crossbeam_channel::unbounded::<WorkerReport>();
        let mut in_flight: HashMap<usize, InFlight> = HashMap::new();
        let mut completed = Vec::new();

        loop {
            while in_flight.len() < parallelism {
                let Some(job) = pending.pop_front() else {
                    break;
                };
                let started = Instant::now();
                let flight = InFlight {
                    id: job.id.clone(),
                    kind: job.kind,
                    samples: job.data.len(),
                    started,
                    deadline: started + budget,
                };
                let slot = job.slot;
                match self.spawn_worker(job, flight.deadline, tx.clone()) {
                    Ok(()) => {
                        in_flight.insert(slot, flight);
                    }
                    Err(e) => {
                        log::warn!("Failed to start training worker for {}: {e}", flight.id);
                        completed.push(Completed {
                            slot,
                            kind: flight.kind,
                            result: TrainingResult::failed(&flight.id, e.to_string(), Duration::ZERO),
                            model: None,
                        });
                    }
                }
            }

            let Some(next_deadline) = in_flight.values().map(|f| f.deadline).min() else {
                break;
            };
            match rx.recv_deadline(next_deadline) {
                Ok(report) => {
                    // Reports from abandoned workers are dropped.
                    if let Some(flight) = in_flight.remove(&report.slot) {
                        completed.push(settle(report, flight, budget));
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    let expired: Vec<usize> = in_flight
                        .iter()
                        .filter(|(_, f)| f.deadline <= now)
                        .map(|(slot, _)| *slot)
                        .collect();
                    for slot in expired {
                        if let Some(flight) = in_flight.remove(&slot) {
                            log::warn!(
                                "Model {} exceeded its {}ms budget; abandoning its worker",
                                flight.id,
                                budget.as_millis()
                            );
                            completed.push(Completed {
                                slot,
                                kind: flight.kind,
                                result: TrainingResult::timeout(
                                    &flight.id,
                                    budget,
                                    now.duration_since(flight.started),
                                ),
                                model: None,
                            });
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    for (slot, flight) in in_flight.drain() {
                        completed.push(Completed {
                            slot,
                            kind: flight.kind,
                            result: TrainingResult::failed(
                                &flight.id,
                                "training worker exited without reporting",
                                flight.started.elapsed(),
                            ),
                            model: None,
                        });
                    }
                    break;
                }
            }
        }
        completed
    }

    fn spawn_worker(&self, job: Job, deadline: Instant, tx: Sender<WorkerReport>) -> Result<()> {
        let config = self.config.models.clone();
        let contexts = Arc::clone(&self.user_contexts);
        let plan = TuningPlan {
            enabled: self.config.hyperparameter_tuning,
            validation_split: self.config.validation_split,
            patience: self.config.early_stopping_patience,
            seed: self.config.seed,
        };

        thread::Builder::new()
            .name(format!("xiphos-train-{}", job.kind))
            .spawn(move || {
                let started = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    train_job(job.kind, &job.data, &config, plan, deadline, contexts)
                }))
                .unwrap_or_else(|_| {
                    Err(XiphosError::model_training(format!(
                        "{} panicked during training",
                        job.kind
                    )))
                });
                // The receiver is gone once the pipeline has moved on.
                let _ = tx.send(WorkerReport {
                    slot: job.slot,
                    outcome,
                    elapsed: started.elapsed(),
                });
            })?;
        Ok(())
    }

    /// K-fold cross-validation of every target model.
    ///
    /// Folds come from a seeded shuffle split round-robin. With fewer
    /// samples than folds the fold count drops to the sample count; a
    /// single sample is trained and evaluated on itself; an empty
    /// sub-dataset yields no evaluations.
    pub fn cross_validate(&self, data: &TrainingData, k: usize) -> BTreeMap<String, Vec<Evaluation>> {
        let data = data.normalized();
        let mut evaluations = BTreeMap::new();
        for (id, kind) in self.config.resolve_targets() {
            let Some(kind) = kind else {
                log::warn!("Skipping unknown model '{id}' in cross-validation");
                continue;
            };
            let sub = dataset::derive(kind, &data);
            let folds = cross_validate_model(kind, &self.config.models, &sub, k, self.config.seed);
            log::debug!("{id}: {} fold(s) over {} samples", folds.len(), sub.len());
            evaluations.insert(id, folds);
        }
        evaluations
    }

    /// Save every trained model and the manifest into `path`.
    pub fn save_all_models<P: AsRef<Path>>(&mut self, path: P) -> Result<PersistenceReport> {
        let store = FileModelStore::new(path)?;
        self.save_all_models_to_store(&store)
    }

    /// Save every trained model into `store`. A model that fails to save is
    /// reported and does not stop the others; failing to write the manifest
    /// is an error.
    pub fn save_all_models_to_store(&mut self, store: &dyn ModelStore) -> Result<PersistenceReport> {
        let mut report = PersistenceReport::default();
        let mut entries = Vec::new();

        for (kind, model) in &self.models {
            if !model.is_trained() {
                continue;
            }
            match model.save(store) {
                Ok(size) => {
                    let result = self.results.get(kind);
                    entries.push(ManifestEntry {
                        model_id: kind.as_str().to_string(),
                        file: kind.bundle_name(),
                        size_bytes: size,
                        evaluation: result.map(|r| r.evaluation.clone()).unwrap_or_default(),
                        trained_at: result.map(|r| r.trained_at),
                        samples: result.map(|r| r.samples).unwrap_or(0),
                    });
                    report.succeeded.push(kind.as_str().to_string());
                    report.bytes += size;
                }
                Err(e) => {
                    log::warn!("Failed to save model {kind}: {e}");
                    report.failed.push((kind.as_str().to_string(), e.to_string()));
                }
            }
        }

        let manifest = ModelManifest::new(entries, self.optimization_history.clone());
        let bytes = serde_json::to_vec_pretty(&manifest)?;
        store.put(MANIFEST_NAME, &bytes)?;
        report.bytes += bytes.len() as u64;
        self.disk_space = report.bytes;

        log::info!(
            "Saved {} model(s) ({} bytes), {} failed",
            report.succeeded.len(),
            report.bytes,
            report.failed.len()
        );
        Ok(report)
    }

    /// Load models from a directory written by [`Self::save_all_models`].
    pub fn load_all_models<P: AsRef<Path>>(&mut self, path: P) -> Result<PersistenceReport> {
        let store = FileModelStore::open(path)?;
        self.load_all_models_from_store(&store)
    }

    /// Load models from `store`. Without a readable manifest every known
    /// bundle name is probed. Models that fail to load keep their current
    /// state; finding no bundle at all is an error.
    pub fn load_all_models_from_store(&mut self, store: &dyn ModelStore) -> Result<PersistenceReport> {
        let manifest: Option<ModelManifest> = match store.get(MANIFEST_NAME) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    log::warn!("Ignoring unreadable manifest: {e}");
                    None
                }
            },
            Err(e) => {
                log::warn!("No manifest ({e}); probing model bundles");
                None
            }
        };

        let entries: Vec<(ModelKind, Option<ManifestEntry>)> = match &manifest {
            Some(manifest) => manifest
                .models
                .iter()
                .filter_map(|entry| match entry.model_id.parse::<ModelKind>() {
                    Ok(kind) => Some((kind, Some(entry.clone()))),
                    Err(e) => {
                        log::warn!("Skipping manifest entry: {e}");
                        None
                    }
                })
                .collect(),
            None => ModelKind::ALL
                .into_iter()
                .filter(|kind| store.exists(&kind.bundle_name()))
                .map(|kind| (kind, None))
                .collect(),
        };
        if entries.is_empty() {
            return Err(XiphosError::persistence("no model bundles found"));
        }

        let mut report = PersistenceReport::default();
        for (kind, entry) in entries {
            let mut model =
                Model::new(kind, &self.config.models).with_user_contexts(Arc::clone(&self.user_contexts));
            match model.load(store) {
                Ok(()) => {
                    let (evaluation, samples, trained_at, size) = match entry {
                        Some(e) => (e.evaluation, e.samples, e.trained_at, e.size_bytes),
                        None => (Evaluation::default(), 0, None, 0),
                    };
                    let result = TrainingResult {
                        trained_at: trained_at.unwrap_or_else(chrono::Utc::now),
                        model_size: model.size_hint(),
                        ..TrainingResult::success(kind.as_str(), evaluation, samples, Duration::ZERO)
                    };
                    self.models.insert(kind, model);
                    self.results.insert(kind, result);
                    report.succeeded.push(kind.as_str().to_string());
                    report.bytes += size;
                }
                Err(e) => {
                    log::warn!("Failed to load model {kind}: {e}");
                    report.failed.push((kind.as_str().to_string(), e.to_string()));
                }
            }
        }
        if let Some(manifest) = manifest {
            self.optimization_history = manifest.optimization_history;
        }
        self.disk_space = report.bytes;

        log::info!(
            "Loaded {} model(s), {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Clones of the current models for serving.
    pub fn get_model_services(&self) -> ModelServices {
        let config = &self.config.models;
        let suggestion = match self.models.get(&ModelKind::QuerySuggestion) {
            Some(Model::QuerySuggestion(engine)) => engine.clone(),
            _ => QuerySuggestionEngine::new(config.suggestion.clone())
                .with_user_contexts(Arc::clone(&self.user_contexts)),
        };
        let semantic = match self.models.get(&ModelKind::SemanticSearch) {
            Some(Model::SemanticSearch(enhancer)) => enhancer.clone(),
            _ => SemanticEnhancer::new(config.semantic.clone()),
        };
        let ranking: Arc<dyn RankingCollaborator> = match self.models.get(&ModelKind::PersonalizedRanking) {
            Some(Model::PersonalizedRanking(ranker)) => Arc::new(ranker.clone()),
            _ => Arc::new(PreferenceRanker::new(config.ranking.clone())),
        };
        let anomaly: Arc<dyn AnomalyCollaborator> = match self.models.get(&ModelKind::AnomalyDetection) {
            Some(Model::AnomalyDetection(detector)) => Arc::new(detector.clone()),
            _ => Arc::new(MetricAnomalyDetector::new(config.anomaly_detection.clone())),
        };
        let optimization: Arc<dyn OptimizationCollaborator> =
            match self.models.get(&ModelKind::PredictiveOptimization) {
                Some(Model::PredictiveOptimization(optimizer)) => Arc::new(optimizer.clone()),
                _ => Arc::new(LatencyOptimizer::new(config.optimization.clone())),
            };

        ModelServices {
            suggestion,
            semantic,
            ranking,
            anomaly,
            optimization,
            optimization_history: self.optimization_history.clone(),
            results: self.results.clone(),
        }
    }
}

fn fresh_models(config: &MLConfig, contexts: &Arc<UserContextStore>) -> BTreeMap<ModelKind, Model> {
    ModelKind::ALL
        .into_iter()
        .map(|kind| (kind, Model::new(kind, config).with_user_contexts(Arc::clone(contexts))))
        .collect()
}

/// Turn a worker report into a training result.
fn settle(report: WorkerReport, flight: InFlight, budget: Duration) -> Completed {
    let (result, model) = match report.outcome {
        Ok(_) if report.elapsed >= budget => {
            log::warn!(
                "Model {} finished in {}ms, over its {}ms budget; discarding",
                flight.id,
                report.elapsed.as_millis(),
                budget.as_millis()
            );
            (TrainingResult::timeout(&flight.id, budget, report.elapsed), None)
        }
        Ok(trained) => {
            log::debug!(
                "Model {} trained in {}ms, accuracy {:.3}",
                flight.id,
                report.elapsed.as_millis(),
                trained.evaluation.accuracy
            );
            let result = TrainingResult {
                candidates_evaluated: trained.candidates,
                model_size: trained.model.size_hint(),
                ..TrainingResult::success(&flight.id, trained.evaluation, flight.samples, report.elapsed)
            };
            (result, Some(trained.model))
        }
        Err(e) => {
            log::warn!("Model {} failed to train: {e}", flight.id);
            (TrainingResult::failed(&flight.id, e.to_string(), report.elapsed), None)
        }
    };
    Completed {
        slot: report.slot,
        kind: flight.kind,
        result,
        model,
    }
}

/// Train one model, tuning it first when enabled.
fn train_job(
    kind: ModelKind,
    data: &TrainingData,
    config: &MLConfig,
    plan: TuningPlan,
    deadline: Instant,
    contexts: Arc<UserContextStore>,
) -> Result<TrainedModel> {
    if !plan.enabled || data.len() < 2 {
        let mut model = Model::new(kind, config).with_user_contexts(contexts);
        let evaluation = model.train(data)?;
        return Ok(TrainedModel {
            model,
            evaluation,
            candidates: 0,
        });
    }

    let (train_indices, validation_indices) = split_indices(data.len(), plan.validation_split, plan.seed);
    let train = data.subset(&train_indices);
    let validation = data.subset(&validation_indices);
    let patience = plan.patience.max(1);

    let mut best: Option<(Model, f64)> = None;
    let mut stale = 0;
    let mut tried = 0;
    for mut candidate in Model::candidates(kind, config) {
        if tried > 0 && Instant::now() >= deadline {
            log::debug!("{kind}: tuning stopped at the deadline after {tried} candidate(s)");
            break;
        }
        tried += 1;
        let score = match candidate.train(&train) {
            Ok(_) => candidate.evaluate(&validation).accuracy,
            Err(e) => {
                log::warn!("{kind}: tuning candidate {tried} failed: {e}");
                f64::NEG_INFINITY
            }
        };
        if score.is_finite() && best.as_ref().is_none_or(|(_, s)| score > *s) {
            best = Some((candidate, score));
            stale = 0;
        } else {
            stale += 1;
            if stale >= patience {
                log::debug!("{kind}: early stopping after {tried} candidate(s)");
                break;
            }
        }
    }

    let mut model = best
        .map(|(model, _)| model)
        .unwrap_or_else(|| Model::new(kind, config))
        .with_user_contexts(contexts);
    let evaluation = model.train(data)?;
    Ok(TrainedModel {
        model,
        evaluation,
        candidates: tried,
    })
}

/// Seeded train/validation split of `0..n`; both sides non-empty for
/// `n >= 2`.
fn split_indices(n: usize, validation_split: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let n_validation = ((n as f64 * validation_split).round() as usize).clamp(1, n.saturating_sub(1).max(1));
    let mut validation = indices[..n_validation].to_vec();
    let mut train = indices[n_validation..].to_vec();
    validation.sort_unstable();
    train.sort_unstable();
    (train, validation)
}

fn cross_validate_model(
    kind: ModelKind,
    config: &MLConfig,
    data: &TrainingData,
    k: usize,
    seed: u64,
) -> Vec<Evaluation> {
    let n = data.len();
    if n == 0 {
        return Vec::new();
    }
    let k = k.min(n);
    if n < 2 || k < 2 {
        return vec![fold_evaluation(kind, config, data, data)];
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));

    (0..k)
        .into_par_iter()
        .map(|fold| {
            let mut train = Vec::with_capacity(n);
            let mut validation = Vec::with_capacity(n / k + 1);
            for (position, &index) in indices.iter().enumerate() {
                if position % k == fold {
                    validation.push(index);
                } else {
                    train.push(index);
                }
            }
            fold_evaluation(kind, config, &data.subset(&train), &data.subset(&validation))
        })
        .collect()
}

fn fold_evaluation(
    kind: ModelKind,
    config: &MLConfig,
    train: &TrainingData,
    validation: &TrainingData,
) -> Evaluation {
    let mut model = Model::new(kind, config);
    match model.train(train) {
        Ok(_) => model.evaluate(validation),
        Err(e) => {
            log::warn!("{kind}: fold training failed: {e}");
            Evaluation::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Label, TrainingMetadata};
    use crate::pipeline::metrics::TrainingStatus;
    use crate::storage::MemoryModelStore;

    fn corpus() -> TrainingData {
        TrainingData::from_queries(
            &[
                "reset password",
                "reset password expired",
                "db2 deadlock",
                "db2 connection error",
                "cics abend asra",
                "vsam file status",
            ],
            &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
        )
    }

    fn only(models: &[&str]) -> PipelineConfig {
        PipelineConfig {
            target_models: models.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_indices() {
        let (train, validation) = split_indices(10, 0.2, 7);
        assert_eq!(validation.len(), 2);
        assert_eq!(train.len(), 8);
        let mut all: Vec<usize> = train.iter().chain(&validation).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
        assert_eq!(split_indices(10, 0.2, 7), (train, validation));

        let (train, validation) = split_indices(2, 0.0, 1);
        assert_eq!((train.len(), validation.len()), (1, 1));
    }

    #[test]
    fn test_single_model_run() {
        let mut pipeline = TrainingPipeline::new(only(&["query_suggestion"]));
        let metrics = pipeline.run_full_pipeline(&corpus());
        assert_eq!(metrics.models_trained, 1);
        assert_eq!(metrics.best_model.as_deref(), Some("query_suggestion"));
        assert_eq!(metrics.success_rate, 1.0);
        assert!(pipeline.model(ModelKind::QuerySuggestion).unwrap().is_trained());
        assert!(!pipeline.model(ModelKind::SemanticSearch).unwrap().is_trained());
    }

    #[test]
    fn test_unknown_model_is_failed() {
        let mut pipeline = TrainingPipeline::new(only(&["query_suggestion", "deep_ranker"]));
        let metrics = pipeline.run_full_pipeline(&corpus());
        assert_eq!(metrics.models_trained, 2);
        assert_eq!(metrics.results[1].model_id, "deep_ranker");
        assert_eq!(metrics.results[1].status, TrainingStatus::Failed);
        assert!((metrics.success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_budget_times_out() {
        let mut pipeline = TrainingPipeline::new(PipelineConfig {
            max_training_time_ms: 0,
            ..Default::default()
        });
        let metrics = pipeline.run_full_pipeline(&corpus());
        assert_eq!(metrics.models_trained, ModelKind::ALL.len());
        assert!(metrics.results.iter().all(|r| r.status == TrainingStatus::Timeout));
        assert_eq!(metrics.best_model, None);
        assert!(pipeline.results().is_empty());
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let mut data = corpus();
        data.labels = vec![
            Label::from("account"),
            Label::from("account"),
            Label::from("database"),
            Label::from("database"),
            Label::from("transaction"),
            Label::from("storage"),
        ];
        let mut sequential = TrainingPipeline::new(PipelineConfig {
            parallel: false,
            ..Default::default()
        });
        let mut parallel = TrainingPipeline::new(PipelineConfig {
            max_parallel_models: Some(3),
            ..Default::default()
        });
        let a = sequential.run_full_pipeline(&data);
        let b = parallel.run_full_pipeline(&data);
        let ids = |m: &PipelineMetrics| m.results.iter().map(|r| r.model_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(a.success_rate, 1.0);
        assert_eq!(b.success_rate, 1.0);
    }

    #[test]
    fn test_tuning_with_early_stopping() {
        let mut pipeline = TrainingPipeline::new(PipelineConfig {
            target_models: vec!["query_suggestion".to_string()],
            hyperparameter_tuning: true,
            early_stopping_patience: 1,
            ..Default::default()
        });
        let metrics = pipeline.run_full_pipeline(&corpus());
        let result = &metrics.results[0];
        assert!(result.is_success());
        assert!(result.candidates_evaluated >= 1);
        assert!(result.candidates_evaluated <= Model::candidates(ModelKind::QuerySuggestion, &MLConfig::default()).len());
    }

    #[test]
    fn test_cross_validation_fold_counts() {
        let pipeline = TrainingPipeline::new(only(&["query_suggestion"]));
        let folds = pipeline.cross_validate(&corpus(), 3);
        assert_eq!(folds["query_suggestion"].len(), 3);

        let two = TrainingData::from_queries(&["a query", "another query"], &[1.0, 1.0]);
        assert_eq!(pipeline.cross_validate(&two, 3)["query_suggestion"].len(), 2);

        let one = TrainingData::from_queries(&["lonely"], &[1.0]);
        assert_eq!(pipeline.cross_validate(&one, 3)["query_suggestion"].len(), 1);

        let empty = TrainingData::default();
        assert!(pipeline.cross_validate(&empty, 3)["query_suggestion"].is_empty());
    }

    #[test]
    fn test_cross_validation_is_deterministic() {
        let pipeline = TrainingPipeline::new(only(&["query_suggestion", "semantic_search"]));
        assert_eq!(
            pipeline.cross_validate(&corpus(), 2),
            pipeline.cross_validate(&corpus(), 2)
        );
    }

    #[test]
    fn test_save_and_load_through_store() {
        let mut data = corpus();
        data.metadata = TrainingMetadata {
            optimization_history: vec![OptimizationRecord {
                timestamp: chrono::Utc::now(),
                parameter: "cache_size".to_string(),
                previous_value: 1.0,
                new_value: 2.0,
                improvement: 0.2,
                latency_ms: Some(80.0),
            }],
            ..Default::default()
        };
        let mut pipeline = TrainingPipeline::new(PipelineConfig::default());
        pipeline.run_full_pipeline(&data);

        let store = MemoryModelStore::new();
        let saved = pipeline.save_all_models_to_store(&store).unwrap();
        assert!(saved.is_complete());
        assert_eq!(saved.succeeded.len(), ModelKind::ALL.len());
        assert!(store.exists(MANIFEST_NAME));

        let mut restored = TrainingPipeline::new(PipelineConfig::default());
        let loaded = restored.load_all_models_from_store(&store).unwrap();
        assert_eq!(loaded.succeeded.len(), ModelKind::ALL.len());
        assert_eq!(restored.get_model_services().optimization_history.len(), 1);

        let original = pipeline.get_model_services();
        let copy = restored.get_model_services();
        assert_eq!(
            copy.suggestion.get_suggestions("re", None, 5),
            original.suggestion.get_suggestions("re", None, 5)
        );
    }

    #[test]
    fn test_load_without_bundles_fails() {
        let mut pipeline = TrainingPipeline::new(PipelineConfig::default());
        let err = pipeline
            .load_all_models_from_store(&MemoryModelStore::new())
            .unwrap_err();
        assert!(matches!(err, XiphosError::Persistence(_)));
    }

    #[test]
    fn test_load_without_manifest_probes_bundles() {
        let mut pipeline = TrainingPipeline::new(only(&["query_suggestion"]));
        pipeline.run_full_pipeline(&corpus());
        let store = MemoryModelStore::new();
        pipeline.save_all_models_to_store(&store).unwrap();
        store.delete(MANIFEST_NAME).unwrap();

        let mut restored = TrainingPipeline::new(PipelineConfig::default());
        let report = restored.load_all_models_from_store(&store).unwrap();
        assert_eq!(report.succeeded, vec!["query_suggestion"]);
    }
}
