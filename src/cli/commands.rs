//! Command implementations for the Xiphos CLI.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::data::TrainingData;
use crate::error::{Result, XiphosError};
use crate::pipeline::{PipelineConfig, TrainingPipeline};
use crate::service::{InMemoryResultStore, SearchRequest, SearchService, ServiceConfig};

/// Execute a CLI command.
pub fn execute_command(args: XiphosArgs) -> Result<()> {
    match &args.command {
        Command::Train(train_args) => train(train_args.clone(), &args),
        Command::CrossValidate(cv_args) => cross_validate(cv_args.clone(), &args),
        Command::Search(search_args) => search(search_args.clone(), &args),
    }
}

fn load_pipeline_config(path: Option<&std::path::Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path),
        None => Ok(PipelineConfig::default()),
    }
}

fn load_training_data(path: &std::path::Path) -> Result<TrainingData> {
    let data = TrainingData::from_file(path).map_err(|e| {
        XiphosError::validation(format!("cannot load '{}': {e}", path.display()))
    })?;
    data.validate()?;
    log::info!("Loaded {} samples from {}", data.len(), path.display());
    Ok(data)
}

/// Train the selected models and save them.
fn train(args: TrainArgs, cli_args: &XiphosArgs) -> Result<()> {
    let mut config = load_pipeline_config(args.config.as_deref())?;
    if !args.models.is_empty() {
        config.target_models = args.models.clone();
    }
    if args.parallel {
        config.parallel = true;
    }
    if args.tune {
        config.hyperparameter_tuning = true;
    }
    config.validate()?;

    let data = load_training_data(&args.data)?;
    let mut pipeline = TrainingPipeline::new(config);
    let metrics = pipeline.run_full_pipeline(&data);
    let persistence = pipeline.save_all_models(&args.output)?;

    if metrics.success_rate < 1.0 {
        log::warn!(
            "{} of {} model(s) did not train",
            metrics.results.iter().filter(|r| !r.is_success()).count(),
            metrics.models_trained
        );
    }

    output_result(
        "Training finished",
        &TrainingSummary {
            output_dir: args.output.to_string_lossy().to_string(),
            metrics,
            persistence,
        },
        cli_args,
    )
}

/// Cross-validate the selected models.
fn cross_validate(args: CrossValidateArgs, cli_args: &XiphosArgs) -> Result<()> {
    let mut config = load_pipeline_config(args.config.as_deref())?;
    if !args.models.is_empty() {
        config.target_models = args.models.clone();
    }
    let folds = args.folds.unwrap_or(config.k_folds);
    if folds == 0 {
        return Err(XiphosError::validation("fold count must be positive"));
    }

    let data = load_training_data(&args.data)?;
    let pipeline = TrainingPipeline::new(config);
    let models: BTreeMap<_, _> = pipeline
        .cross_validate(&data, folds)
        .into_iter()
        .map(|(id, evaluations)| (id, FoldSummary::from_evaluations(&evaluations)))
        .collect();

    output_result(
        "Cross-validation finished",
        &CrossValidationSummary {
            requested_folds: folds,
            models,
        },
        cli_args,
    )
}

/// Load saved models and run one search.
fn search(args: SearchArgs, cli_args: &XiphosArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::default(),
    };
    let store = match &args.entries {
        Some(path) => InMemoryResultStore::from_file(path)?,
        None => InMemoryResultStore::default(),
    };
    log::info!("Searching {} knowledge-base entries", store.len());

    let service = SearchService::new(config).with_result_store(Arc::new(store));
    let mut request =
        SearchRequest::new(args.query.clone()).with_pagination(args.offset, args.limit);
    if let Some(user) = &args.user {
        request = request.with_user(user.clone());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let response = runtime.block_on(async {
        let report = service.import_models(&args.models).await?;
        for (id, error) in &report.failed {
            log::warn!("Could not load {id}: {error}");
        }
        service.search(request).await
    })?;

    output_result(
        "Search finished",
        &SearchSummary {
            query: args.query,
            bundle_version: service.bundle_version(),
            response,
        },
        cli_args,
    )
}
