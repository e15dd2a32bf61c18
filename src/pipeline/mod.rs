//! Multi-model training pipeline.
//!
//! [`TrainingPipeline`] derives one sub-dataset per model kind from a shared
//! [`TrainingData`](crate::data::TrainingData), trains the selected kinds on
//! dedicated worker threads under a per-model soft deadline, optionally tunes
//! hyperparameters with early stopping, cross-validates, and persists every
//! trained model as an opaque bundle next to a JSON manifest.

pub mod config;
pub mod dataset;
pub mod metrics;
pub mod pipeline;
pub mod services;

pub use config::PipelineConfig;
pub use metrics::{
    ManifestEntry, ModelManifest, PersistenceReport, PipelineMetrics, ResourceUsage,
    TrainingResult, TrainingStatus,
};
pub use pipeline::{MANIFEST_NAME, TrainingPipeline};
pub use services::ModelServices;
