//! # Xiphos
//!
//! Trainable query suggestions, semantic query understanding and search
//! insights layered over an existing text search backend.
//!
//! ## Features
//!
//! - Prefix-based query suggestions learned from search logs and per-user history
//! - Query enhancement: intent, entities, synonyms, concept expansion and embeddings
//! - Personalized re-ranking, metric anomaly detection and latency insights
//! - A multi-model training pipeline with deadlines, tuning and cross-validation
//! - Hot-swappable model bundles persisted to disk
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use xiphos::prelude::*;
//!
//! # async fn run() -> xiphos::error::Result<()> {
//! let service = SearchService::new(ServiceConfig::default())
//!     .with_result_store(Arc::new(InMemoryResultStore::from_file("kb.json")?));
//!
//! let data = TrainingData::from_file("training.json")?;
//! service.initialize(&data).await?;
//!
//! let response = service.search(SearchRequest::new("db2 deadlock")).await?;
//! for result in &response.results {
//!     println!("{} ({:.3})", result.title, result.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod cli;
pub mod data;
pub mod error;
pub mod ml;
pub mod pipeline;
pub mod semantic;
pub mod service;
pub mod storage;
pub mod suggestion;

pub mod prelude {
    pub use crate::data::{InteractionAction, Label, TrainingData, TrainingMetadata};
    pub use crate::error::{Result, XiphosError};
    pub use crate::ml::model::Model;
    pub use crate::ml::{Evaluation, MLConfig, ModelKind, TrainableModel};
    pub use crate::pipeline::{PipelineConfig, PipelineMetrics, TrainingPipeline};
    pub use crate::semantic::{QueryEnhancement, SemanticEnhancer};
    pub use crate::service::{
        InMemoryResultStore, KnowledgeEntry, SearchRequest, SearchResponse, SearchService,
        ServiceConfig,
    };
    pub use crate::storage::{FileModelStore, MemoryModelStore, ModelStore};
    pub use crate::suggestion::{QuerySuggestionEngine, SuggestionEntry, UserContextStore};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
