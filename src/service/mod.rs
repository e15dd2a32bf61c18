//! The search service and its request/response types.

pub mod config;
pub mod result_store;
pub mod service;
pub mod types;

pub use config::ServiceConfig;
pub use result_store::{InMemoryResultStore, KnowledgeEntry, ResultStore};
pub use service::{ModelBundle, SearchService};
pub use types::{
    HealthStatus, ModelHealth, PageInfo, Pagination, Personalization, SearchRequest,
    SearchResponse, SearchResult, SemanticAnalysis, SystemInsights, Trend, TrendDirection,
};
