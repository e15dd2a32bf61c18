//! Search service configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XiphosError};
use crate::pipeline::PipelineConfig;
use crate::suggestion::UserContextConfig;

/// Configuration for [`SearchService`](crate::service::SearchService).
///
/// Loadable from JSON; every field is optional:
///
/// ```
/// use xiphos::service::ServiceConfig;
///
/// let config: ServiceConfig = serde_json::from_str(
///     r#"{"max_suggestions": 3, "pipeline": {"parallel": false}}"#,
/// ).unwrap();
/// assert_eq!(config.max_suggestions, 3);
/// assert!(!config.pipeline.parallel);
/// assert_eq!(config.max_page_size, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Suggestions returned per search.
    pub max_suggestions: usize,
    /// Base candidates fetched from the result store.
    pub max_candidates: usize,
    /// Page size used when a request has no pagination.
    pub default_page_size: usize,
    /// Largest page a request may ask for.
    pub max_page_size: usize,
    /// Search metrics kept for anomaly detection and trends.
    pub metric_window: usize,
    /// Interactions kept in the usage log.
    pub interaction_log_size: usize,
    /// Accuracy below which a model is reported as `warning`.
    pub health_accuracy_threshold: f64,
    /// Age after which a model is reported as `warning`.
    pub retrain_interval_hours: u64,
    /// Relative change below which a trend is `stable`.
    pub trend_tolerance: f64,
    pub pipeline: PipelineConfig,
    pub user_contexts: UserContextConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            max_suggestions: 5,
            max_candidates: 100,
            default_page_size: 10,
            max_page_size: 100,
            metric_window: 100,
            interaction_log_size: 1000,
            health_accuracy_threshold: 0.5,
            retrain_interval_hours: 24,
            trend_tolerance: 0.05,
            pipeline: PipelineConfig::default(),
            user_contexts: UserContextConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            XiphosError::invalid_config(format!("cannot read '{}': {e}", path.display()))
        })?;
        let config: ServiceConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_page_size == 0 {
            return Err(XiphosError::invalid_config("max_page_size must be positive"));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(XiphosError::invalid_config(format!(
                "default_page_size must be in 1..={}, got {}",
                self.max_page_size, self.default_page_size
            )));
        }
        if self.metric_window < 2 {
            return Err(XiphosError::invalid_config("metric_window must be at least 2"));
        }
        self.pipeline.validate()
    }

    pub fn retrain_interval(&self) -> Duration {
        Duration::from_secs(self.retrain_interval_hours * 3600)
    }
}
