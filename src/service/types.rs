//! Request and response types of the search service.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ml::anomaly::AnomalyEvent;
use crate::ml::optimization::OptimizationInsight;
use crate::semantic::QueryEnhancement;
use crate::suggestion::SuggestionEntry;

/// A single search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    pub score: f64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SearchResult {
    pub fn new(id: impl Into<String>, title: impl Into<String>, score: f64) -> Self {
        SearchResult {
            id: id.into(),
            title: title.into(),
            content: String::new(),
            category: None,
            score,
            metadata: HashMap::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Requested page. Values are clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: i64,
    pub limit: i64,
}

/// Caller-supplied personalization signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Personalization {
    pub user_id: Option<String>,
    pub search_history: Vec<String>,
    /// Ids of results the user clicked before.
    pub click_history: Vec<String>,
    /// Term -> preference weight.
    pub preferences: HashMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub personalization: Option<Personalization>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        SearchRequest {
            query: query.into(),
            user_id: None,
            personalization: None,
            pagination: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_personalization(mut self, personalization: Personalization) -> Self {
        self.personalization = Some(personalization);
        self
    }

    pub fn with_pagination(mut self, offset: i64, limit: i64) -> Self {
        self.pagination = Some(Pagination { offset, limit });
        self
    }

    /// User id from the request, falling back to the personalization block.
    pub fn effective_user_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or_else(|| self.personalization.as_ref()?.user_id.as_deref())
    }
}

/// Semantic view of the query attached to a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticAnalysis {
    pub enhancement: Option<QueryEnhancement>,
    pub complexity: f64,
    pub sentiment: f64,
    pub category: Option<String>,
}

/// The page actually served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub offset: usize,
    pub limit: usize,
    pub total_items: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub suggestions: Vec<SuggestionEntry>,
    pub total_count: usize,
    pub processing_time_ms: f64,
    pub semantic_analysis: SemanticAnalysis,
    pub personalization_applied: bool,
    pub anomalies_detected: Vec<AnomalyEvent>,
    pub optimization_insights: Vec<OptimizationInsight>,
    pub pagination: PageInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelHealth {
    pub status: HealthStatus,
    pub accuracy: f64,
    pub last_trained: Option<DateTime<Utc>>,
    /// Why the model is not healthy.
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

/// First-half vs second-half comparison of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub metric: String,
    pub previous: f64,
    pub current: f64,
    /// Relative change; 0 when the previous value is 0.
    pub change: f64,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInsights {
    pub trends: Vec<Trend>,
    pub anomalies: Vec<AnomalyEvent>,
    pub optimization_opportunities: Vec<OptimizationInsight>,
    pub model_alerts: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_json() {
        let request: SearchRequest = serde_json::from_str(
            r#"{"query":"db2 error","personalization":{"userId":"u1","preferences":{"db2":0.8}},"pagination":{"offset":-3,"limit":500}}"#,
        )
        .unwrap();
        assert_eq!(request.effective_user_id(), Some("u1"));
        assert_eq!(request.pagination.unwrap().offset, -3);

        let bare: SearchRequest = serde_json::from_str(r#"{"query":""}"#).unwrap();
        assert!(bare.personalization.is_none());
        assert_eq!(bare.effective_user_id(), None);
    }

    #[test]
    fn test_explicit_user_wins() {
        let request = SearchRequest::new("q")
            .with_user("explicit")
            .with_personalization(Personalization {
                user_id: Some("nested".to_string()),
                ..Default::default()
            });
        assert_eq!(request.effective_user_id(), Some("explicit"));
    }
}
