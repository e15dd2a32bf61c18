//! Base result retrieval.
//!
//! The search service only needs a [`ResultStore`]; the bundled
//! [`InMemoryResultStore`] holds knowledge-base entries and answers
//! substring queries over them.

use std::fmt::Debug;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::service::types::SearchResult;

/// Most candidates a single retrieval returns.
pub const MAX_RETRIEVAL: usize = 100;

/// Source of base search results.
pub trait ResultStore: Send + Sync + Debug {
    /// At most `limit` results for `query`.
    fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;

    fn name(&self) -> &str;
}

/// A knowledge-base entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        KnowledgeEntry {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            category: None,
            solution: String::new(),
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = solution.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Match strength of an already lowercased needle: the title counts
    /// double, description, category and solution once each.
    fn match_score(&self, needle: &str) -> f64 {
        let hit = |field: &str| field.to_lowercase().contains(needle);
        let mut score = 0.0;
        if hit(&self.title) {
            score += 2.0;
        }
        if hit(&self.description) {
            score += 1.0;
        }
        if self.category.as_deref().is_some_and(hit) {
            score += 1.0;
        }
        if hit(&self.solution) {
            score += 1.0;
        }
        score / 5.0
    }

    fn to_result(&self, score: f64) -> SearchResult {
        let mut result = SearchResult::new(&self.id, &self.title, score).with_content(&self.description);
        result.category = self.category.clone();
        if !self.solution.is_empty() {
            result.metadata.insert("solution".to_string(), self.solution.clone());
        }
        if !self.tags.is_empty() {
            result.metadata.insert("tags".to_string(), self.tags.join(","));
        }
        result
            .metadata
            .insert("createdAt".to_string(), self.created_at.to_rfc3339());
        result
    }
}

/// Knowledge-base entries held in memory, newest first.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResultStore {
    entries: Vec<KnowledgeEntry>,
}

impl InMemoryResultStore {
    pub fn new(mut entries: Vec<KnowledgeEntry>) -> Self {
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        InMemoryResultStore { entries }
    }

    /// Load entries from a JSON array.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<KnowledgeEntry> = serde_json::from_str(&content)?;
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }
}

impl ResultStore for InMemoryResultStore {
    /// Case-insensitive substring match over title, description, category
    /// and solution, newest first. An empty query returns the newest
    /// entries.
    fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let limit = limit.min(MAX_RETRIEVAL);
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(self
                .entries
                .iter()
                .take(limit)
                .map(|entry| entry.to_result(0.0))
                .collect());
        }

        Ok(self
            .entries
            .iter()
            .filter_map(|entry| {
                let score = entry.match_score(&needle);
                (score > 0.0).then(|| entry.to_result(score))
            })
            .take(limit)
            .collect())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn store() -> InMemoryResultStore {
        let now = Utc::now();
        InMemoryResultStore::new(vec![
            KnowledgeEntry::new("VSAM status 35", "File not found when opening a dataset")
                .with_id("kb-1")
                .with_category("VSAM")
                .with_created_at(now - Duration::days(3)),
            KnowledgeEntry::new("DB2 SQLCODE -911", "Deadlock or timeout")
                .with_id("kb-2")
                .with_category("DB2")
                .with_solution("Retry the unit of work")
                .with_created_at(now - Duration::days(1)),
            KnowledgeEntry::new("CICS ASRA abend", "Program check in a transaction")
                .with_id("kb-3")
                .with_category("CICS")
                .with_solution("Check the dataset and retry")
                .with_created_at(now),
        ])
    }

    #[test]
    fn test_substring_match_is_case_insensitive() {
        let results = store().retrieve("db2", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "kb-2");
        assert_eq!(results[0].category.as_deref(), Some("DB2"));
        assert!(results[0].score > 0.0);
    }

    #[test]
    fn test_newest_first_across_fields() {
        let ids: Vec<_> = store()
            .retrieve("DATASET", 10)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["kb-3", "kb-1"]);
    }

    #[test]
    fn test_empty_query_returns_newest() {
        let results = store().retrieve("  ", 2).unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["kb-3", "kb-2"]);
    }

    #[test]
    fn test_limit_is_capped() {
        let now = Utc::now();
        let entries = (0..150)
            .map(|i| KnowledgeEntry::new(format!("entry {i}"), "").with_created_at(now))
            .collect();
        let store = InMemoryResultStore::new(entries);
        assert_eq!(store.retrieve("entry", 1000).unwrap().len(), MAX_RETRIEVAL);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(
            &path,
            r#"[{"id": "1", "title": "IMS U0778", "createdAt": "2024-03-01T10:00:00Z"}]"#,
        )
        .unwrap();
        let store = InMemoryResultStore::from_file(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.retrieve("u0778", 5).unwrap()[0].title, "IMS U0778");
    }
}
