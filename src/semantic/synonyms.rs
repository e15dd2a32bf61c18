//! Synonym groups used for query expansion.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XiphosError};

/// Built-in groups for common support and operations vocabulary.
const SEED_GROUPS: &[&[&str]] = &[
    &["error", "issue", "problem", "failure", "fault"],
    &["fix", "resolve", "solve", "repair"],
    &["crash", "abend", "abort"],
    &["slow", "latency", "lag"],
    &["login", "signin", "logon"],
    &["password", "passcode", "credentials"],
    &["delete", "remove"],
    &["install", "setup"],
    &["db", "database"],
    &["doc", "docs", "documentation", "manual"],
    &["job", "batch"],
];

/// Synonym dictionary for term expansion.
///
/// Adding a group links every member to every other member; groups that
/// share a term are merged for that term.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynonymDictionary {
    synonyms: HashMap<String, BTreeSet<String>>,
}

impl SynonymDictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dictionary holding the built-in groups.
    pub fn with_seed_groups() -> Self {
        let mut dict = Self::new();
        for group in SEED_GROUPS {
            dict.add_synonym_group(group.iter().map(|t| t.to_string()).collect());
        }
        dict
    }

    /// Load synonym groups from a JSON file.
    ///
    /// Example format:
    /// ```json
    /// [
    ///   ["ml", "machine learning", "machine-learning"],
    ///   ["ai", "artificial intelligence"]
    /// ]
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            XiphosError::persistence(format!(
                "Failed to read synonym dictionary file '{}': {e}",
                path.display()
            ))
        })?;

        let synonym_groups: Vec<Vec<String>> = serde_json::from_str(&content)?;

        let mut dict = Self::new();
        for group in synonym_groups {
            dict.add_synonym_group(group);
        }
        Ok(dict)
    }

    pub fn add_synonym_group(&mut self, terms: Vec<String>) {
        let terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.len() < 2 {
            return;
        }
        for term in &terms {
            let entry = self.synonyms.entry(term.clone()).or_default();
            for other in &terms {
                if other != term {
                    entry.insert(other.clone());
                }
            }
        }
    }

    /// Synonyms of a term, sorted.
    pub fn get_synonyms(&self, term: &str) -> Vec<&str> {
        self.synonyms
            .get(term)
            .map(|s| s.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.synonyms.contains_key(term)
    }

    pub fn len(&self) -> usize {
        self.synonyms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synonyms.is_empty()
    }

    pub fn merge(&mut self, other: &SynonymDictionary) {
        for (term, synonyms) in &other.synonyms {
            self.synonyms
                .entry(term.clone())
                .or_default()
                .extend(synonyms.iter().cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_groups_are_symmetric() {
        let mut dict = SynonymDictionary::new();
        dict.add_synonym_group(vec!["ml".into(), "Machine Learning".into()]);
        assert_eq!(dict.get_synonyms("ml"), vec!["machine learning"]);
        assert_eq!(dict.get_synonyms("machine learning"), vec!["ml"]);
        assert!(dict.get_synonyms("ai").is_empty());
    }

    #[test]
    fn test_overlapping_groups_merge() {
        let mut dict = SynonymDictionary::new();
        dict.add_synonym_group(vec!["error".into(), "issue".into()]);
        dict.add_synonym_group(vec!["error".into(), "bug".into()]);
        assert_eq!(dict.get_synonyms("error"), vec!["bug", "issue"]);
    }

    #[test]
    fn test_seed_groups() {
        let dict = SynonymDictionary::with_seed_groups();
        assert!(dict.get_synonyms("abend").contains(&"crash"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[["vsam", "dataset"], ["single"]]"#).unwrap();

        let dict = SynonymDictionary::load_from_file(file.path()).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get_synonyms("dataset"), vec!["vsam"]);
    }
}
