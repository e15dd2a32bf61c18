//! Entity extraction.
//!
//! Pattern detectors find emails, phone numbers, dates, currency amounts
//! and percentages. A gazetteer learned from annotated queries adds
//! domain entities. Only a bounded prefix of the input is scanned.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analysis::truncate_chars;

/// Longest gazetteer entry, in tokens.
const MAX_GAZETTEER_TOKENS: usize = 4;

/// Confidence of gazetteer matches.
const GAZETTEER_CONFIDENCE: f64 = 0.7;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").expect("valid email regex")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{2,4}\)\s?|\b\d{2,4}[\s.-])\d{3,4}[\s.-]\d{3,4}\b")
        .expect("valid phone regex")
});

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:,\s*\d{4})?)\b",
    )
    .expect("valid date regex")
});

static CURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:[$€£¥]\s?\d+(?:,\d{3})*(?:\.\d+)?|\b\d+(?:,\d{3})*(?:\.\d+)?\s?(?:usd|eur|gbp|jpy|dollars?|euros?)\b)")
        .expect("valid currency regex")
});

static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+(?:\.\d+)?(?:\s?%|\s+percent\b)").expect("valid percentage regex")
});

/// An entity found in a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub entity_type: String,
    pub value: String,
    pub confidence: f64,
}

/// Regex and gazetteer based entity recognizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecognizer {
    /// Lowercased surface form -> entity type.
    gazetteer: HashMap<String, String>,
    max_scan_chars: usize,
}

impl EntityRecognizer {
    pub fn new(max_scan_chars: usize) -> Self {
        EntityRecognizer {
            gazetteer: HashMap::new(),
            max_scan_chars,
        }
    }

    /// Learn a domain entity.
    pub fn add_entity(&mut self, entity_type: &str, value: &str) {
        let value = value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        let tokens = value.split(' ').count();
        if !value.is_empty() && !entity_type.trim().is_empty() && tokens <= MAX_GAZETTEER_TOKENS {
            self.gazetteer.insert(value, entity_type.trim().to_lowercase());
        }
    }

    pub fn gazetteer_len(&self) -> usize {
        self.gazetteer.len()
    }

    /// Extract entities from `text`. `tokens` are the analyzed, lowercased
    /// words of the same text and drive gazetteer lookups.
    pub fn extract(&self, text: &str, tokens: &[String]) -> Vec<ExtractedEntity> {
        let text = truncate_chars(text, self.max_scan_chars);
        let mut entities = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |entity_type: &str, value: &str, confidence: f64| {
            if seen.insert((entity_type.to_string(), value.to_string())) {
                entities.push(ExtractedEntity {
                    entity_type: entity_type.to_string(),
                    value: value.to_string(),
                    confidence,
                });
            }
        };

        let detectors: [(&str, &Regex, f64); 5] = [
            ("email", &EMAIL_RE, 0.95),
            ("date", &DATE_RE, 0.85),
            ("currency", &CURRENCY_RE, 0.90),
            ("percentage", &PERCENT_RE, 0.90),
            ("phone", &PHONE_RE, 0.80),
        ];
        for (entity_type, regex, confidence) in detectors {
            for m in regex.find_iter(text) {
                push(entity_type, m.as_str().trim(), confidence);
            }
        }

        if !self.gazetteer.is_empty() {
            for start in 0..tokens.len() {
                let end_max = (start + MAX_GAZETTEER_TOKENS).min(tokens.len());
                for end in (start + 1)..=end_max {
                    let candidate = tokens[start..end].join(" ");
                    if let Some(entity_type) = self.gazetteer.get(&candidate) {
                        push(entity_type, &candidate, GAZETTEER_CONFIDENCE);
                    }
                }
            }
        }

        entities
    }
}
