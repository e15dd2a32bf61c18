//! Sparse TF-IDF vectorizer over pre-analyzed token lists.
//!
//! Term indices follow sorted token order and vectors iterate by index, so
//! a fitted vectorizer and its restored copy produce bit-identical scores.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Sparse vector: term index to weight.
pub type SparseVector = BTreeMap<usize, f64>;

/// TF-IDF vectorizer for text feature extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    /// Vocabulary: word -> index mapping.
    vocabulary: BTreeMap<String, usize>,
    /// Inverse document frequency for each word.
    idf: Vec<f64>,
    /// Total number of documents seen during training.
    n_documents: usize,
}

impl TfIdfVectorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit the vectorizer on tokenized documents.
    pub fn fit(&mut self, documents: &[Vec<String>]) {
        self.n_documents = documents.len();
        let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
        for doc in documents {
            let unique: BTreeSet<&str> = doc.iter().map(String::as_str).collect();
            for token in unique {
                *document_frequency.entry(token).or_insert(0) += 1;
            }
        }

        let n = self.n_documents as f64;
        self.vocabulary = document_frequency
            .keys()
            .enumerate()
            .map(|(idx, token)| (token.to_string(), idx))
            .collect();
        // IDF = log((N + 1) / (df + 1)) + 1
        self.idf = document_frequency
            .values()
            .map(|&df| ((n + 1.0) / (df as f64 + 1.0)).ln() + 1.0)
            .collect();
    }

    /// Transform tokens into an L2-normalized TF-IDF vector. Unknown terms
    /// are ignored.
    pub fn transform(&self, tokens: &[String]) -> SparseVector {
        let mut vector = SparseVector::new();
        if tokens.is_empty() {
            return vector;
        }
        for token in tokens {
            if let Some(&idx) = self.vocabulary.get(token) {
                *vector.entry(idx).or_insert(0.0) += 1.0;
            }
        }
        let doc_length = tokens.len() as f64;
        for (idx, weight) in vector.iter_mut() {
            *weight = *weight / doc_length * self.idf[*idx];
        }
        normalize(&mut vector);
        vector
    }

    /// IDF of a term, if it is in the vocabulary.
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.vocabulary.get(term).map(|&idx| self.idf[idx])
    }

    /// Get the size of the vocabulary.
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }
}

/// Scale a sparse vector to unit length in place.
pub fn normalize(vector: &mut SparseVector) {
    let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for weight in vector.values_mut() {
            *weight /= norm;
        }
    }
}

/// Dot product of two sparse vectors.
pub fn dot(a: &SparseVector, b: &SparseVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(idx, w)| large.get(idx).map(|v| w * v))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<Vec<String>> {
        texts
            .iter()
            .map(|t| t.split_whitespace().map(String::from).collect())
            .collect()
    }

    #[test]
    fn test_fit_and_transform() {
        let mut vectorizer = TfIdfVectorizer::new();
        vectorizer.fit(&docs(&["reset password", "reset pin", "db2 deadlock"]));
        assert_eq!(vectorizer.vocabulary_size(), 5);
        assert!(vectorizer.idf("password").unwrap() > vectorizer.idf("reset").unwrap());

        let v = vectorizer.transform(&docs(&["reset password"])[0]);
        let norm: f64 = v.values().map(|w| w * w).sum();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_terms_give_empty_vector() {
        let mut vectorizer = TfIdfVectorizer::new();
        vectorizer.fit(&docs(&["alpha beta"]));
        assert!(vectorizer.transform(&docs(&["gamma"])[0]).is_empty());
        assert!(vectorizer.transform(&[]).is_empty());
    }

    #[test]
    fn test_dot_of_identical_unit_vectors() {
        let mut vectorizer = TfIdfVectorizer::new();
        vectorizer.fit(&docs(&["alpha beta", "beta gamma"]));
        let v = vectorizer.transform(&docs(&["alpha beta"])[0]);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_indices_follow_sorted_vocabulary() {
        let mut first = TfIdfVectorizer::new();
        first.fit(&docs(&["zeta alpha", "mid alpha"]));
        let mut second = TfIdfVectorizer::new();
        second.fit(&docs(&["mid alpha", "zeta alpha"]));
        assert_eq!(first, second);

        let v = first.transform(&docs(&["zeta mid"])[0]);
        assert_eq!(v.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_restored_vectorizer_scores_identically() {
        let mut vectorizer = TfIdfVectorizer::new();
        vectorizer.fit(&docs(&[
            "db2 deadlock sqlcode",
            "vsam status open",
            "cics abend asra",
            "db2 timeout lock",
        ]));
        let bytes = bincode::serialize(&vectorizer).unwrap();
        let restored: TfIdfVectorizer = bincode::deserialize(&bytes).unwrap();

        let query = docs(&["db2 lock open abend"]).remove(0);
        let centroid = vectorizer.transform(&docs(&["db2 deadlock lock timeout"])[0]);
        for _ in 0..16 {
            let a = dot(&vectorizer.transform(&query), &centroid);
            let b = dot(&restored.transform(&query), &centroid);
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}
