//! Fixed-dimension query embeddings via feature hashing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Fixed seeds for the embedding hash. With fixed seeds ahash is repeatable
/// for one build on one target, but its output may change with the target
/// CPU features or the ahash version.
const HASH_SEEDS: (u64, u64, u64, u64) = (0x5851_f42d, 0x4c95_7f2d, 0x1405_7b7e, 0xf767_814f);

/// Input hashed to fingerprint the embedding hash function.
const FINGERPRINT_PROBE: &str = "xiphos-embedding-probe";

fn embedding_hasher() -> ahash::RandomState {
    ahash::RandomState::with_seeds(HASH_SEEDS.0, HASH_SEEDS.1, HASH_SEEDS.2, HASH_SEEDS.3)
}

/// Fingerprint of the hash function this build uses for embeddings.
pub fn hash_fingerprint() -> u64 {
    embedding_hasher().hash_one(FINGERPRINT_PROBE)
}

/// Hashing embedder.
///
/// Every token is hashed into one of `dim` buckets with a hashed sign, and
/// weighted by its IDF when the token was seen during fitting. Character
/// trigrams contribute at half weight so that related spellings land near
/// each other. The result is L2-normalized; empty input yields the zero
/// vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashingEmbedder {
    dim: usize,
    idf: HashMap<String, f64>,
    default_idf: f64,
    /// [`hash_fingerprint`] of the build that created this embedder.
    fingerprint: u64,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        HashingEmbedder {
            dim: dim.max(1),
            idf: HashMap::new(),
            default_idf: 1.0,
            fingerprint: hash_fingerprint(),
        }
    }

    /// Whether this build hashes features the way the creating build did.
    /// Embeddings from mismatched builds are not comparable.
    pub fn hash_matches(&self) -> bool {
        self.fingerprint == hash_fingerprint()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Learn token weights from tokenized documents.
    pub fn fit(&mut self, documents: &[Vec<String>]) {
        let n = documents.len() as f64;
        let mut df: HashMap<&str, usize> = HashMap::new();
        for doc in documents {
            let mut seen: Vec<&str> = doc.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for token in seen {
                *df.entry(token).or_insert(0) += 1;
            }
        }
        self.idf = df
            .into_iter()
            .map(|(t, f)| (t.to_string(), ((n + 1.0) / (f as f64 + 1.0)).ln() + 1.0))
            .collect();
        self.default_idf = ((n + 1.0) / 1.0).ln() + 1.0;
    }

    /// Embed analyzed tokens.
    pub fn embed(&self, tokens: &[String]) -> Vec<f64> {
        let mut vector = vec![0.0; self.dim];
        let hasher = embedding_hasher();

        for token in tokens {
            let weight = self.idf.get(token).copied().unwrap_or(self.default_idf);
            self.add_feature(&mut vector, &hasher, token, weight);

            let chars: Vec<char> = token.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let trigram: String = window.iter().collect();
                    self.add_feature(&mut vector, &hasher, &format!("#{trigram}"), weight * 0.5);
                }
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f64], hasher: &ahash::RandomState, feature: &str, weight: f64) {
        let hash = hasher.hash_one(feature);
        let bucket = (hash % self.dim as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Cosine similarity of two dense vectors.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let magnitude_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        0.0
    } else {
        dot_product / (magnitude_a * magnitude_b)
    }
}
