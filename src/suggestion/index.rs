//! Prefix trie plus frequency table over normalized queries.
//!
//! Every trie node caches the ranks of the heaviest completions below it,
//! so a prefix lookup costs the prefix length plus the number of results.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of completions cached per trie node.
pub const DEFAULT_NODE_CAPACITY: usize = 32;

/// Accumulated weight of one indexed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    /// Normalized query text.
    pub query: String,
    /// Decayed, weighted frequency.
    pub weight: f64,
    /// Raw number of observations.
    pub count: u64,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    children: BTreeMap<char, TrieNode>,
    terminal: bool,
    /// Ranks into `SuggestionIndex::ranked`, ascending.
    best: Vec<u32>,
}

/// Prefix index over normalized queries.
#[derive(Debug, Clone)]
pub struct SuggestionIndex {
    root: TrieNode,
    stats: HashMap<String, QueryStats>,
    /// Every query, heaviest first.
    ranked: Vec<String>,
    node_capacity: usize,
}

impl Default for SuggestionIndex {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_NODE_CAPACITY)
    }
}

impl SuggestionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty index caching `node_capacity` completions per prefix.
    pub fn with_capacity(node_capacity: usize) -> Self {
        SuggestionIndex {
            root: TrieNode::default(),
            stats: HashMap::new(),
            ranked: Vec::new(),
            node_capacity: node_capacity.max(1),
        }
    }

    /// Rebuild an index from stats entries.
    pub fn from_entries(entries: Vec<QueryStats>, node_capacity: usize) -> Self {
        let mut index = SuggestionIndex::with_capacity(node_capacity);
        for entry in entries {
            index.insert_path(&entry.query);
            index.stats.insert(entry.query.clone(), entry);
        }
        index.rebuild_rankings();
        index
    }

    /// Add `weight` to a normalized query, creating it if needed.
    pub fn insert(&mut self, query: &str, weight: f64, seen_at: Option<DateTime<Utc>>) {
        if query.is_empty() || weight <= 0.0 || !weight.is_finite() {
            return;
        }
        if !self.stats.contains_key(query) {
            self.insert_path(query);
        }
        let stats = self
            .stats
            .entry(query.to_string())
            .or_insert_with(|| QueryStats {
                query: query.to_string(),
                weight: 0.0,
                count: 0,
                last_seen: None,
            });
        stats.weight += weight;
        stats.count += 1;
        if let Some(ts) = seen_at {
            stats.last_seen = Some(stats.last_seen.map_or(ts, |prev| prev.max(ts)));
        }
    }

    fn insert_path(&mut self, query: &str) {
        let mut node = &mut self.root;
        for c in query.chars() {
            node = node.children.entry(c).or_default();
        }
        node.terminal = true;
    }

    /// Recompute the global ranking and the per-node caches. Call after a
    /// batch of inserts; lookups before that see the previous ranking.
    pub fn rebuild_rankings(&mut self) {
        let mut all: Vec<&QueryStats> = self.stats.values().collect();
        all.sort_by(|a, b| by_weight(a, b));
        self.ranked = all.into_iter().map(|s| s.query.clone()).collect();

        let rank_of: HashMap<&str, u32> = self
            .ranked
            .iter()
            .enumerate()
            .map(|(rank, query)| (query.as_str(), rank as u32))
            .collect();
        let mut path = String::new();
        fill_best(&mut self.root, &mut path, &rank_of, self.node_capacity);
    }

    pub fn get(&self, query: &str) -> Option<&QueryStats> {
        self.stats.get(query)
    }

    pub fn node_capacity(&self) -> usize {
        self.node_capacity
    }

    /// The `limit` heaviest queries starting with `prefix`, sorted by
    /// weight descending.
    pub fn prefix_matches(&self, prefix: &str, limit: usize) -> Vec<&QueryStats> {
        let mut node = &self.root;
        for c in prefix.chars() {
            match node.children.get(&c) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }

        // A short cache means the whole subtree fits in it.
        if limit <= node.best.len() || node.best.len() < self.node_capacity {
            return node
                .best
                .iter()
                .take(limit)
                .filter_map(|&rank| self.ranked.get(rank as usize))
                .filter_map(|query| self.stats.get(query))
                .collect();
        }

        let mut found = Vec::new();
        let mut path = prefix.to_string();
        self.collect(node, &mut path, &mut found);
        found.sort_by(|a, b| by_weight(a, b));
        found.truncate(limit);
        found
    }

    fn collect<'a>(&'a self, node: &TrieNode, path: &mut String, found: &mut Vec<&'a QueryStats>) {
        if node.terminal
            && let Some(stats) = self.stats.get(path.as_str())
        {
            found.push(stats);
        }
        for (c, child) in &node.children {
            path.push(*c);
            self.collect(child, path, found);
            path.pop();
        }
    }

    /// The `n` heaviest queries.
    pub fn most_frequent(&self, n: usize) -> Vec<&QueryStats> {
        self.ranked
            .iter()
            .take(n)
            .filter_map(|q| self.stats.get(q))
            .collect()
    }

    /// Largest weight of any query.
    pub fn max_weight(&self) -> f64 {
        self.ranked
            .first()
            .and_then(|q| self.stats.get(q))
            .map_or(0.0, |s| s.weight)
    }

    /// All entries, sorted by query for a stable snapshot.
    pub fn entries(&self) -> Vec<QueryStats> {
        let mut entries: Vec<QueryStats> = self.stats.values().cloned().collect();
        entries.sort_by(|a, b| a.query.cmp(&b.query));
        entries
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Rough memory footprint in bytes.
    pub fn size_hint(&self) -> usize {
        self.stats
            .keys()
            .map(|q| q.len() * 3 + std::mem::size_of::<QueryStats>() + 48)
            .sum::<usize>()
            + cached_ranks(&self.root) * std::mem::size_of::<u32>()
    }
}

/// Post-order pass storing the `capacity` best ranks under each node.
fn fill_best(node: &mut TrieNode, path: &mut String, rank_of: &HashMap<&str, u32>, capacity: usize) {
    let mut best = Vec::new();
    if node.terminal
        && let Some(&rank) = rank_of.get(path.as_str())
    {
        best.push(rank);
    }
    for (c, child) in node.children.iter_mut() {
        path.push(*c);
        fill_best(child, path, rank_of, capacity);
        path.pop();
        best.extend_from_slice(&child.best);
    }
    best.sort_unstable();
    best.truncate(capacity);
    node.best = best;
}

fn cached_ranks(node: &TrieNode) -> usize {
    node.best.len() + node.children.values().map(cached_ranks).sum::<usize>()
}

fn by_weight(a: &QueryStats, b: &QueryStats) -> Ordering {
    b.weight
        .partial_cmp(&a.weight)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.query.cmp(&b.query))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> SuggestionIndex {
        let mut index = SuggestionIndex::new();
        index.insert("reset password", 3.0, None);
        index.insert("reset password", 1.0, None);
        index.insert("reset pin", 1.0, None);
        index.insert("report outage", 2.0, None);
        index.insert("db2 deadlock", 5.0, None);
        index.rebuild_rankings();
        index
    }

    #[test]
    fn test_prefix_matches_sorted_by_weight() {
        let index = sample_index();
        let matches = index.prefix_matches("re", 100);
        let queries: Vec<_> = matches.iter().map(|s| s.query.as_str()).collect();
        assert_eq!(queries, vec!["reset password", "report outage", "reset pin"]);
        assert_eq!(matches[0].count, 2);
        assert!((matches[0].weight - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_prefix_without_match() {
        let index = sample_index();
        assert!(index.prefix_matches("zzz", 100).is_empty());
        assert_eq!(index.prefix_matches("reset pin", 100).len(), 1);
    }

    #[test]
    fn test_limit() {
        let index = sample_index();
        let matches = index.prefix_matches("re", 1);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].query, "reset password");
    }

    #[test]
    fn test_heaviest_completion_beyond_node_capacity() {
        let mut index = SuggestionIndex::with_capacity(4);
        for i in 0..50 {
            index.insert(&format!("a{i:03}"), 1.0, None);
        }
        index.insert("azzz heavy", 9.0, None);
        index.insert("a049", 2.0, None);
        index.rebuild_rankings();

        let top: Vec<_> = index
            .prefix_matches("a", 2)
            .iter()
            .map(|s| s.query.as_str())
            .collect();
        assert_eq!(top, vec!["azzz heavy", "a049"]);
        assert_eq!(index.prefix_matches("az", 1)[0].query, "azzz heavy");
    }

    #[test]
    fn test_cached_and_full_walk_agree() {
        let mut index = SuggestionIndex::with_capacity(3);
        for i in 0..40 {
            index.insert(&format!("db{i:02}"), 1.0 + (i % 7) as f64, None);
        }
        index.rebuild_rankings();

        let mut expected = index.entries();
        expected.sort_by(by_weight);
        for limit in [1, 3, 10, 40, 100] {
            let got: Vec<_> = index
                .prefix_matches("db", limit)
                .into_iter()
                .cloned()
                .collect();
            let want: Vec<_> = expected.iter().take(limit).cloned().collect();
            assert_eq!(got, want, "limit {limit}");
        }
    }

    #[test]
    fn test_most_frequent_and_max_weight() {
        let index = sample_index();
        let top = index.most_frequent(2);
        assert_eq!(top[0].query, "db2 deadlock");
        assert_eq!(top[1].query, "reset password");
        assert!((index.max_weight() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_rebuild_from_entries() {
        let index = sample_index();
        let rebuilt = SuggestionIndex::from_entries(index.entries(), index.node_capacity());
        assert_eq!(rebuilt.len(), index.len());
        assert_eq!(
            rebuilt.prefix_matches("re", 100),
            index.prefix_matches("re", 100)
        );
    }

    #[test]
    fn test_ignores_empty_and_non_positive() {
        let mut index = SuggestionIndex::new();
        index.insert("", 1.0, None);
        index.insert("x", 0.0, None);
        index.insert("y", f64::NAN, None);
        assert!(index.is_empty());
    }
}
