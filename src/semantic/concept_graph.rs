//! Weighted concept graph built from term co-occurrence.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::semantic::synonyms::SynonymDictionary;
use crate::semantic::{Expansion, ExpansionType};

/// Category assigned when nothing better is known.
pub const DEFAULT_CATEGORY: &str = "general";

/// A concept and its neighbourhood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptNode {
    pub concept: String,
    pub category: String,
    /// Number of training queries mentioning the concept.
    pub frequency: u64,
    pub synonyms: BTreeSet<String>,
    /// Related concept -> edge weight in (0, 1].
    pub related: BTreeMap<String, f64>,
}

/// One observation fed to [`ConceptGraphBuilder`].
#[derive(Debug, Clone, Default)]
pub struct ConceptObservation {
    /// Concepts occurring together (analyzed tokens or annotated concepts).
    pub concepts: Vec<String>,
    /// Category vote for every concept of the observation.
    pub category: Option<String>,
    /// Whether the category vote is an explicit annotation.
    pub explicit_category: bool,
}

/// Accumulates observations and produces a [`ConceptGraph`].
#[derive(Debug, Default)]
pub struct ConceptGraphBuilder {
    frequency: HashMap<String, u64>,
    cooccurrence: HashMap<(String, String), u64>,
    votes: HashMap<String, HashMap<String, u64>>,
    explicit: HashMap<String, String>,
    synonyms: SynonymDictionary,
}

impl ConceptGraphBuilder {
    pub fn new(synonyms: SynonymDictionary) -> Self {
        ConceptGraphBuilder {
            synonyms,
            ..Default::default()
        }
    }

    pub fn observe(&mut self, observation: ConceptObservation) {
        let mut concepts = observation.concepts;
        concepts.retain(|c| !c.is_empty());
        concepts.sort();
        concepts.dedup();

        for concept in &concepts {
            *self.frequency.entry(concept.clone()).or_insert(0) += 1;
            if let Some(category) = &observation.category {
                if observation.explicit_category {
                    self.explicit.insert(concept.clone(), category.clone());
                } else {
                    *self
                        .votes
                        .entry(concept.clone())
                        .or_default()
                        .entry(category.clone())
                        .or_insert(0) += 1;
                }
            }
        }
        for (i, a) in concepts.iter().enumerate() {
            for b in &concepts[i + 1..] {
                *self
                    .cooccurrence
                    .entry((a.clone(), b.clone()))
                    .or_insert(0) += 1;
            }
        }
    }

    /// Pin a concept's category, overriding votes.
    pub fn assign_category(&mut self, concept: &str, category: &str) {
        if !concept.is_empty() && !category.trim().is_empty() {
            self.explicit
                .insert(concept.to_string(), category.trim().to_lowercase());
        }
    }

    pub fn add_synonym_group(&mut self, group: Vec<String>) {
        self.synonyms.add_synonym_group(group);
    }

    /// Build the graph, keeping at most `max_related` edges per node.
    pub fn build(self, max_related: usize) -> ConceptGraph {
        let mut edges: HashMap<&str, Vec<(&str, f64)>> = HashMap::new();
        for ((a, b), &count) in &self.cooccurrence {
            let fa = self.frequency.get(a).copied().unwrap_or(0);
            let fb = self.frequency.get(b).copied().unwrap_or(0);
            let union = (fa + fb).saturating_sub(count);
            if union == 0 {
                continue;
            }
            let weight = count as f64 / union as f64;
            edges.entry(a.as_str()).or_default().push((b.as_str(), weight));
            edges.entry(b.as_str()).or_default().push((a.as_str(), weight));
        }

        let mut nodes = HashMap::with_capacity(self.frequency.len());
        for (concept, &frequency) in &self.frequency {
            let category = self
                .explicit
                .get(concept)
                .cloned()
                .or_else(|| majority(self.votes.get(concept)))
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

            let mut related = edges.remove(concept.as_str()).unwrap_or_default();
            related.sort_by(|x, y| y.1.total_cmp(&x.1).then_with(|| x.0.cmp(y.0)));
            related.truncate(max_related);

            let synonyms = self
                .synonyms
                .get_synonyms(concept)
                .into_iter()
                .map(String::from)
                .collect();

            nodes.insert(
                concept.clone(),
                ConceptNode {
                    concept: concept.clone(),
                    category,
                    frequency,
                    synonyms,
                    related: related
                        .into_iter()
                        .map(|(c, w)| (c.to_string(), w))
                        .collect(),
                },
            );
        }

        ConceptGraph {
            nodes,
            synonyms: self.synonyms,
        }
    }
}

fn majority(votes: Option<&HashMap<String, u64>>) -> Option<String> {
    votes?
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(category, _)| category.clone())
}

/// Concept graph: concept -> node, plus the synonym dictionary used to
/// build it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptGraph {
    nodes: HashMap<String, ConceptNode>,
    synonyms: SynonymDictionary,
}

impl ConceptGraph {
    /// A graph with no concepts that still knows the built-in synonyms.
    pub fn seeded() -> Self {
        ConceptGraph {
            nodes: HashMap::new(),
            synonyms: SynonymDictionary::with_seed_groups(),
        }
    }

    pub fn get(&self, concept: &str) -> Option<&ConceptNode> {
        self.nodes.get(concept)
    }

    pub fn contains(&self, concept: &str) -> bool {
        self.nodes.contains_key(concept)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Synonyms of a term from the dictionary, whether or not the term was
    /// seen in training.
    pub fn synonyms_of(&self, term: &str) -> Vec<&str> {
        self.synonyms.get_synonyms(term)
    }

    /// Expansion terms for analyzed query tokens.
    ///
    /// Synonyms get `synonym_weight`; related concepts get their edge
    /// weight when it reaches `min_edge_weight`. Terms already in the query
    /// are skipped. Sorted by weight, then term, and capped at `max`.
    pub fn expand(
        &self,
        tokens: &[String],
        max: usize,
        min_edge_weight: f64,
        synonym_weight: f64,
    ) -> Vec<Expansion> {
        let mut best: HashMap<String, Expansion> = HashMap::new();
        let mut offer = |term: &str, expansion_type: ExpansionType, weight: f64| {
            if tokens.iter().any(|t| t == term) {
                return;
            }
            let replace = best.get(term).is_none_or(|e| e.weight < weight);
            if replace {
                best.insert(
                    term.to_string(),
                    Expansion {
                        term: term.to_string(),
                        expansion_type,
                        weight,
                    },
                );
            }
        };

        for token in tokens {
            for synonym in self.synonyms.get_synonyms(token) {
                offer(synonym, ExpansionType::Synonym, synonym_weight);
            }
            if let Some(node) = self.nodes.get(token) {
                for (related, &weight) in &node.related {
                    if weight >= min_edge_weight {
                        offer(related, ExpansionType::RelatedConcept, weight);
                    }
                }
            }
        }

        let mut expansions: Vec<Expansion> = best.into_values().collect();
        expansions.sort_by(|a, b| b.weight.total_cmp(&a.weight).then_with(|| a.term.cmp(&b.term)));
        expansions.truncate(max);
        expansions
    }

    /// Fraction of `tokens` that are known concepts.
    pub fn coverage(&self, tokens: &[String]) -> f64 {
        if tokens.is_empty() {
            return 0.0;
        }
        tokens.iter().filter(|t| self.nodes.contains_key(*t)).count() as f64 / tokens.len() as f64
    }

    /// Rough memory footprint in bytes.
    pub fn size_hint(&self) -> usize {
        self.nodes
            .values()
            .map(|n| {
                n.concept.len()
                    + n.category.len()
                    + n.synonyms.iter().map(|s| s.len() + 24).sum::<usize>()
                    + n.related.keys().map(|k| k.len() + 32).sum::<usize>()
                    + 96
            })
            .sum()
    }
}
