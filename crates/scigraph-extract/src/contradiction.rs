//! Contradiction detection over proposed relation sets
//!
//! Three kinds of inconsistency:
//!
//! 1. Pair-conflict: one `(source, target)` pair bears two relation types
//!    the configuration declares mutually exclusive.
//! 2. Directional: `(a→b, T)` and `(b→a, T)` both present for an
//!    asymmetric `T`.
//! 3. Cyclic: a cycle of length ≥ 2 in a relation type declared acyclic.
//!
//! Every involved relation is downgraded to pending review regardless of
//! confidence. Detection is pure over the relation set, so re-running it on
//! its own output marks nothing new.

use scigraph_core::{GraphConfig, Relation, RelationType, ReviewStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

type RelationKey = (String, String, RelationType);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContradictionKind {
    /// Two mutually exclusive types between the same pair.
    PairConflict {
        first: RelationType,
        second: RelationType,
    },
    /// Both directions of an asymmetric type.
    Directional { rel_type: RelationType },
    /// A cycle in an acyclic type.
    Cycle {
        rel_type: RelationType,
        nodes: Vec<String>,
    },
}

/// One detected inconsistency and the relations it implicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub kind: ContradictionKind,
    pub involved: Vec<RelationKey>,
}

pub struct ContradictionDetector {
    config: Arc<GraphConfig>,
}

impl ContradictionDetector {
    pub fn new(config: Arc<GraphConfig>) -> Self {
        Self { config }
    }

    /// Detect all contradictions in a relation set.
    pub fn detect(&self, relations: &[Relation]) -> Vec<Contradiction> {
        let mut found = Vec::new();
        found.extend(self.pair_conflicts(relations));
        found.extend(self.directional_conflicts(relations));
        found.extend(self.cycles(relations));
        found
    }

    /// Detect and downgrade: every involved relation is forced to pending
    /// review. Returns the detected set.
    pub fn apply(&self, relations: &mut [Relation]) -> Vec<Contradiction> {
        let found = self.detect(relations);
        let implicated: HashSet<RelationKey> = found
            .iter()
            .flat_map(|c| c.involved.iter().cloned())
            .collect();
        for relation in relations.iter_mut() {
            if implicated.contains(&relation.key()) {
                relation.review_status = ReviewStatus::Pending;
                relation.needs_review = true;
            }
        }
        if !found.is_empty() {
            debug!(count = found.len(), "contradictions detected");
        }
        found
    }

    fn pair_conflicts(&self, relations: &[Relation]) -> Vec<Contradiction> {
        let mut by_pair: HashMap<(&str, &str), Vec<&Relation>> = HashMap::new();
        for r in relations {
            by_pair
                .entry((r.source.as_str(), r.target.as_str()))
                .or_default()
                .push(r);
        }

        let mut found = Vec::new();
        for group in by_pair.values() {
            for i in 0..group.len() {
                for j in (i + 1)..group.len() {
                    let (a, b) = (group[i], group[j]);
                    if self.config.conflicts_with(a.rel_type, b.rel_type) {
                        found.push(Contradiction {
                            kind: ContradictionKind::PairConflict {
                                first: a.rel_type,
                                second: b.rel_type,
                            },
                            involved: vec![a.key(), b.key()],
                        });
                    }
                }
            }
        }
        found
    }

    fn directional_conflicts(&self, relations: &[Relation]) -> Vec<Contradiction> {
        let keys: HashSet<RelationKey> = relations.iter().map(|r| r.key()).collect();
        let mut reported: HashSet<RelationKey> = HashSet::new();
        let mut found = Vec::new();

        for r in relations {
            let def = match self.config.relation_def(r.rel_type) {
                Some(def) => def,
                None => continue,
            };
            if def.bidirectional {
                continue;
            }
            let reverse = (r.target.clone(), r.source.clone(), r.rel_type);
            if keys.contains(&reverse) && !reported.contains(&r.key()) {
                reported.insert(r.key());
                reported.insert(reverse.clone());
                found.push(Contradiction {
                    kind: ContradictionKind::Directional {
                        rel_type: r.rel_type,
                    },
                    involved: vec![r.key(), reverse],
                });
            }
        }
        found
    }

    fn cycles(&self, relations: &[Relation]) -> Vec<Contradiction> {
        let acyclic_types: Vec<RelationType> = self
            .config
            .relations
            .iter()
            .filter(|def| def.acyclic)
            .map(|def| def.rel_type)
            .collect();

        let mut found = Vec::new();
        for rel_type in acyclic_types {
            let mut adjacency: HashMap<&str, Vec<&Relation>> = HashMap::new();
            for r in relations.iter().filter(|r| r.rel_type == rel_type) {
                adjacency.entry(r.source.as_str()).or_default().push(r);
            }
            if adjacency.is_empty() {
                continue;
            }
            found.extend(find_cycles(rel_type, &adjacency));
        }
        found
    }
}

/// Iterative DFS cycle search per relation type. Each cycle is reported
/// once, anchored at its smallest node id.
fn find_cycles(
    rel_type: RelationType,
    adjacency: &HashMap<&str, Vec<&Relation>>,
) -> Vec<Contradiction> {
    let mut found = Vec::new();
    let mut seen_cycles: HashSet<Vec<String>> = HashSet::new();

    for &start in adjacency.keys() {
        // DFS with explicit stack of (node, path-so-far).
        let mut stack: Vec<(&str, Vec<&str>)> = vec![(start, vec![start])];
        while let Some((node, path)) = stack.pop() {
            let Some(edges) = adjacency.get(node) else {
                continue;
            };
            for edge in edges {
                let next = edge.target.as_str();
                if let Some(pos) = path.iter().position(|&n| n == next) {
                    let cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
                    if cycle.len() < 2 {
                        continue;
                    }
                    let mut canonical = cycle.clone();
                    canonical.sort();
                    if seen_cycles.insert(canonical) {
                        let involved = cycle_edges(&cycle, rel_type, adjacency);
                        found.push(Contradiction {
                            kind: ContradictionKind::Cycle {
                                rel_type,
                                nodes: cycle,
                            },
                            involved,
                        });
                    }
                } else if path.len() <= adjacency.len() + 1 {
                    let mut next_path = path.clone();
                    next_path.push(next);
                    stack.push((next, next_path));
                }
            }
        }
    }
    found
}

fn cycle_edges(
    cycle: &[String],
    rel_type: RelationType,
    adjacency: &HashMap<&str, Vec<&Relation>>,
) -> Vec<RelationKey> {
    let mut edges = Vec::new();
    for i in 0..cycle.len() {
        let from = cycle[i].as_str();
        let to = cycle[(i + 1) % cycle.len()].as_str();
        if let Some(outgoing) = adjacency.get(from) {
            if outgoing.iter().any(|r| r.target == to) {
                edges.push((from.to_string(), to.to_string(), rel_type));
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use scigraph_core::{ExtractionMethod, ScoreComponents};

    fn relation(source: &str, rel_type: RelationType, target: &str, confidence: f64) -> Relation {
        Relation {
            source: source.into(),
            target: target.into(),
            rel_type,
            confidence,
            score_components: ScoreComponents::neutral(),
            evidence: Vec::new(),
            review_status: ReviewStatus::Approved,
            needs_review: false,
            method: ExtractionMethod::Pattern,
        }
    }

    fn detector() -> ContradictionDetector {
        ContradictionDetector::new(Arc::new(GraphConfig::default()))
    }

    #[test]
    fn conflicting_pair_downgrades_both() {
        let mut relations = vec![
            relation("a", RelationType::DevelopedBy, "b", 0.9),
            relation("a", RelationType::CompetesWith, "b", 0.8),
        ];
        let found = detector().apply(&mut relations);
        assert_eq!(found.len(), 1);
        assert!(matches!(
            found[0].kind,
            ContradictionKind::PairConflict { .. }
        ));
        for r in &relations {
            assert_eq!(r.review_status, ReviewStatus::Pending);
            assert!(r.needs_review);
        }
    }

    #[test]
    fn asymmetric_both_directions_is_directional_conflict() {
        let mut relations = vec![
            relation("a", RelationType::DevelopedBy, "b", 0.9),
            relation("b", RelationType::DevelopedBy, "a", 0.9),
        ];
        let found = detector().apply(&mut relations);
        // The a→b→a pair is both a directional conflict and a 2-cycle in an
        // acyclic type; both report the same two edges.
        assert!(found
            .iter()
            .any(|c| matches!(c.kind, ContradictionKind::Directional { .. })));
        assert!(relations.iter().all(|r| r.needs_review));
    }

    #[test]
    fn bidirectional_types_allow_both_directions() {
        let mut relations = vec![
            relation("a", RelationType::CollaboratedWith, "b", 0.9),
            relation("b", RelationType::CollaboratedWith, "a", 0.9),
        ];
        let found = detector().apply(&mut relations);
        assert!(found.is_empty());
        assert!(relations.iter().all(|r| !r.needs_review));
    }

    #[test]
    fn three_cycle_in_acyclic_type_is_detected() {
        let mut relations = vec![
            relation("a", RelationType::BasedOn, "b", 0.9),
            relation("b", RelationType::BasedOn, "c", 0.9),
            relation("c", RelationType::BasedOn, "a", 0.9),
        ];
        let found = detector().apply(&mut relations);
        assert_eq!(found.len(), 1);
        match &found[0].kind {
            ContradictionKind::Cycle { rel_type, nodes } => {
                assert_eq!(*rel_type, RelationType::BasedOn);
                assert_eq!(nodes.len(), 3);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(relations.iter().all(|r| r.needs_review));
    }

    #[test]
    fn chain_without_cycle_is_clean() {
        let mut relations = vec![
            relation("a", RelationType::BasedOn, "b", 0.9),
            relation("b", RelationType::BasedOn, "c", 0.9),
        ];
        assert!(detector().apply(&mut relations).is_empty());
    }

    #[test]
    fn detection_is_idempotent() {
        let mut relations = vec![
            relation("a", RelationType::DevelopedBy, "b", 0.9),
            relation("a", RelationType::CompetesWith, "b", 0.8),
        ];
        let first = detector().apply(&mut relations);
        let second = detector().apply(&mut relations);
        assert_eq!(first, second);
    }
}
