//! Bounded multi-hop path discovery
//!
//! Breadth-first expansion from the start entity, traversing edges in both
//! directions (each path relation carries its traversal direction). The
//! cycle detector rejects any step that would revisit a node already on the
//! path, so every returned path is simple.
//!
//! Ordering: non-decreasing hop count, then descending accumulated edge
//! confidence. Path score is the geometric mean of edge confidences scaled
//! by `1 / (1 + hops)`, preferring shorter paths at equal fidelity.

use crate::ReasonError;
use chrono::{DateTime, Utc};
use scigraph_core::{Direction, Entity, GraphReader, Path, PathRelation, RelationType};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Default cap on enumerated paths per query.
const DEFAULT_MAX_PATHS: usize = 20;

/// Parameters for one path query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathQuery {
    pub max_hops: usize,
    /// When set, only edges of these types are traversed.
    pub relation_types: Option<Vec<RelationType>>,
    /// Total-paths cap; enumeration stops once a BFS level completes with
    /// at least this many found.
    pub max_paths: usize,
}

impl Default for PathQuery {
    fn default() -> Self {
        Self {
            max_hops: 6,
            relation_types: None,
            max_paths: DEFAULT_MAX_PATHS,
        }
    }
}

impl PathQuery {
    pub fn with_max_hops(max_hops: usize) -> Self {
        Self {
            max_hops,
            ..Default::default()
        }
    }
}

/// Result of a path query, timestamped for the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathResult {
    pub start: Entity,
    pub end: Entity,
    pub paths: Vec<Path>,
    pub searched_at: DateTime<Utc>,
}

/// BFS path finder over a [`GraphReader`].
pub struct PathFinder {
    graph: Arc<dyn GraphReader>,
}

struct Frontier {
    node_id: String,
    nodes: Vec<Entity>,
    relations: Vec<PathRelation>,
}

impl PathFinder {
    pub fn new(graph: Arc<dyn GraphReader>) -> Self {
        Self { graph }
    }

    /// Enumerate simple paths between two entities (resolved by name or
    /// id), bounded by hops and total count.
    pub async fn find_paths(
        &self,
        start_name: &str,
        end_name: &str,
        query: &PathQuery,
    ) -> Result<PathResult, ReasonError> {
        let start = self
            .graph
            .find_entity(start_name)
            .await?
            .ok_or_else(|| ReasonError::EntityNotFound(start_name.to_string()))?;
        let end = self
            .graph
            .find_entity(end_name)
            .await?
            .ok_or_else(|| ReasonError::EntityNotFound(end_name.to_string()))?;

        let mut paths = Vec::new();

        if start.id == end.id {
            // The trivial path; only meaningful result for start == end.
            paths.push(score_path(vec![start.clone()], vec![]));
            return Ok(PathResult {
                start,
                end,
                paths,
                searched_at: Utc::now(),
            });
        }
        if query.max_hops == 0 {
            return Ok(PathResult {
                start,
                end,
                paths: vec![],
                searched_at: Utc::now(),
            });
        }

        let mut frontier = VecDeque::new();
        frontier.push_back(Frontier {
            node_id: start.id.clone(),
            nodes: vec![start.clone()],
            relations: vec![],
        });

        let mut hops = 0;
        while !frontier.is_empty() && hops < query.max_hops {
            hops += 1;
            let level_size = frontier.len();
            for _ in 0..level_size {
                let Some(current) = frontier.pop_front() else {
                    break;
                };
                let neighbors = self.graph.neighbors(&current.node_id).await?;

                for (relation, direction) in neighbors {
                    if let Some(allowed) = &query.relation_types {
                        if !allowed.contains(&relation.rel_type) {
                            continue;
                        }
                    }
                    let next_id = match direction {
                        Direction::Outgoing => relation.target.clone(),
                        Direction::Incoming => relation.source.clone(),
                    };
                    // Cycle detector: never revisit a node on this path.
                    if current.nodes.iter().any(|n| n.id == next_id) {
                        continue;
                    }

                    let Some(next_entity) = self.graph.get_entity(&next_id).await? else {
                        continue;
                    };
                    let mut nodes = current.nodes.clone();
                    nodes.push(next_entity);
                    let mut relations = current.relations.clone();
                    relations.push(PathRelation {
                        rel_type: relation.rel_type,
                        direction,
                        confidence: relation.confidence,
                    });

                    if next_id == end.id {
                        paths.push(score_path(nodes, relations));
                    } else if hops < query.max_hops {
                        frontier.push_back(Frontier {
                            node_id: next_id,
                            nodes,
                            relations,
                        });
                    }
                }
            }
            // All paths of `hops` or fewer are now enumerated; safe to stop
            // once the cap is reached.
            if paths.len() >= query.max_paths {
                debug!(found = paths.len(), hops, "path cap reached");
                break;
            }
        }

        paths.sort_by(|a, b| {
            a.hops
                .cmp(&b.hops)
                .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
        });
        paths.truncate(query.max_paths);

        Ok(PathResult {
            start,
            end,
            paths,
            searched_at: Utc::now(),
        })
    }

    /// The single best path by the hop-then-confidence ordering.
    pub async fn find_shortest_path(
        &self,
        start_name: &str,
        end_name: &str,
        query: &PathQuery,
    ) -> Result<Option<Path>, ReasonError> {
        let result = self.find_paths(start_name, end_name, query).await?;
        Ok(result.paths.into_iter().next())
    }

    pub async fn are_connected(
        &self,
        start_name: &str,
        end_name: &str,
        query: &PathQuery,
    ) -> Result<bool, ReasonError> {
        Ok(self
            .find_shortest_path(start_name, end_name, query)
            .await?
            .is_some())
    }

    /// Hop count of the shortest path, if any.
    pub async fn degrees_of_separation(
        &self,
        start_name: &str,
        end_name: &str,
        query: &PathQuery,
    ) -> Result<Option<usize>, ReasonError> {
        Ok(self
            .find_shortest_path(start_name, end_name, query)
            .await?
            .map(|p| p.hops))
    }
}

/// Geometric mean of edge confidences scaled by `1 / (1 + hops)`.
fn score_path(nodes: Vec<Entity>, relations: Vec<PathRelation>) -> Path {
    let hops = relations.len();
    let score = if hops == 0 {
        1.0
    } else {
        let product: f64 = relations.iter().map(|r| r.confidence).product();
        product.powf(1.0 / hops as f64) / (1.0 + hops as f64)
    };
    Path {
        nodes,
        relations,
        hops,
        score,
    }
}

/// Verify a path against the graph at read time: every consecutive
/// `(node, relation, node)` triple must exist with the stored direction.
pub async fn verify_path(graph: &dyn GraphReader, path: &Path) -> Result<bool, ReasonError> {
    if !path.is_well_formed() {
        return Ok(false);
    }
    for (i, rel) in path.relations.iter().enumerate() {
        let (from, to) = match rel.direction {
            Direction::Outgoing => (&path.nodes[i], &path.nodes[i + 1]),
            Direction::Incoming => (&path.nodes[i + 1], &path.nodes[i]),
        };
        let exists = graph
            .outgoing(&from.id)
            .await?
            .iter()
            .any(|r| r.target == to.id && r.rel_type == rel.rel_type);
        if !exists {
            return Ok(false);
        }
    }
    Ok(true)
}
