//! Path cache: keyed memoization with LRU eviction, TTL, and mutation
//! invalidation
//!
//! Keys are `(start_id, end_id, max_hops, filter_digest)`. The cache is the
//! only in-memory structure shared across requests; it has one owner and a
//! short critical section. Entries expire on TTL (the next read recomputes
//! and refreshes) and are dropped eagerly when a graph mutation touches any
//! entity involved in the key or its stored paths.

use crate::paths::{PathQuery, PathResult};
use parking_lot::Mutex;
use scigraph_core::RelationType;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    start_id: String,
    end_id: String,
    max_hops: usize,
    filter_digest: u64,
}

impl CacheKey {
    fn new(start_id: &str, end_id: &str, query: &PathQuery) -> Self {
        Self {
            start_id: start_id.to_string(),
            end_id: end_id.to_string(),
            max_hops: query.max_hops,
            filter_digest: digest_filters(query.relation_types.as_deref()),
        }
    }
}

fn digest_filters(filters: Option<&[RelationType]>) -> u64 {
    let mut hasher = DefaultHasher::new();
    match filters {
        None => 0u8.hash(&mut hasher),
        Some(types) => {
            1u8.hash(&mut hasher);
            let mut sorted: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
            sorted.sort();
            sorted.dedup();
            sorted.hash(&mut hasher);
        }
    }
    hasher.finish()
}

struct CacheEntry {
    result: PathResult,
    inserted_at: Instant,
}

struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    // Most-recently-used at the back.
    usage: VecDeque<CacheKey>,
}

/// Bounded path-query cache.
pub struct PathCache {
    state: Mutex<CacheState>,
    capacity: usize,
    ttl: Duration,
}

impl PathCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                usage: VecDeque::new(),
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Cached result for a query, refreshing recency. Expired entries are
    /// removed and reported as misses so the caller recomputes.
    pub fn get(&self, start_id: &str, end_id: &str, query: &PathQuery) -> Option<PathResult> {
        let key = CacheKey::new(start_id, end_id, query);
        let mut state = self.state.lock();
        let expired = match state.entries.get(&key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            state.entries.remove(&key);
            state.usage.retain(|k| *k != key);
            return None;
        }
        state.usage.retain(|k| *k != key);
        state.usage.push_back(key.clone());
        state.entries.get(&key).map(|e| e.result.clone())
    }

    /// Insert a result, evicting the least recently used entry when full.
    pub fn put(&self, start_id: &str, end_id: &str, query: &PathQuery, result: PathResult) {
        let key = CacheKey::new(start_id, end_id, query);
        let mut state = self.state.lock();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            if let Some(oldest) = state.usage.pop_front() {
                state.entries.remove(&oldest);
            }
        }
        state.usage.retain(|k| *k != key);
        state.usage.push_back(key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    /// A graph mutation touched `entity_id`: drop every entry whose key or
    /// stored paths involve it.
    pub fn invalidate_entity(&self, entity_id: &str) {
        let mut state = self.state.lock();
        let stale: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(key, entry)| {
                key.start_id == entity_id
                    || key.end_id == entity_id
                    || entry
                        .result
                        .paths
                        .iter()
                        .any(|p| p.nodes.iter().any(|n| n.id == entity_id))
            })
            .map(|(key, _)| key.clone())
            .collect();
        if !stale.is_empty() {
            debug!(entity_id, dropped = stale.len(), "path cache invalidation");
        }
        for key in stale {
            state.entries.remove(&key);
            state.usage.retain(|k| *k != key);
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.usage.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scigraph_core::{Entity, EntityType, Path};

    fn result(start: &str, end: &str, via: &[&str]) -> PathResult {
        let node = |id: &str| Entity::new(id, id, EntityType::Concept);
        let mut nodes = vec![node(start)];
        nodes.extend(via.iter().map(|v| node(v)));
        nodes.push(node(end));
        let hops = nodes.len() - 1;
        PathResult {
            start: node(start),
            end: node(end),
            paths: vec![Path {
                relations: vec![],
                hops,
                score: 0.5,
                nodes,
            }],
            searched_at: Utc::now(),
        }
    }

    fn cache() -> PathCache {
        PathCache::new(2, Duration::from_millis(50))
    }

    #[test]
    fn hit_returns_cached_result() {
        let c = cache();
        let q = PathQuery::default();
        c.put("a", "b", &q, result("a", "b", &[]));
        let hit = c.get("a", "b", &q).unwrap();
        assert_eq!(hit.start.id, "a");

        // Different query parameters are different keys.
        assert!(c.get("a", "b", &PathQuery::with_max_hops(2)).is_none());
    }

    #[test]
    fn filter_digest_is_order_insensitive() {
        let c = cache();
        let q1 = PathQuery {
            relation_types: Some(vec![RelationType::Cites, RelationType::BasedOn]),
            ..Default::default()
        };
        let q2 = PathQuery {
            relation_types: Some(vec![RelationType::BasedOn, RelationType::Cites]),
            ..Default::default()
        };
        c.put("a", "b", &q1, result("a", "b", &[]));
        assert!(c.get("a", "b", &q2).is_some());
    }

    #[test]
    fn lru_evicts_oldest() {
        let c = cache();
        let q = PathQuery::default();
        c.put("a", "b", &q, result("a", "b", &[]));
        c.put("c", "d", &q, result("c", "d", &[]));
        // Touch (a, b) so (c, d) is the LRU victim.
        c.get("a", "b", &q);
        c.put("e", "f", &q, result("e", "f", &[]));

        assert!(c.get("a", "b", &q).is_some());
        assert!(c.get("c", "d", &q).is_none());
        assert!(c.get("e", "f", &q).is_some());
    }

    #[test]
    fn ttl_expiry_forces_recompute() {
        let c = cache();
        let q = PathQuery::default();
        c.put("a", "b", &q, result("a", "b", &[]));
        std::thread::sleep(Duration::from_millis(60));
        assert!(c.get("a", "b", &q).is_none());
        assert!(c.is_empty());
    }

    #[test]
    fn mutation_invalidates_touching_entries() {
        let c = cache();
        let q = PathQuery::default();
        c.put("a", "b", &q, result("a", "b", &["via"]));
        c.put("x", "y", &q, result("x", "y", &[]));

        // "via" only appears inside the stored path.
        c.invalidate_entity("via");
        assert!(c.get("a", "b", &q).is_none());
        assert!(c.get("x", "y", &q).is_some());

        c.invalidate_entity("x");
        assert!(c.get("x", "y", &q).is_none());
    }
}
