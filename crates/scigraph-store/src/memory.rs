//! In-memory property graph
//!
//! Reference implementation of the adapter semantics: upsert nodes by
//! `(type, id)`, upsert edges by `(source, type, target)` with evidence
//! merge. Single writer discipline is not enforced here; the maps sit
//! behind an `RwLock` and readers tolerate concurrent writes.

use async_trait::async_trait;
use parking_lot::RwLock;
use scigraph_core::{
    Entity, EntityType, ExtractionMethod, GraphReader, GraphWriter, Relation, RelationType,
    StoreError,
};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

type RelationKey = (String, RelationType, String);

#[derive(Default)]
struct GraphState {
    entities: HashMap<String, Entity>,
    relations: HashMap<RelationKey, Relation>,
}

/// In-memory graph store. Cheap to clone handles via `Arc`.
#[derive(Default)]
pub struct MemoryGraph {
    state: RwLock<GraphState>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation_count(&self) -> usize {
        self.state.read().relations.len()
    }

    /// Ids of every stored entity; test helper.
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().entities.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl GraphReader for MemoryGraph {
    async fn get_entity(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        Ok(self.state.read().entities.get(id).cloned())
    }

    async fn find_entity(&self, name_or_id: &str) -> Result<Option<Entity>, StoreError> {
        let state = self.state.read();
        if let Some(entity) = state.entities.get(name_or_id) {
            return Ok(Some(entity.clone()));
        }
        Ok(state
            .entities
            .values()
            .find(|e| e.name == name_or_id)
            .cloned())
    }

    async fn outgoing(&self, id: &str) -> Result<Vec<Relation>, StoreError> {
        let state = self.state.read();
        let mut edges: Vec<Relation> = state
            .relations
            .values()
            .filter(|r| r.source == id)
            .cloned()
            .collect();
        edges.sort_by(|a, b| (&a.target, a.rel_type).cmp(&(&b.target, b.rel_type)));
        Ok(edges)
    }

    async fn incoming(&self, id: &str) -> Result<Vec<Relation>, StoreError> {
        let state = self.state.read();
        let mut edges: Vec<Relation> = state
            .relations
            .values()
            .filter(|r| r.target == id)
            .cloned()
            .collect();
        edges.sort_by(|a, b| (&a.source, a.rel_type).cmp(&(&b.source, b.rel_type)));
        Ok(edges)
    }

    async fn canonical_names(
        &self,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let state = self.state.read();
        let mut names: Vec<(String, String)> = state
            .entities
            .values()
            .filter(|e| entity_type.map_or(true, |t| e.entity_type == t))
            .map(|e| (e.id.clone(), e.name.clone()))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn entity_count(&self) -> Result<usize, StoreError> {
        Ok(self.state.read().entities.len())
    }

    async fn run_query(
        &self,
        _query: &str,
        _params: serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        Err(StoreError::Query(
            "in-memory graph does not execute Cypher".into(),
        ))
    }
}

#[async_trait]
impl GraphWriter for MemoryGraph {
    async fn upsert_entity(&self, entity: &Entity) -> Result<(), StoreError> {
        let mut state = self.state.write();
        match state.entities.entry(entity.id.clone()) {
            Entry::Occupied(mut occupied) => {
                // Merge: keep first-observed name, fold in new attributes.
                let existing = occupied.get_mut();
                if existing.description.is_none() {
                    existing.description = entity.description.clone();
                }
                for (k, v) in &entity.attributes {
                    existing.attributes.entry(k.clone()).or_insert(v.clone());
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entity.clone());
            }
        }
        Ok(())
    }

    async fn upsert_relation(&self, relation: &Relation) -> Result<(), StoreError> {
        let key = (
            relation.source.clone(),
            relation.rel_type,
            relation.target.clone(),
        );
        let mut state = self.state.write();
        match state.relations.entry(key) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                existing.evidence.extend(relation.evidence.iter().cloned());
                if relation.confidence > existing.confidence {
                    existing.confidence = relation.confidence;
                    existing.score_components = relation.score_components;
                    existing.review_status = relation.review_status;
                }
                let methods: std::collections::HashSet<ExtractionMethod> =
                    existing.evidence.iter().map(|e| e.method).collect();
                if methods.len() > 1 {
                    existing.method = ExtractionMethod::Hybrid;
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(relation.clone());
            }
        }
        Ok(())
    }
}

/// Seed helper used by tests and demos.
impl MemoryGraph {
    pub async fn seed_entity(
        &self,
        id: &str,
        name: &str,
        entity_type: EntityType,
    ) -> Result<(), StoreError> {
        self.upsert_entity(&Entity::new(id, name, entity_type)).await
    }

    pub async fn seed_relation(
        &self,
        source: &str,
        rel_type: RelationType,
        target: &str,
        confidence: f64,
    ) -> Result<(), StoreError> {
        self.upsert_relation(&Relation {
            source: source.to_string(),
            target: target.to_string(),
            rel_type,
            confidence,
            score_components: scigraph_core::ScoreComponents::neutral(),
            evidence: Vec::new(),
            review_status: scigraph_core::ReviewStatus::Approved,
            needs_review: false,
            method: ExtractionMethod::Pattern,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scigraph_core::{Direction, Evidence};

    #[tokio::test]
    async fn entity_upsert_merges_not_overwrites() {
        let graph = MemoryGraph::new();
        graph
            .seed_entity("gpt-4", "GPT-4", EntityType::AIModel)
            .await
            .unwrap();

        let mut drifted = Entity::new("gpt-4", "GPT 4", EntityType::AIModel);
        drifted
            .attributes
            .insert("parameters".into(), "unknown".into());
        graph.upsert_entity(&drifted).await.unwrap();

        let stored = graph.get_entity("gpt-4").await.unwrap().unwrap();
        // First-observed surface form wins; drift is recorded as aliases
        // elsewhere, never as an overwrite.
        assert_eq!(stored.name, "GPT-4");
        assert_eq!(stored.attributes.get("parameters").unwrap(), "unknown");
    }

    #[tokio::test]
    async fn relation_upsert_merges_evidence_and_flags_hybrid() {
        let graph = MemoryGraph::new();
        graph
            .seed_entity("a", "A", EntityType::AIModel)
            .await
            .unwrap();
        graph
            .seed_entity("b", "B", EntityType::Organization)
            .await
            .unwrap();

        let base = Relation {
            source: "a".into(),
            target: "b".into(),
            rel_type: RelationType::DevelopedBy,
            confidence: 0.6,
            score_components: scigraph_core::ScoreComponents::neutral(),
            evidence: vec![Evidence {
                document_id: "doc1".into(),
                context_snippet: "A was developed by B".into(),
                method: ExtractionMethod::Pattern,
                raw_confidence: 0.85,
            }],
            review_status: scigraph_core::ReviewStatus::Pending,
            needs_review: false,
            method: ExtractionMethod::Pattern,
        };
        graph.upsert_relation(&base).await.unwrap();

        let mut repeat = base.clone();
        repeat.confidence = 0.8;
        repeat.evidence[0].method = ExtractionMethod::Llm;
        graph.upsert_relation(&repeat).await.unwrap();

        assert_eq!(graph.relation_count(), 1);
        let stored = graph.outgoing("a").await.unwrap().remove(0);
        assert_eq!(stored.evidence.len(), 2);
        assert_eq!(stored.confidence, 0.8);
        assert_eq!(stored.method, ExtractionMethod::Hybrid);
    }

    #[tokio::test]
    async fn neighbors_tags_direction() {
        let graph = MemoryGraph::new();
        graph
            .seed_entity("a", "A", EntityType::AIModel)
            .await
            .unwrap();
        graph
            .seed_entity("b", "B", EntityType::Organization)
            .await
            .unwrap();
        graph
            .seed_relation("a", RelationType::DevelopedBy, "b", 0.9)
            .await
            .unwrap();

        let from_b = graph.neighbors("b").await.unwrap();
        assert_eq!(from_b.len(), 1);
        assert_eq!(from_b[0].1, Direction::Incoming);
    }
}
