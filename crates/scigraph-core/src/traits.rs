//! Capability traits: one explicit interface per external collaborator
//!
//! Callers hold `Arc<dyn GraphReader>` (and friends) rather than concrete
//! adapter types. The graph and vector stores are mutated only by the
//! extraction orchestrator and the normalizer; everything else is a reader
//! and tolerates concurrent writes.

use crate::error::{LlmError, StoreError};
use crate::model::{Direction, Entity, EntityType, Relation};
use async_trait::async_trait;

/// Read-side operations against the property graph.
#[async_trait]
pub trait GraphReader: Send + Sync {
    async fn get_entity(&self, id: &str) -> Result<Option<Entity>, StoreError>;

    /// Resolve an entity by exact name or id.
    async fn find_entity(&self, name_or_id: &str) -> Result<Option<Entity>, StoreError>;

    /// Outgoing edges from an entity.
    async fn outgoing(&self, id: &str) -> Result<Vec<Relation>, StoreError>;

    /// Incoming edges to an entity.
    async fn incoming(&self, id: &str) -> Result<Vec<Relation>, StoreError>;

    /// All edges touching an entity, tagged with traversal direction.
    async fn neighbors(&self, id: &str) -> Result<Vec<(Relation, Direction)>, StoreError> {
        let mut edges: Vec<(Relation, Direction)> = self
            .outgoing(id)
            .await?
            .into_iter()
            .map(|r| (r, Direction::Outgoing))
            .collect();
        edges.extend(
            self.incoming(id)
                .await?
                .into_iter()
                .map(|r| (r, Direction::Incoming)),
        );
        Ok(edges)
    }

    /// `(id, name)` of every canonical entity, optionally restricted by type.
    /// The normalizer's similarity stage matches against this list.
    async fn canonical_names(
        &self,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<(String, String)>, StoreError>;

    async fn entity_count(&self) -> Result<usize, StoreError>;

    /// Total degree (in + out) of an entity.
    async fn degree(&self, id: &str) -> Result<usize, StoreError> {
        Ok(self.neighbors(id).await?.len())
    }

    /// Parameterized query in the store's query language, returning one JSON
    /// record per result row.
    async fn run_query(
        &self,
        query: &str,
        params: serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, StoreError>;
}

/// Write-side operations. Upsert semantics: merge by key, update properties.
#[async_trait]
pub trait GraphWriter: Send + Sync {
    /// Upsert a node by `(type, id)`.
    async fn upsert_entity(&self, entity: &Entity) -> Result<(), StoreError>;

    /// Upsert an edge by `(source, type, target)`, merging evidence on
    /// repeat observation.
    async fn upsert_relation(&self, relation: &Relation) -> Result<(), StoreError>;
}

/// Generation options for a chat completion.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub max_tokens: Option<usize>,
    pub temperature: Option<f64>,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(1024),
            temperature: Some(0.2),
            stop_sequences: Vec::new(),
        }
    }
}

/// Single-turn, non-streaming chat completion endpoint.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str, opts: &GenerationOptions) -> Result<String, LlmError>;
}

/// Fixed-dimension text embedding endpoint.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;

    fn dimension(&self) -> usize;
}
