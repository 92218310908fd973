//! Scigraph Core: Shared data model and capability seams
//!
//! Everything downstream of the extraction pipeline speaks the types in this
//! crate: entities and relations as they are persisted in the property graph,
//! documents as they arrive from harvesters, and the configuration snapshot
//! that every subsystem receives at construction.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SCIGRAPH PIPELINE                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  Document ──► Extraction ──► ScoredRelations ──► Graph Store    │
//! │                  │                                   │          │
//! │              Normalizer ──► Aliases                  │          │
//! │                                                      ▼          │
//! │  Question ──► Path Finder / NL-Query / CoT / Consistency        │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Subsystems depend on the capability traits ([`GraphReader`],
//! [`GraphWriter`], [`ChatModel`], [`Embedder`]) rather than concrete
//! adapters, so the graph store, vector index, and model endpoints stay
//! swappable collaborators.

pub mod config;
pub mod error;
pub mod model;
pub mod traits;

pub use config::{
    GraphConfig, RelationDef, ScoringWeights, SimilarityThresholds, TriageThresholds,
};
pub use error::{ConfigError, LlmError, StoreError};
pub use model::{
    Alias, AliasSource, ConsistencyEvidence, ConsistencyResult, CooccurrenceLevel,
    CooccurrencePair, Direction, Document, DocumentEntity, Entity, EntityType, Evidence,
    EvidenceKind, ExtractionMethod, FactClaim, Path, PathRelation, Relation, RelationType,
    ReviewStatus, ScoreComponents,
};
pub use traits::{ChatModel, Embedder, GenerationOptions, GraphReader, GraphWriter};
