//! Scigraph Reason: graph-augmented retrieval and validation
//!
//! Everything here reads the stored graph (and vector index) to answer
//! questions or validate generated text; nothing here writes.
//!
//! - [`PathFinder`]: bounded-hop BFS path discovery with cycle rejection.
//! - [`PathCache`]: LRU + TTL memoization of path queries with mutation
//!   invalidation.
//! - [`PathExplainer`]: path → natural-language rationale.
//! - [`NlQueryService`]: natural language → structured query → Cypher →
//!   execution.
//! - [`CotReasoner`]: stepwise reasoning over a retrieved subgraph.
//! - [`ConsistencyChecker`]: claims cross-checked against graph facts.

pub mod cache;
pub mod consistency;
pub mod cot;
pub mod explain;
pub mod nlquery;
pub mod paths;

pub use cache::PathCache;
pub use consistency::{ClaimConflict, ConsistencyChecker};
pub use cot::{CotReasoner, ReasoningOptions, ReasoningOutcome, ReasoningStep};
pub use explain::PathExplainer;
pub use nlquery::{
    NlQueryService, QueryError, QueryFilter, QueryResponse, QueryStage, QueryType,
    StructuredQuery,
};
pub use paths::{PathFinder, PathQuery, PathResult};

use scigraph_core::{LlmError, StoreError};

/// Faults from the reasoning services. The NL-query service has its own
/// stage-tagged error type.
#[derive(Debug, thiserror::Error)]
pub enum ReasonError {
    #[error("graph store failed: {0}")]
    Store(#[from] StoreError),
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("entity not found: {0}")]
    EntityNotFound(String),
}
