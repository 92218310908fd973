//! Scigraph Extract: document → scored relations
//!
//! Per-document pipeline:
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐
//! │ Document │──►│ Co-occurrence │─┐
//! └──────────┘   ├───────────────┤ │   ┌───────┐   ┌────────┐   ┌───────────────┐
//!                │ Pattern match │─┼──►│ Merge │──►│ Scorer │──►│ Contradiction │
//!                ├───────────────┤ │   └───────┘   └────────┘   │   detector    │
//!                │ LLM inference │─┘                            └───────────────┘
//!                └───────────────┘
//! ```
//!
//! Merge order is deterministic (co-occurrence → pattern → LLM); the LLM
//! pass is optional and admission-controlled. Batches run documents
//! concurrently up to a configured ceiling; one document's failure never
//! aborts the batch.

pub mod contradiction;
pub mod cooccurrence;
pub mod inferrer;
pub mod orchestrator;
pub mod patterns;
pub mod scorer;

use scigraph_core::{ExtractionMethod, RelationType};
use serde::{Deserialize, Serialize};

pub use contradiction::{Contradiction, ContradictionDetector, ContradictionKind};
pub use cooccurrence::CooccurrenceAnalyzer;
pub use inferrer::{InferenceOutcome, LlmProposal, RelationInferrer};
pub use orchestrator::{
    BatchError, BatchResult, ExtractionEvent, ExtractionPipeline, ExtractionResult, PipelineStats,
};
pub use patterns::PatternMatcher;
pub use scorer::RelationScorer;

/// A relation proposal before fusion. Each evidence source emits these; the
/// orchestrator merges them by `(source, target, type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationProposal {
    pub source_id: String,
    pub target_id: String,
    pub rel_type: RelationType,
    pub raw_confidence: f64,
    pub method: ExtractionMethod,
    pub document_id: String,
    pub context_snippet: String,
}

/// Extraction faults. Contained per document; a batch records them without
/// aborting.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("LLM inference failed: {0}")]
    Llm(#[from] scigraph_core::LlmError),
    #[error("graph store failed: {0}")]
    Store(#[from] scigraph_core::StoreError),
    #[error("extraction cancelled")]
    Cancelled,
}
