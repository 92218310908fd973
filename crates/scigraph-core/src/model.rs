//! Data model: entities, relations, documents, paths, and claims
//!
//! All persisted records carry stable string identifiers. Relations are
//! first-class directed edges; repeat observations of the same
//! `(source, target, type)` triple merge evidence instead of duplicating
//! edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Closed Vocabularies
// ============================================================================

/// Entity types recognized by the graph. Closed set; configuration validation
/// rejects anything outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    AIModel,
    Technique,
    Concept,
    Person,
    Organization,
    Publication,
    Benchmark,
    Architecture,
    Dataset,
    Method,
    Community,
}

impl EntityType {
    pub const ALL: [EntityType; 11] = [
        EntityType::AIModel,
        EntityType::Technique,
        EntityType::Concept,
        EntityType::Person,
        EntityType::Organization,
        EntityType::Publication,
        EntityType::Benchmark,
        EntityType::Architecture,
        EntityType::Dataset,
        EntityType::Method,
        EntityType::Community,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::AIModel => "AIModel",
            EntityType::Technique => "Technique",
            EntityType::Concept => "Concept",
            EntityType::Person => "Person",
            EntityType::Organization => "Organization",
            EntityType::Publication => "Publication",
            EntityType::Benchmark => "Benchmark",
            EntityType::Architecture => "Architecture",
            EntityType::Dataset => "Dataset",
            EntityType::Method => "Method",
            EntityType::Community => "Community",
        }
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown entity type: {s}"))
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relation types recognized by the graph. Closed vocabulary; LLM outputs
/// outside this set are dropped, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationType {
    #[serde(rename = "DEVELOPED_BY")]
    DevelopedBy,
    #[serde(rename = "TRAINED_ON")]
    TrainedOn,
    #[serde(rename = "USES_TECHNIQUE")]
    UsesTechnique,
    #[serde(rename = "EVALUATED_ON")]
    EvaluatedOn,
    #[serde(rename = "CITES")]
    Cites,
    #[serde(rename = "AFFILIATED_WITH")]
    AffiliatedWith,
    #[serde(rename = "CONTRIBUTED_TO")]
    ContributedTo,
    #[serde(rename = "SPECIALIZES_IN")]
    SpecializesIn,
    #[serde(rename = "INFLUENCED_BY")]
    InfluencedBy,
    #[serde(rename = "COLLABORATED_WITH")]
    CollaboratedWith,
    #[serde(rename = "EVOLVED_INTO")]
    EvolvedInto,
    #[serde(rename = "COMPETES_WITH")]
    CompetesWith,
    #[serde(rename = "BASED_ON")]
    BasedOn,
}

impl RelationType {
    pub const ALL: [RelationType; 13] = [
        RelationType::DevelopedBy,
        RelationType::TrainedOn,
        RelationType::UsesTechnique,
        RelationType::EvaluatedOn,
        RelationType::Cites,
        RelationType::AffiliatedWith,
        RelationType::ContributedTo,
        RelationType::SpecializesIn,
        RelationType::InfluencedBy,
        RelationType::CollaboratedWith,
        RelationType::EvolvedInto,
        RelationType::CompetesWith,
        RelationType::BasedOn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::DevelopedBy => "DEVELOPED_BY",
            RelationType::TrainedOn => "TRAINED_ON",
            RelationType::UsesTechnique => "USES_TECHNIQUE",
            RelationType::EvaluatedOn => "EVALUATED_ON",
            RelationType::Cites => "CITES",
            RelationType::AffiliatedWith => "AFFILIATED_WITH",
            RelationType::ContributedTo => "CONTRIBUTED_TO",
            RelationType::SpecializesIn => "SPECIALIZES_IN",
            RelationType::InfluencedBy => "INFLUENCED_BY",
            RelationType::CollaboratedWith => "COLLABORATED_WITH",
            RelationType::EvolvedInto => "EVOLVED_INTO",
            RelationType::CompetesWith => "COMPETES_WITH",
            RelationType::BasedOn => "BASED_ON",
        }
    }

    /// Comma-separated vocabulary, used when enumerating allowed types in
    /// LLM prompts.
    pub fn vocabulary() -> String {
        RelationType::ALL
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        RelationType::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(trimmed))
            .copied()
            .ok_or_else(|| format!("unknown relation type: {s}"))
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entities and Aliases
// ============================================================================

/// A node in the property graph. `(entity_type, id)` is unique; after
/// creation the record is mutated by merge operations only, and surface-name
/// drift is recorded as aliases rather than overwrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    /// Surface form as first observed.
    pub name: String,
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            entity_type,
            description: None,
            attributes: HashMap::new(),
        }
    }
}

/// Provenance of an alias row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasSource {
    Rule,
    Similarity,
    Llm,
    Manual,
}

/// A recorded surface-form → canonical-id mapping. `surface` is unique; rows
/// may be replaced by a higher-confidence source but are never implicitly
/// deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub surface: String,
    pub canonical: String,
    pub confidence: f64,
    pub source: AliasSource,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Relations and Evidence
// ============================================================================

/// How a relation proposal was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Cooccurrence,
    Pattern,
    Llm,
    Hybrid,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Cooccurrence => "cooccurrence",
            ExtractionMethod::Pattern => "pattern",
            ExtractionMethod::Llm => "llm",
            ExtractionMethod::Hybrid => "hybrid",
        }
    }
}

/// Triage outcome for a scored relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Approved,
    Pending,
    Rejected,
    Modified,
}

/// Per-source justification attached to a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub document_id: String,
    pub context_snippet: String,
    pub method: ExtractionMethod,
    pub raw_confidence: f64,
}

/// The four raw component scores fused into a relation's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub cooccurrence: f64,
    pub llm: f64,
    pub source_reliability: f64,
    pub graph_consistency: f64,
}

impl ScoreComponents {
    /// Neutral defaults for components with no concrete evidence.
    pub fn neutral() -> Self {
        Self {
            cooccurrence: 0.5,
            llm: 0.5,
            source_reliability: 0.5,
            graph_consistency: 0.5,
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [
            self.cooccurrence,
            self.llm,
            self.source_reliability,
            self.graph_consistency,
        ]
    }
}

/// A directed, confidence-scored edge. At most one relation exists per
/// `(source, target, rel_type)` triple; repeat observations merge evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub source: String,
    pub target: String,
    pub rel_type: RelationType,
    pub confidence: f64,
    pub score_components: ScoreComponents,
    pub evidence: Vec<Evidence>,
    pub review_status: ReviewStatus,
    #[serde(default)]
    pub needs_review: bool,
    pub method: ExtractionMethod,
}

impl Relation {
    /// The merge key: two proposals with the same key collapse into one
    /// relation.
    pub fn key(&self) -> (String, String, RelationType) {
        (self.source.clone(), self.target.clone(), self.rel_type)
    }
}

// ============================================================================
// Documents
// ============================================================================

/// An entity occurrence pre-tagged in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub positions: Vec<usize>,
}

impl DocumentEntity {
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: None,
            name: name.into(),
            entity_type,
            positions: Vec::new(),
        }
    }

    /// Stable id: the pre-assigned one when present, otherwise the surface
    /// name itself.
    pub fn stable_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

/// A scholarly document after intake. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Harvester name (arxiv, unpaywall, ...).
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entities: Vec<DocumentEntity>,
}

// ============================================================================
// Co-occurrence
// ============================================================================

/// Textual granularity at which a co-occurrence was observed. Ordering is by
/// specificity: `Sentence > Paragraph > Document`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CooccurrenceLevel {
    Document,
    Paragraph,
    Sentence,
}

impl CooccurrenceLevel {
    pub fn specificity(&self) -> u8 {
        match self {
            CooccurrenceLevel::Document => 0,
            CooccurrenceLevel::Paragraph => 1,
            CooccurrenceLevel::Sentence => 2,
        }
    }

    /// Confidence multiplier for observations at this scope.
    pub fn factor(&self) -> f64 {
        match self {
            CooccurrenceLevel::Sentence => 1.0,
            CooccurrenceLevel::Paragraph => 0.8,
            CooccurrenceLevel::Document => 0.6,
        }
    }
}

/// Transient record of an entity pair co-occurring. `level` is the most
/// specific scope at which any co-occurrence of the pair was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooccurrencePair {
    pub source_id: String,
    pub target_id: String,
    pub count: usize,
    pub document_ids: Vec<String>,
    pub level: CooccurrenceLevel,
}

// ============================================================================
// Paths
// ============================================================================

/// Edge traversal direction relative to path order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// One edge of a discovered path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRelation {
    pub rel_type: RelationType,
    pub direction: Direction,
    pub confidence: f64,
}

/// A simple (non-revisiting) path through the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub nodes: Vec<Entity>,
    pub relations: Vec<PathRelation>,
    pub hops: usize,
    pub score: f64,
}

impl Path {
    /// Structural invariants: `hops == relations.len()`,
    /// `nodes.len() == hops + 1`, no repeated node.
    pub fn is_well_formed(&self) -> bool {
        if self.hops != self.relations.len() || self.nodes.len() != self.hops + 1 {
            return false;
        }
        let mut seen = std::collections::HashSet::new();
        self.nodes.iter().all(|n| seen.insert(n.id.as_str()))
    }
}

// ============================================================================
// Claims and Consistency
// ============================================================================

/// A short assertion extracted from generated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactClaim {
    pub id: String,
    pub text: String,
    pub entity_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<RelationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// What a piece of consistency evidence refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    MatchedEdge,
    SupportingPath,
    MissingEntity,
    MissingRelation,
    WrongRelation,
}

/// Evidence for or against a claim's consistency with the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyEvidence {
    pub kind: EvidenceKind,
    pub detail: String,
}

/// Outcome of validating a claim against the stored graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyResult {
    pub claim: FactClaim,
    pub is_consistent: bool,
    pub score: f64,
    pub supporting_evidence: Vec<ConsistencyEvidence>,
    pub contradicting_evidence: Vec<ConsistencyEvidence>,
    pub suggestions: Vec<String>,
    pub explanation: String,
}
