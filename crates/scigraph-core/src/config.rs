//! Configuration: one immutable, validated snapshot per subsystem
//!
//! The whole pipeline is parameterized by a single [`GraphConfig`] value
//! loaded at startup. Subsystems receive an `Arc<GraphConfig>` at
//! construction and never observe mutation; reload is a full rebuild of the
//! snapshot followed by reconstructing the consumers.
//!
//! Validation is strict and fatal: scoring weights must sum to 1.0 within
//! 1e-3, thresholds must be ordered and inside [0, 1], and every relation
//! referenced anywhere (conflict table, seeding table) must carry a
//! definition with non-empty source/target type sets.

use crate::error::ConfigError;
use crate::model::{EntityType, ExtractionMethod, RelationType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-3;

/// Default reliability applied to evidence sources absent from the
/// per-source map.
pub const DEFAULT_SOURCE_RELIABILITY: f64 = 0.7;

// ============================================================================
// Relation Definitions
// ============================================================================

/// Declaration of one relation type: who may bear it, whether the extractor
/// proposes it, and the lexical triggers that suggest it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationDef {
    pub rel_type: RelationType,
    pub source_types: Vec<EntityType>,
    pub target_types: Vec<EntityType>,
    /// Symmetric relations admit both directions; asymmetric ones make
    /// `(a→b, T)` plus `(b→a, T)` a directional contradiction.
    #[serde(default)]
    pub bidirectional: bool,
    /// Whether the extraction pipeline may propose this type.
    #[serde(default = "default_true")]
    pub extractable: bool,
    /// Acyclic types make any cycle a contradiction.
    #[serde(default)]
    pub acyclic: bool,
    /// Trigger phrases for the pattern matcher.
    #[serde(default)]
    pub patterns: Vec<String>,
    pub default_confidence: f64,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Weights and Thresholds
// ============================================================================

/// Fusion weights over the four score components. Must sum to 1.0 ± 1e-3.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub cooccurrence: f64,
    pub llm: f64,
    pub source_reliability: f64,
    pub graph_consistency: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            cooccurrence: 0.3,
            llm: 0.3,
            source_reliability: 0.2,
            graph_consistency: 0.2,
        }
    }
}

impl ScoringWeights {
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.cooccurrence,
            self.llm,
            self.source_reliability,
            self.graph_consistency,
        ]
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }
}

/// Confidence thresholds routing scored relations to triage outcomes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TriageThresholds {
    /// `confidence >= auto_approve` → approved.
    pub auto_approve: f64,
    /// `review <= confidence < auto_approve` → pending; below → rejected.
    pub review: f64,
}

impl Default for TriageThresholds {
    fn default() -> Self {
        Self {
            auto_approve: 0.7,
            review: 0.5,
        }
    }
}

/// Thresholds for the normalizer's similarity stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimilarityThresholds {
    /// Best candidate at or above this similarity is accepted outright.
    pub auto_accept: f64,
    /// Candidates in `[review_floor, auto_accept)` route to LLM confirmation.
    pub review_floor: f64,
}

impl Default for SimilarityThresholds {
    fn default() -> Self {
        Self {
            auto_accept: 0.85,
            review_floor: 0.7,
        }
    }
}

// ============================================================================
// Graph Config
// ============================================================================

/// The versioned configuration object handed to every subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    pub relations: Vec<RelationDef>,
    #[serde(default)]
    pub weights: ScoringWeights,
    #[serde(default)]
    pub triage: TriageThresholds,
    #[serde(default)]
    pub similarity: SimilarityThresholds,
    #[serde(default = "default_consistency_threshold")]
    pub consistency_threshold: f64,
    /// Pairs of relation types that may not both hold between the same
    /// ordered `(source, target)` pair.
    #[serde(default)]
    pub conflicting_pairs: Vec<(RelationType, RelationType)>,
    /// Entity-type pair → relation type proposed for bare co-occurrence.
    #[serde(default)]
    pub cooccurrence_seeds: Vec<CooccurrenceSeed>,
    /// Per-evidence-source reliability; methods absent here fall back to
    /// [`DEFAULT_SOURCE_RELIABILITY`].
    #[serde(default)]
    pub source_reliability: HashMap<ExtractionMethod, f64>,
    /// Document-level concurrency ceiling for batch extraction.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Hard hop ceiling for path discovery.
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    /// Character window scanned around an entity pair for triggers and LLM
    /// context.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

fn default_version() -> u32 {
    1
}

fn default_consistency_threshold() -> f64 {
    0.7
}

fn default_max_concurrency() -> usize {
    10
}

fn default_max_hops() -> usize {
    6
}

fn default_context_window() -> usize {
    150
}

/// One row of the co-occurrence type-seeding table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooccurrenceSeed {
    pub source_type: EntityType,
    pub target_type: EntityType,
    pub rel_type: RelationType,
}

impl GraphConfig {
    /// Parse and validate a configuration document. Any violation is fatal.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: GraphConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Strict validation; returns the first violation with a pointer to the
    /// offending configuration path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::InvalidWeights { sum });
        }

        for (path, value) in [
            ("triage.auto_approve", self.triage.auto_approve),
            ("triage.review", self.triage.review),
            ("similarity.auto_accept", self.similarity.auto_accept),
            ("similarity.review_floor", self.similarity.review_floor),
            ("consistency_threshold", self.consistency_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange {
                    path: path.to_string(),
                    value,
                });
            }
        }
        if self.triage.review >= self.triage.auto_approve {
            return Err(ConfigError::ThresholdsInverted {
                path: "triage".to_string(),
                lower: self.triage.review,
                upper: self.triage.auto_approve,
            });
        }
        if self.similarity.review_floor >= self.similarity.auto_accept {
            return Err(ConfigError::ThresholdsInverted {
                path: "similarity".to_string(),
                lower: self.similarity.review_floor,
                upper: self.similarity.auto_accept,
            });
        }

        for (idx, def) in self.relations.iter().enumerate() {
            if def.source_types.is_empty() {
                return Err(ConfigError::EmptyTypeSet {
                    path: format!("relations[{idx}].source_types"),
                    rel_type: def.rel_type,
                });
            }
            if def.target_types.is_empty() {
                return Err(ConfigError::EmptyTypeSet {
                    path: format!("relations[{idx}].target_types"),
                    rel_type: def.rel_type,
                });
            }
            if !(0.0..=1.0).contains(&def.default_confidence) {
                return Err(ConfigError::ThresholdOutOfRange {
                    path: format!("relations[{idx}].default_confidence"),
                    value: def.default_confidence,
                });
            }
        }

        for (idx, (a, b)) in self.conflicting_pairs.iter().enumerate() {
            for rel in [a, b] {
                if self.relation_def(*rel).is_none() {
                    return Err(ConfigError::UnknownRelationReference {
                        path: format!("conflicting_pairs[{idx}]"),
                        rel_type: *rel,
                    });
                }
            }
        }
        for (idx, seed) in self.cooccurrence_seeds.iter().enumerate() {
            if self.relation_def(seed.rel_type).is_none() {
                return Err(ConfigError::UnknownRelationReference {
                    path: format!("cooccurrence_seeds[{idx}]"),
                    rel_type: seed.rel_type,
                });
            }
        }

        for (method, value) in &self.source_reliability {
            if !(0.0..=1.0).contains(value) {
                return Err(ConfigError::ThresholdOutOfRange {
                    path: format!("source_reliability.{}", method.as_str()),
                    value: *value,
                });
            }
        }

        Ok(())
    }

    pub fn relation_def(&self, rel_type: RelationType) -> Option<&RelationDef> {
        self.relations.iter().find(|d| d.rel_type == rel_type)
    }

    /// Reliability for an evidence source, falling back to the conservative
    /// default.
    pub fn reliability_for(&self, method: ExtractionMethod) -> f64 {
        self.source_reliability
            .get(&method)
            .copied()
            .unwrap_or(DEFAULT_SOURCE_RELIABILITY)
    }

    /// Relation type seeded for a bare co-occurrence of the given entity-type
    /// pair. `CITES` is the permissive fallback when no seed matches.
    pub fn seed_relation(&self, source: EntityType, target: EntityType) -> RelationType {
        self.cooccurrence_seeds
            .iter()
            .find(|s| s.source_type == source && s.target_type == target)
            .map(|s| s.rel_type)
            .unwrap_or(RelationType::Cites)
    }

    pub fn conflicts_with(&self, a: RelationType, b: RelationType) -> bool {
        self.conflicting_pairs
            .iter()
            .any(|(x, y)| (*x == a && *y == b) || (*x == b && *y == a))
    }
}

impl Default for GraphConfig {
    /// The built-in vocabulary for scientific-literature graphs.
    fn default() -> Self {
        use EntityType::*;
        use RelationType::*;

        fn def(
            rel_type: RelationType,
            source_types: &[EntityType],
            target_types: &[EntityType],
            patterns: &[&str],
            default_confidence: f64,
        ) -> RelationDef {
            use RelationType::*;
            RelationDef {
                rel_type,
                source_types: source_types.to_vec(),
                target_types: target_types.to_vec(),
                bidirectional: matches!(rel_type, CollaboratedWith | CompetesWith),
                extractable: true,
                acyclic: matches!(rel_type, DevelopedBy | BasedOn | EvolvedInto | TrainedOn),
                patterns: patterns.iter().map(|p| p.to_string()).collect(),
                default_confidence,
            }
        }

        Self {
            version: 1,
            relations: vec![
                def(
                    DevelopedBy,
                    &[AIModel, Technique, Architecture, Method, Dataset, Benchmark],
                    &[Organization, Person, Community],
                    &["was developed by", "developed by", "created by", "built by"],
                    0.85,
                ),
                def(
                    TrainedOn,
                    &[AIModel],
                    &[Dataset],
                    &["trained on", "was trained on", "pretrained on"],
                    0.85,
                ),
                def(
                    UsesTechnique,
                    &[AIModel, Method, Architecture],
                    &[Technique, Method, Architecture],
                    &["uses", "employs", "leverages", "applies"],
                    0.75,
                ),
                def(
                    EvaluatedOn,
                    &[AIModel, Method],
                    &[Benchmark, Dataset],
                    &["evaluated on", "tested on", "benchmarked on"],
                    0.8,
                ),
                def(
                    Cites,
                    &[Publication],
                    &[Publication],
                    &["cites", "references", "builds on the work of"],
                    0.7,
                ),
                def(
                    AffiliatedWith,
                    &[Person],
                    &[Organization, Community],
                    &["affiliated with", "works at", "is at"],
                    0.8,
                ),
                def(
                    ContributedTo,
                    &[Person, Organization],
                    &[AIModel, Technique, Publication, Community],
                    &["contributed to", "contributes to"],
                    0.75,
                ),
                def(
                    SpecializesIn,
                    &[Person, Organization, Community],
                    &[Concept, Technique, Method],
                    &["specializes in", "focuses on"],
                    0.7,
                ),
                def(
                    InfluencedBy,
                    &[AIModel, Technique, Architecture, Concept, Method],
                    &[AIModel, Technique, Architecture, Concept, Method, Person],
                    &["influenced by", "was influenced by", "inspired by"],
                    0.7,
                ),
                def(
                    CollaboratedWith,
                    &[Person, Organization],
                    &[Person, Organization],
                    &["collaborated with", "in collaboration with", "jointly with"],
                    0.75,
                ),
                def(
                    EvolvedInto,
                    &[AIModel, Technique, Architecture],
                    &[AIModel, Technique, Architecture],
                    &["evolved into", "became", "was succeeded by"],
                    0.7,
                ),
                def(
                    CompetesWith,
                    &[AIModel, Organization],
                    &[AIModel, Organization],
                    &["competes with", "rivals", "is a competitor of"],
                    0.7,
                ),
                def(
                    BasedOn,
                    &[AIModel, Technique, Architecture, Method],
                    &[AIModel, Technique, Architecture, Method, Concept],
                    &["based on", "is based on", "builds on"],
                    0.8,
                ),
            ],
            weights: ScoringWeights::default(),
            triage: TriageThresholds::default(),
            similarity: SimilarityThresholds::default(),
            consistency_threshold: 0.7,
            conflicting_pairs: vec![(DevelopedBy, CompetesWith), (EvolvedInto, CompetesWith)],
            cooccurrence_seeds: vec![
                CooccurrenceSeed {
                    source_type: AIModel,
                    target_type: Organization,
                    rel_type: DevelopedBy,
                },
                CooccurrenceSeed {
                    source_type: AIModel,
                    target_type: Technique,
                    rel_type: UsesTechnique,
                },
                CooccurrenceSeed {
                    source_type: AIModel,
                    target_type: Dataset,
                    rel_type: TrainedOn,
                },
                CooccurrenceSeed {
                    source_type: AIModel,
                    target_type: Benchmark,
                    rel_type: EvaluatedOn,
                },
                CooccurrenceSeed {
                    source_type: Person,
                    target_type: Organization,
                    rel_type: AffiliatedWith,
                },
                CooccurrenceSeed {
                    source_type: Publication,
                    target_type: Publication,
                    rel_type: Cites,
                },
            ],
            source_reliability: HashMap::new(),
            max_concurrency: 10,
            max_hops: 6,
            context_window: 150,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        GraphConfig::default().validate().unwrap();
    }

    #[test]
    fn weight_drift_is_fatal() {
        let mut config = GraphConfig::default();
        config.weights.cooccurrence = 0.5; // sum now 1.2
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWeights { .. }));
    }

    #[test]
    fn inverted_triage_is_fatal() {
        let mut config = GraphConfig::default();
        config.triage.review = 0.9;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::ThresholdsInverted { .. }
        ));
    }

    #[test]
    fn conflict_table_must_reference_defined_relations() {
        let mut config = GraphConfig::default();
        config
            .relations
            .retain(|d| d.rel_type != RelationType::CompetesWith);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRelationReference { .. }));
    }

    #[test]
    fn empty_type_set_is_fatal() {
        let mut config = GraphConfig::default();
        config.relations[0].source_types.clear();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::EmptyTypeSet { .. }
        ));
    }

    #[test]
    fn seed_lookup_falls_back_to_cites() {
        let config = GraphConfig::default();
        assert_eq!(
            config.seed_relation(EntityType::AIModel, EntityType::Organization),
            RelationType::DevelopedBy
        );
        assert_eq!(
            config.seed_relation(EntityType::Concept, EntityType::Concept),
            RelationType::Cites
        );
    }

    #[test]
    fn reliability_defaults_to_conservative() {
        let config = GraphConfig::default();
        assert_eq!(
            config.reliability_for(ExtractionMethod::Llm),
            DEFAULT_SOURCE_RELIABILITY
        );

        let mut tuned = GraphConfig::default();
        tuned
            .source_reliability
            .insert(ExtractionMethod::Pattern, 0.9);
        assert_eq!(tuned.reliability_for(ExtractionMethod::Pattern), 0.9);
    }

    #[test]
    fn json_round_trip() {
        let config = GraphConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back = GraphConfig::from_json_str(&json).unwrap();
        assert_eq!(back.relations.len(), config.relations.len());
    }
}
