//! Integration tests for the complete scigraph pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Document → Extraction → Scored relations → Graph store
//! - Surface form → Normalizer → Alias table
//! - Graph → Path finder → Explainer / Cache
//! - Claim → Consistency checker
//!
//! Run with: cargo test --test integration_tests

use std::sync::Arc;

use scigraph_core::{
    Document, DocumentEntity, EntityType, ExtractionMethod, GraphConfig, RelationType,
    ReviewStatus,
};
use scigraph_extract::ExtractionPipeline;
use scigraph_normalize::{NormalizeOptions, Normalizer};
use scigraph_reason::{ConsistencyChecker, PathCache, PathExplainer, PathFinder, PathQuery};
use scigraph_store::MemoryGraph;

fn doc(id: &str, content: &str, entities: &[(&str, EntityType)]) -> Document {
    Document {
        id: id.into(),
        title: format!("title of {id}"),
        content: content.into(),
        source: "arxiv".into(),
        published_at: None,
        entities: entities
            .iter()
            .map(|(n, t)| DocumentEntity::new(*n, *t))
            .collect(),
    }
}

// ============================================================================
// Extraction → Persistence → Retrieval
// ============================================================================

#[tokio::test]
async fn test_extract_persist_and_find_paths() {
    let config = Arc::new(GraphConfig::default());
    let graph = Arc::new(MemoryGraph::new());
    let pipeline = ExtractionPipeline::new(config.clone()).with_writer(graph.clone());

    let docs = vec![
        doc(
            "paper-1",
            "GPT-4 is based on the Transformer.",
            &[
                ("GPT-4", EntityType::AIModel),
                ("Transformer", EntityType::Architecture),
            ],
        ),
        doc(
            "paper-2",
            "The Transformer was influenced by Attention.",
            &[
                ("Transformer", EntityType::Architecture),
                ("Attention", EntityType::Technique),
            ],
        ),
    ];

    let batch = pipeline.extract_batch(&docs).await;
    assert_eq!(batch.success_count, 2);
    assert_eq!(batch.failure_count, 0);
    for result in &batch.results {
        pipeline.persist(result).await.unwrap();
    }

    // The pattern-extracted edges are now queryable as a 2-hop path.
    let finder = PathFinder::new(graph.clone());
    let path = finder
        .find_shortest_path("GPT-4", "Attention", &PathQuery::with_max_hops(4))
        .await
        .unwrap()
        .expect("2-hop path through Transformer");
    assert_eq!(path.hops, 2);
    let names: Vec<&str> = path.nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["GPT-4", "Transformer", "Attention"]);

    let rationale = PathExplainer::new().explain(&path);
    assert!(rationale.contains("GPT-4"));
    assert!(rationale.contains("Attention"));
}

#[tokio::test]
async fn test_extraction_scenario_pattern_confidence() {
    let pipeline = ExtractionPipeline::new(Arc::new(GraphConfig::default()));
    let result = pipeline
        .extract(&doc(
            "paper-1",
            "GPT-4 was developed by OpenAI.",
            &[
                ("GPT-4", EntityType::AIModel),
                ("OpenAI", EntityType::Organization),
            ],
        ))
        .await
        .unwrap();

    let relation = result
        .relations
        .iter()
        .find(|r| r.rel_type == RelationType::DevelopedBy)
        .expect("DEVELOPED_BY extracted");
    assert_eq!(relation.source, "GPT-4");
    assert_eq!(relation.target, "OpenAI");
    assert!(matches!(
        relation.method,
        ExtractionMethod::Pattern | ExtractionMethod::Hybrid
    ));
    assert!(relation.confidence >= 0.7);
    assert_eq!(relation.review_status, ReviewStatus::Approved);

    // The fused confidence reconstructs from its components.
    let c = &relation.score_components;
    let manual = 0.3 * c.cooccurrence + 0.3 * c.llm + 0.2 * c.source_reliability
        + 0.2 * c.graph_consistency;
    assert!((relation.confidence - manual).abs() < 1e-6);
}

// ============================================================================
// Normalization against the stored graph
// ============================================================================

#[tokio::test]
async fn test_normalization_cascade_against_stored_graph() {
    let graph = Arc::new(MemoryGraph::new());
    graph
        .seed_entity("GPT-4", "GPT-4", EntityType::AIModel)
        .await
        .unwrap();

    let normalizer = Normalizer::new(Arc::new(GraphConfig::default())).with_graph(graph.clone());
    let result = normalizer
        .normalize("GPT 4", &NormalizeOptions::default())
        .await
        .unwrap();

    assert!(result.was_normalized);
    assert_eq!(result.normalized, "GPT-4");
    assert!(result.confidence >= 0.85);
    assert!(result.alias_registered);

    // The registered alias makes the second resolution at least as
    // confident as the first.
    let again = normalizer
        .normalize("GPT 4", &NormalizeOptions::default())
        .await
        .unwrap();
    assert_eq!(again.normalized, "GPT-4");
    assert!(again.confidence >= result.confidence);
}

// ============================================================================
// Consistency checking against extracted facts
// ============================================================================

#[tokio::test]
async fn test_claim_validation_round_trip() {
    let config = Arc::new(GraphConfig::default());
    let graph = Arc::new(MemoryGraph::new());
    let pipeline = ExtractionPipeline::new(config.clone()).with_writer(graph.clone());

    let result = pipeline
        .extract(&doc(
            "paper-1",
            "GPT-4 was developed by OpenAI.",
            &[
                ("GPT-4", EntityType::AIModel),
                ("OpenAI", EntityType::Organization),
            ],
        ))
        .await
        .unwrap();
    pipeline.persist(&result).await.unwrap();

    let checker = ConsistencyChecker::new(graph.clone(), config.clone());
    let claims = checker.extract_claims("GPT-4 was developed by OpenAI.").await;
    assert!(!claims.is_empty());

    // Enrich the segmenter's claim with the asserted relation, as a
    // generated-text validator would.
    let mut claim = claims[0].clone();
    claim.source_entity_id = Some("GPT-4".into());
    claim.target_entity_id = Some("OpenAI".into());
    claim.relation_type = Some(RelationType::DevelopedBy);

    let verdict = checker.check(&claim).await.unwrap();
    assert!(verdict.is_consistent);
    assert!(verdict.score >= 0.7);

    // The same claim against a graph with the wrong edge type flips.
    let wrong_graph = Arc::new(MemoryGraph::new());
    wrong_graph
        .seed_entity("GPT-4", "GPT-4", EntityType::AIModel)
        .await
        .unwrap();
    wrong_graph
        .seed_entity("OpenAI", "OpenAI", EntityType::Organization)
        .await
        .unwrap();
    wrong_graph
        .seed_relation("GPT-4", RelationType::UsesTechnique, "OpenAI", 0.9)
        .await
        .unwrap();
    let wrong_checker = ConsistencyChecker::new(wrong_graph, config);
    let verdict = wrong_checker.check(&claim).await.unwrap();
    assert!(!verdict.is_consistent);
    assert!(verdict
        .contradicting_evidence
        .iter()
        .any(|e| e.kind == scigraph_core::EvidenceKind::WrongRelation));
}

// ============================================================================
// Path cache over live queries
// ============================================================================

#[tokio::test]
async fn test_path_cache_hits_match_recomputation() {
    use std::time::Duration;

    let graph = Arc::new(MemoryGraph::new());
    graph
        .seed_entity("a", "A", EntityType::Concept)
        .await
        .unwrap();
    graph
        .seed_entity("b", "B", EntityType::Concept)
        .await
        .unwrap();
    graph
        .seed_relation("a", RelationType::Cites, "b", 0.9)
        .await
        .unwrap();

    let finder = PathFinder::new(graph.clone());
    let cache = PathCache::new(16, Duration::from_secs(60));
    let query = PathQuery::default();

    let fresh = finder.find_paths("a", "b", &query).await.unwrap();
    cache.put("a", "b", &query, fresh.clone());

    let cached = cache.get("a", "b", &query).expect("cache hit");
    let recomputed = finder.find_paths("a", "b", &query).await.unwrap();
    assert_eq!(cached.paths.len(), recomputed.paths.len());
    assert_eq!(cached.paths[0].hops, recomputed.paths[0].hops);
    assert_eq!(cached.paths[0].score, recomputed.paths[0].score);

    // A mutation touching "b" drops the entry.
    cache.invalidate_entity("b");
    assert!(cache.get("a", "b", &query).is_none());
}

// ============================================================================
// Configuration gates the whole pipeline
// ============================================================================

#[test]
fn test_invalid_configuration_fails_closed() {
    let mut config = GraphConfig::default();
    config.weights.llm = 0.9; // sum now > 1
    assert!(config.validate().is_err());

    let json = serde_json::to_string(&config).unwrap();
    assert!(GraphConfig::from_json_str(&json).is_err());
}
