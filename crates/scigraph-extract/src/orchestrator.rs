//! Extraction orchestrator: per-document pipeline and batch execution
//!
//! One document flows through co-occurrence, pattern, and (optionally) LLM
//! passes; proposals merge by `(source, target, type)` in deterministic
//! order (co-occurrence → pattern → LLM); merged proposals are scored,
//! contradiction-checked, and emitted with a triage status.
//!
//! Batches partition into chunks of at most `max_concurrency` documents;
//! chunk members run concurrently, chunks sequentially, result order is
//! input order. A failing document is captured as a batch error and never
//! aborts its siblings. Statistics count attempts, not just successes.

use crate::contradiction::{Contradiction, ContradictionDetector};
use crate::cooccurrence::CooccurrenceAnalyzer;
use crate::inferrer::{InferenceOutcome, RelationInferrer};
use crate::patterns::PatternMatcher;
use crate::scorer::RelationScorer;
use crate::{ExtractError, RelationProposal};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use scigraph_core::{
    Document, DocumentEntity, Entity, EntityType, Evidence, ExtractionMethod, GraphConfig,
    GraphWriter, Relation, RelationType, ReviewStatus, ScoreComponents, StoreError,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// ============================================================================
// Results and Statistics
// ============================================================================

/// Outcome of extracting one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub document_id: String,
    pub relations: Vec<Relation>,
    pub entities: Vec<DocumentEntity>,
    pub contradictions: Vec<Contradiction>,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// One captured per-document failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    pub document_id: String,
    pub error: String,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<ExtractionResult>,
    pub errors: Vec<BatchError>,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_time_ms: u64,
}

/// Cumulative pipeline statistics. Attempts are counted whether or not they
/// succeed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_processed: usize,
    pub total_failures: usize,
    pub total_relations: usize,
    pub approved: usize,
    pub pending: usize,
    pub rejected: usize,
    pub average_confidence: f64,
}

impl PipelineStats {
    fn record_relations(&mut self, relations: &[Relation]) {
        let old_total = self.total_relations;
        let sum: f64 = relations.iter().map(|r| r.confidence).sum();
        self.total_relations += relations.len();
        if self.total_relations > 0 {
            self.average_confidence = (self.average_confidence * old_total as f64 + sum)
                / self.total_relations as f64;
        }
        for r in relations {
            match r.review_status {
                ReviewStatus::Approved => self.approved += 1,
                ReviewStatus::Pending => self.pending += 1,
                ReviewStatus::Rejected => self.rejected += 1,
                ReviewStatus::Modified => {}
            }
        }
    }
}

/// Events emitted during extraction for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExtractionEvent {
    DocumentProcessed {
        document_id: String,
        relations: usize,
        contradictions: usize,
    },
    DocumentFailed {
        document_id: String,
        error: String,
    },
    BatchCompleted {
        success_count: usize,
        failure_count: usize,
    },
}

type EventHandler = Box<dyn Fn(ExtractionEvent) + Send + Sync>;

// ============================================================================
// Pipeline
// ============================================================================

/// The per-document extraction pipeline plus batch driver.
pub struct ExtractionPipeline {
    config: Arc<GraphConfig>,
    cooccurrence: CooccurrenceAnalyzer,
    patterns: PatternMatcher,
    inferrer: Option<Arc<RelationInferrer>>,
    scorer: RelationScorer,
    detector: ContradictionDetector,
    writer: Option<Arc<dyn GraphWriter>>,
    stats: Mutex<PipelineStats>,
    event_handlers: Vec<EventHandler>,
}

impl ExtractionPipeline {
    pub fn new(config: Arc<GraphConfig>) -> Self {
        Self {
            cooccurrence: CooccurrenceAnalyzer::new(config.clone()),
            patterns: PatternMatcher::new(config.clone()),
            inferrer: None,
            scorer: RelationScorer::new(config.clone()),
            detector: ContradictionDetector::new(config.clone()),
            writer: None,
            stats: Mutex::new(PipelineStats::default()),
            event_handlers: Vec::new(),
            config,
        }
    }

    /// Enable the LLM pass.
    pub fn with_inferrer(mut self, inferrer: Arc<RelationInferrer>) -> Self {
        self.inferrer = Some(inferrer);
        self
    }

    /// Enable persistence of results into the graph store.
    pub fn with_writer(mut self, writer: Arc<dyn GraphWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn on_event(&mut self, handler: EventHandler) {
        self.event_handlers.push(handler);
    }

    fn emit(&self, event: ExtractionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.lock().clone()
    }

    /// Run the full pipeline over one document.
    pub async fn extract(&self, doc: &Document) -> Result<ExtractionResult, ExtractError> {
        let start = Instant::now();
        match self.extract_inner(doc).await {
            Ok(mut result) => {
                result.processing_time_ms = start.elapsed().as_millis() as u64;
                {
                    let mut stats = self.stats.lock();
                    stats.total_processed += 1;
                    stats.record_relations(&result.relations);
                }
                self.emit(ExtractionEvent::DocumentProcessed {
                    document_id: result.document_id.clone(),
                    relations: result.relations.len(),
                    contradictions: result.contradictions.len(),
                });
                Ok(result)
            }
            Err(e) => {
                {
                    let mut stats = self.stats.lock();
                    stats.total_processed += 1;
                    stats.total_failures += 1;
                }
                self.emit(ExtractionEvent::DocumentFailed {
                    document_id: doc.id.clone(),
                    error: e.to_string(),
                });
                warn!(document_id = %doc.id, error = %e, "document extraction failed");
                Err(e)
            }
        }
    }

    async fn extract_inner(&self, doc: &Document) -> Result<ExtractionResult, ExtractError> {
        let entities = if doc.entities.is_empty() {
            self.cooccurrence.recognize_entities(&doc.content)
        } else {
            doc.entities.clone()
        };
        let entity_types: HashMap<String, EntityType> = entities
            .iter()
            .map(|e| (e.stable_id().to_string(), e.entity_type))
            .collect();

        // Pass 1: co-occurrence.
        let pairs = self.cooccurrence.analyze_with_entities(doc, &entities);
        let mut proposals = self.cooccurrence.propose(&pairs, &entity_types, &doc.id);

        // Pass 2: patterns.
        proposals.extend(self.patterns.find_in_text(&doc.content, &entities, &doc.id));

        // Pass 3: LLM, concurrent across candidate pairs, admission-
        // controlled by the guarded endpoint.
        if let Some(inferrer) = &self.inferrer {
            proposals.extend(
                self.llm_pass(inferrer, doc, &entities, &pairs).await?,
            );
        }

        debug!(
            document_id = %doc.id,
            proposals = proposals.len(),
            "merging proposals"
        );

        let mut relations = self.merge_and_score(proposals);
        let contradictions = self.detector.apply(&mut relations);

        Ok(ExtractionResult {
            document_id: doc.id.clone(),
            relations,
            entities,
            contradictions,
            processing_time_ms: 0,
            timestamp: Utc::now(),
        })
    }

    async fn llm_pass(
        &self,
        inferrer: &RelationInferrer,
        doc: &Document,
        entities: &[DocumentEntity],
        pairs: &[scigraph_core::CooccurrencePair],
    ) -> Result<Vec<RelationProposal>, ExtractError> {
        let by_id: HashMap<&str, &DocumentEntity> =
            entities.iter().map(|e| (e.stable_id(), e)).collect();

        let candidates: Vec<(&DocumentEntity, &DocumentEntity, String)> = pairs
            .iter()
            .filter_map(|pair| {
                let source = by_id.get(pair.source_id.as_str())?;
                let target = by_id.get(pair.target_id.as_str())?;
                Some((*source, *target, self.context_for(doc, source, target)))
            })
            .collect();

        let calls = candidates
            .iter()
            .map(|(source, target, context)| inferrer.infer(source, target, context));
        let outcomes = futures::future::join_all(calls).await;

        let mut proposals = Vec::new();
        for ((source, target, context), outcome) in candidates.iter().zip(outcomes) {
            match outcome? {
                InferenceOutcome::Proposed(p) => {
                    if !self.direction_allowed(p.rel_type, source, target) {
                        // Try the reverse reading before dropping: the model
                        // sees an unordered pair.
                        if self.direction_allowed(p.rel_type, target, source) {
                            proposals.push(self.llm_proposal(target, source, &p, context, doc));
                        }
                        continue;
                    }
                    proposals.push(self.llm_proposal(source, target, &p, context, doc));
                }
                InferenceOutcome::Skipped { reason } => {
                    debug!(
                        source = %source.name,
                        target = %target.name,
                        reason = %reason,
                        "LLM pass skipped pair"
                    );
                }
            }
        }
        Ok(proposals)
    }

    fn llm_proposal(
        &self,
        source: &DocumentEntity,
        target: &DocumentEntity,
        p: &crate::inferrer::LlmProposal,
        context: &str,
        doc: &Document,
    ) -> RelationProposal {
        RelationProposal {
            source_id: source.stable_id().to_string(),
            target_id: target.stable_id().to_string(),
            rel_type: p.rel_type,
            raw_confidence: p.confidence,
            method: ExtractionMethod::Llm,
            document_id: doc.id.clone(),
            context_snippet: context.to_string(),
        }
    }

    fn direction_allowed(
        &self,
        rel_type: RelationType,
        source: &DocumentEntity,
        target: &DocumentEntity,
    ) -> bool {
        self.config
            .relation_def(rel_type)
            .map(|def| {
                def.source_types.contains(&source.entity_type)
                    && def.target_types.contains(&target.entity_type)
            })
            .unwrap_or(false)
    }

    /// The text window handed to the LLM: the first sentence mentioning both
    /// entities, else a prefix of the document bounded by the configured
    /// window.
    fn context_for(&self, doc: &Document, a: &DocumentEntity, b: &DocumentEntity) -> String {
        let a_lower = a.name.to_lowercase();
        let b_lower = b.name.to_lowercase();
        for sentence in doc.content.split_inclusive(['.', '!', '?']) {
            let lower = sentence.to_lowercase();
            if lower.contains(&a_lower) && lower.contains(&b_lower) {
                return sentence.trim().to_string();
            }
        }
        let mut end = self.config.context_window.min(doc.content.len());
        while end < doc.content.len() && !doc.content.is_char_boundary(end) {
            end += 1;
        }
        doc.content[..end].to_string()
    }

    /// Merge proposals by `(source, target, type)` and score the result.
    ///
    /// Component fabrication: a component backed by concrete evidence gets
    /// that evidence's strongest raw confidence; the LLM slot of a proposal
    /// the model never saw mirrors the textual evidence; the graph-
    /// consistency slot is always the neutral 0.5 at extraction time.
    fn merge_and_score(&self, proposals: Vec<RelationProposal>) -> Vec<Relation> {
        #[derive(Default)]
        struct MergedEntry {
            evidence: Vec<Evidence>,
            methods: BTreeSet<ExtractionMethod>,
            textual_raw: Option<f64>,
            cooc_raw: Option<f64>,
            llm_raw: Option<f64>,
        }

        let mut merged: BTreeMap<(String, String, RelationType), MergedEntry> = BTreeMap::new();
        for p in proposals {
            let entry = merged
                .entry((p.source_id.clone(), p.target_id.clone(), p.rel_type))
                .or_default();
            entry.methods.insert(p.method);
            match p.method {
                ExtractionMethod::Cooccurrence => {
                    entry.cooc_raw = Some(entry.cooc_raw.unwrap_or(0.0).max(p.raw_confidence));
                    entry.textual_raw =
                        Some(entry.textual_raw.unwrap_or(0.0).max(p.raw_confidence));
                }
                ExtractionMethod::Pattern => {
                    entry.textual_raw =
                        Some(entry.textual_raw.unwrap_or(0.0).max(p.raw_confidence));
                }
                ExtractionMethod::Llm | ExtractionMethod::Hybrid => {
                    entry.llm_raw = Some(entry.llm_raw.unwrap_or(0.0).max(p.raw_confidence));
                }
            }
            entry.evidence.push(Evidence {
                document_id: p.document_id,
                context_snippet: p.context_snippet,
                method: p.method,
                raw_confidence: p.raw_confidence,
            });
        }

        merged
            .into_iter()
            .map(|((source, target, rel_type), entry)| {
                let method = if entry.methods.len() > 1 {
                    ExtractionMethod::Hybrid
                } else {
                    entry.methods.iter().next().copied().unwrap_or(ExtractionMethod::Hybrid)
                };
                let source_reliability = entry
                    .methods
                    .iter()
                    .map(|m| self.config.reliability_for(*m))
                    .fold(0.0f64, f64::max);
                let components = ScoreComponents {
                    cooccurrence: entry.textual_raw.unwrap_or(0.5),
                    llm: entry
                        .llm_raw
                        .or(entry.textual_raw)
                        .unwrap_or(0.5),
                    source_reliability,
                    graph_consistency: 0.5,
                };
                let mut relation = Relation {
                    source,
                    target,
                    rel_type,
                    confidence: 0.0,
                    score_components: components,
                    evidence: entry.evidence,
                    review_status: ReviewStatus::Pending,
                    needs_review: false,
                    method,
                };
                self.scorer.score(&mut relation);
                relation
            })
            .collect()
    }

    /// Execute a batch: chunks of at most `max_concurrency` documents run
    /// concurrently, chunks sequentially. Result order is input order.
    pub async fn extract_batch(&self, docs: &[Document]) -> BatchResult {
        let start = Instant::now();
        let mut results = Vec::new();
        let mut errors = Vec::new();

        for chunk in docs.chunks(self.config.max_concurrency.max(1)) {
            let futures: Vec<_> = chunk.iter().map(|d| self.extract(d)).collect();
            let outcomes = futures::future::join_all(futures).await;
            for (doc, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Ok(result) => results.push(result),
                    Err(e) => errors.push(BatchError {
                        document_id: doc.id.clone(),
                        error: e.to_string(),
                    }),
                }
            }
        }

        let batch = BatchResult {
            success_count: results.len(),
            failure_count: errors.len(),
            results,
            errors,
            total_time_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            success = batch.success_count,
            failure = batch.failure_count,
            "batch extraction complete"
        );
        self.emit(ExtractionEvent::BatchCompleted {
            success_count: batch.success_count,
            failure_count: batch.failure_count,
        });
        batch
    }

    /// Persist one extraction result: upsert entities, then every relation
    /// that survived triage. Requires a configured writer.
    pub async fn persist(&self, result: &ExtractionResult) -> Result<(), StoreError> {
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| StoreError::Query("no graph writer configured".into()))?;

        for entity in &result.entities {
            writer
                .upsert_entity(&Entity::new(
                    entity.stable_id(),
                    entity.name.clone(),
                    entity.entity_type,
                ))
                .await?;
        }
        for relation in &result.relations {
            if relation.review_status == ReviewStatus::Rejected {
                continue;
            }
            writer.upsert_relation(relation).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scigraph_core::{ChatModel, GenerationOptions, LlmError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doc(id: &str, content: &str, entities: &[(&str, EntityType)]) -> Document {
        Document {
            id: id.into(),
            title: String::new(),
            content: content.into(),
            source: "test".into(),
            published_at: None,
            entities: entities
                .iter()
                .map(|(n, t)| DocumentEntity::new(*n, *t))
                .collect(),
        }
    }

    fn pipeline() -> ExtractionPipeline {
        ExtractionPipeline::new(Arc::new(GraphConfig::default()))
    }

    #[tokio::test]
    async fn pattern_extraction_end_to_end() {
        let d = doc(
            "doc-1",
            "GPT-4 was developed by OpenAI.",
            &[
                ("GPT-4", EntityType::AIModel),
                ("OpenAI", EntityType::Organization),
            ],
        );
        let result = pipeline().extract(&d).await.unwrap();

        let developed: Vec<&Relation> = result
            .relations
            .iter()
            .filter(|r| r.rel_type == RelationType::DevelopedBy)
            .collect();
        assert_eq!(developed.len(), 1);
        let r = developed[0];
        assert_eq!(r.source, "GPT-4");
        assert_eq!(r.target, "OpenAI");
        assert!(matches!(
            r.method,
            ExtractionMethod::Pattern | ExtractionMethod::Hybrid
        ));
        assert!(r.confidence >= 0.7, "confidence {} too low", r.confidence);
        assert_eq!(r.review_status, ReviewStatus::Approved);
    }

    #[tokio::test]
    async fn confidence_equals_weighted_components() {
        let d = doc(
            "doc-1",
            "GPT-4 was developed by OpenAI.",
            &[
                ("GPT-4", EntityType::AIModel),
                ("OpenAI", EntityType::Organization),
            ],
        );
        let result = pipeline().extract(&d).await.unwrap();
        for r in &result.relations {
            let c = &r.score_components;
            let manual =
                0.3 * c.cooccurrence + 0.3 * c.llm + 0.2 * c.source_reliability
                    + 0.2 * c.graph_consistency;
            assert!((r.confidence - manual).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn empty_document_yields_no_relations() {
        let d = doc("doc-1", "", &[]);
        let result = pipeline().extract(&d).await.unwrap();
        assert!(result.relations.is_empty());
    }

    #[tokio::test]
    async fn merge_is_commutative_in_keys_and_hybrid_iff_multi_method() {
        let p = pipeline();
        let a = RelationProposal {
            source_id: "x".into(),
            target_id: "y".into(),
            rel_type: RelationType::Cites,
            raw_confidence: 0.4,
            method: ExtractionMethod::Cooccurrence,
            document_id: "d".into(),
            context_snippet: "s1".into(),
        };
        let b = RelationProposal {
            method: ExtractionMethod::Pattern,
            raw_confidence: 0.7,
            context_snippet: "s2".into(),
            ..a.clone()
        };
        let c = RelationProposal {
            source_id: "x".into(),
            target_id: "z".into(),
            rel_type: RelationType::Cites,
            raw_confidence: 0.6,
            method: ExtractionMethod::Pattern,
            document_id: "d".into(),
            context_snippet: "s3".into(),
        };

        let forward = p.merge_and_score(vec![a.clone(), b.clone(), c.clone()]);
        let backward = p.merge_and_score(vec![c, b, a]);

        let keys = |rs: &[Relation]| -> BTreeSet<(String, String, RelationType)> {
            rs.iter().map(|r| r.key()).collect()
        };
        assert_eq!(keys(&forward), keys(&backward));

        let xy = forward
            .iter()
            .find(|r| r.target == "y")
            .expect("merged x→y relation");
        assert_eq!(xy.method, ExtractionMethod::Hybrid);
        assert_eq!(xy.evidence.len(), 2);

        let xz = forward.iter().find(|r| r.target == "z").unwrap();
        assert_eq!(xz.method, ExtractionMethod::Pattern);
    }

    #[tokio::test]
    async fn batch_partial_failure_is_captured() {
        struct FailSecond {
            calls: AtomicUsize,
        }
        #[async_trait]
        impl ChatModel for FailSecond {
            async fn complete(&self, prompt: &str, _: &GenerationOptions) -> Result<String, LlmError> {
                // The middle document mentions "Broken"; time out on it.
                if prompt.contains("Broken") {
                    self.calls.fetch_add(1, Ordering::SeqCst);
                    Err(LlmError::Timeout(30))
                } else {
                    Ok("RELATION_TYPE: NONE\nCONFIDENCE: 0.1\nEXPLANATION: -".into())
                }
            }
        }

        let config = Arc::new(GraphConfig::default());
        let inferrer = Arc::new(RelationInferrer::new(
            Arc::new(FailSecond {
                calls: AtomicUsize::new(0),
            }),
            config.clone(),
        ));
        let p = ExtractionPipeline::new(config).with_inferrer(inferrer);

        let entities = [
            ("GPT-4", EntityType::AIModel),
            ("OpenAI", EntityType::Organization),
        ];
        let broken_entities = [
            ("Broken", EntityType::AIModel),
            ("Vendor", EntityType::Organization),
        ];
        let docs = vec![
            doc("doc-1", "GPT-4 was developed by OpenAI.", &entities),
            doc("doc-2", "Broken was developed by Vendor.", &broken_entities),
            doc("doc-3", "OpenAI released GPT-4.", &entities),
        ];

        let batch = p.extract_batch(&docs).await;
        assert_eq!(batch.success_count, 2);
        assert_eq!(batch.failure_count, 1);
        assert_eq!(batch.errors[0].document_id, "doc-2");
        assert_eq!(batch.results.len(), 2);
        assert_eq!(batch.results[0].document_id, "doc-1");
        assert_eq!(batch.results[1].document_id, "doc-3");

        let stats = p.stats();
        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.total_failures, 1);
    }

    #[tokio::test]
    async fn contradiction_scenario_downgrades_to_pending() {
        // Both DEVELOPED_BY and COMPETES_WITH proposed for the same pair.
        let p = pipeline();
        let mk = |rel_type: RelationType, raw: f64| RelationProposal {
            source_id: "a".into(),
            target_id: "b".into(),
            rel_type,
            raw_confidence: raw,
            method: ExtractionMethod::Pattern,
            document_id: "d".into(),
            context_snippet: "ctx".into(),
        };
        let mut relations = p.merge_and_score(vec![
            mk(RelationType::DevelopedBy, 0.9),
            mk(RelationType::CompetesWith, 0.8),
        ]);
        let detector = ContradictionDetector::new(Arc::new(GraphConfig::default()));
        let found = detector.apply(&mut relations);
        assert_eq!(found.len(), 1);
        for r in &relations {
            assert_eq!(r.review_status, ReviewStatus::Pending);
            assert!(r.needs_review);
        }
    }

    #[tokio::test]
    async fn stats_track_triage_counts() {
        let p = pipeline();
        let d = doc(
            "doc-1",
            "GPT-4 was developed by OpenAI.",
            &[
                ("GPT-4", EntityType::AIModel),
                ("OpenAI", EntityType::Organization),
            ],
        );
        p.extract(&d).await.unwrap();
        let stats = p.stats();
        assert_eq!(stats.total_processed, 1);
        assert!(stats.total_relations >= 1);
        assert!(stats.average_confidence > 0.0);
    }

    #[tokio::test]
    async fn persist_writes_entities_and_surviving_relations() {
        use scigraph_store::MemoryGraph;

        let graph = Arc::new(MemoryGraph::new());
        let p = ExtractionPipeline::new(Arc::new(GraphConfig::default()))
            .with_writer(graph.clone());
        let d = doc(
            "doc-1",
            "GPT-4 was developed by OpenAI.",
            &[
                ("GPT-4", EntityType::AIModel),
                ("OpenAI", EntityType::Organization),
            ],
        );
        let result = p.extract(&d).await.unwrap();
        p.persist(&result).await.unwrap();

        assert_eq!(graph.entity_ids(), vec!["GPT-4".to_string(), "OpenAI".to_string()]);
        assert!(graph.relation_count() >= 1);
    }
}
