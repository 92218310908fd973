//! Claim validation against graph facts
//!
//! A claim is checked in three moves: resolve its entities (a missing
//! entity is contradicting evidence), look up the asserted relation (a
//! matching edge supports, a different edge type between the same pair
//! contradicts as `wrong_relation`, no edge contradicts as
//! `missing_relation`), and search for short supporting paths between the
//! involved entities. The score is an affine combination of the three
//! signals, clamped to [0, 1].
//!
//! Claim extraction from free text prefers the chat endpoint when one is
//! wired and always falls back to deterministic sentence segmentation; the
//! fallback never fails.

use crate::paths::{PathFinder, PathQuery};
use crate::ReasonError;
use scigraph_core::{
    ChatModel, ConsistencyEvidence, ConsistencyResult, EvidenceKind, FactClaim,
    GenerationOptions, GraphConfig, GraphReader, LlmError, RelationType,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Hop budget for supporting-path search.
const SUPPORT_HOPS: usize = 2;

/// Score weights: entity presence, relation match, path support.
const W_ENTITIES: f64 = 0.4;
const W_RELATION: f64 = 0.4;
const W_PATHS: f64 = 0.2;

/// A conflict between two claims in the same set.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimConflict {
    pub first_claim_id: String,
    pub second_claim_id: String,
    pub reason: String,
}

/// Validates claims against the stored graph.
pub struct ConsistencyChecker {
    graph: Arc<dyn GraphReader>,
    config: Arc<GraphConfig>,
    chat: Option<Arc<dyn ChatModel>>,
}

impl ConsistencyChecker {
    pub fn new(graph: Arc<dyn GraphReader>, config: Arc<GraphConfig>) -> Self {
        Self {
            graph,
            config,
            chat: None,
        }
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatModel>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Validate one claim.
    pub async fn check(&self, claim: &FactClaim) -> Result<ConsistencyResult, ReasonError> {
        let mut supporting = Vec::new();
        let mut contradicting = Vec::new();
        let mut suggestions = Vec::new();

        // 1. Entity resolution.
        let mut resolved = 0usize;
        let mut involved: Vec<String> = Vec::new();
        for id in &claim.entity_ids {
            match self.graph.find_entity(id).await? {
                Some(entity) => {
                    resolved += 1;
                    involved.push(entity.id);
                }
                None => {
                    contradicting.push(ConsistencyEvidence {
                        kind: EvidenceKind::MissingEntity,
                        detail: format!("entity not in graph: {id}"),
                    });
                    suggestions.push(format!("verify the entity name \"{id}\""));
                }
            }
        }
        let entity_presence = if claim.entity_ids.is_empty() {
            0.5 // claim asserts nothing checkable about entities
        } else {
            resolved as f64 / claim.entity_ids.len() as f64
        };

        // 2. Asserted relation lookup.
        let relation_score = match (&claim.source_entity_id, &claim.target_entity_id, claim.relation_type) {
            (Some(source), Some(target), Some(rel_type)) => {
                self.check_relation(source, target, rel_type, &mut supporting, &mut contradicting, &mut suggestions)
                    .await?
            }
            _ => 0.5, // nothing asserted; neutral
        };

        // 3. Supporting paths within a small hop budget.
        let path_score = self
            .path_support(&involved, &mut supporting)
            .await
            .unwrap_or(0.0);

        let score = (W_ENTITIES * entity_presence + W_RELATION * relation_score
            + W_PATHS * path_score)
            .clamp(0.0, 1.0);
        let is_consistent = score >= self.config.consistency_threshold;

        let explanation = self.explain(claim, score, &supporting, &contradicting);
        debug!(claim = %claim.text, score, is_consistent, "claim checked");

        Ok(ConsistencyResult {
            claim: claim.clone(),
            is_consistent,
            score,
            supporting_evidence: supporting,
            contradicting_evidence: contradicting,
            suggestions,
            explanation,
        })
    }

    /// Validate a claim set; each claim is independent.
    pub async fn check_all(
        &self,
        claims: &[FactClaim],
    ) -> Result<Vec<ConsistencyResult>, ReasonError> {
        let mut results = Vec::with_capacity(claims.len());
        for claim in claims {
            results.push(self.check(claim).await?);
        }
        Ok(results)
    }

    /// Detect inconsistency across a claim set: two claims asserting
    /// conflicting relation types (or both directions of an asymmetric
    /// type) for the same entity pair.
    pub fn cross_check(&self, claims: &[FactClaim]) -> Vec<ClaimConflict> {
        let asserted: Vec<(&FactClaim, &String, &String, RelationType)> = claims
            .iter()
            .filter_map(|c| {
                match (&c.source_entity_id, &c.target_entity_id, c.relation_type) {
                    (Some(s), Some(t), Some(r)) => Some((c, s, t, r)),
                    _ => None,
                }
            })
            .collect();

        let mut conflicts = Vec::new();
        for i in 0..asserted.len() {
            for j in (i + 1)..asserted.len() {
                let (ca, sa, ta, ra) = asserted[i];
                let (cb, sb, tb, rb) = asserted[j];

                if sa == sb && ta == tb && self.config.conflicts_with(ra, rb) {
                    conflicts.push(ClaimConflict {
                        first_claim_id: ca.id.clone(),
                        second_claim_id: cb.id.clone(),
                        reason: format!("{ra} conflicts with {rb} for the same pair"),
                    });
                }
                let asymmetric = self
                    .config
                    .relation_def(ra)
                    .map(|d| !d.bidirectional)
                    .unwrap_or(false);
                if ra == rb && asymmetric && sa == tb && ta == sb {
                    conflicts.push(ClaimConflict {
                        first_claim_id: ca.id.clone(),
                        second_claim_id: cb.id.clone(),
                        reason: format!("{ra} asserted in both directions"),
                    });
                }
            }
        }
        conflicts
    }

    async fn check_relation(
        &self,
        source: &str,
        target: &str,
        rel_type: RelationType,
        supporting: &mut Vec<ConsistencyEvidence>,
        contradicting: &mut Vec<ConsistencyEvidence>,
        suggestions: &mut Vec<String>,
    ) -> Result<f64, ReasonError> {
        let Some(source_entity) = self.graph.find_entity(source).await? else {
            return Ok(0.0);
        };
        let Some(target_entity) = self.graph.find_entity(target).await? else {
            return Ok(0.0);
        };

        let edges = self.graph.outgoing(&source_entity.id).await?;
        let to_target: Vec<_> = edges
            .iter()
            .filter(|r| r.target == target_entity.id)
            .collect();

        if let Some(matched) = to_target.iter().find(|r| r.rel_type == rel_type) {
            supporting.push(ConsistencyEvidence {
                kind: EvidenceKind::MatchedEdge,
                detail: format!(
                    "{} -{}-> {} (confidence {:.2})",
                    matched.source, matched.rel_type, matched.target, matched.confidence
                ),
            });
            return Ok(1.0);
        }
        if let Some(other) = to_target.first() {
            contradicting.push(ConsistencyEvidence {
                kind: EvidenceKind::WrongRelation,
                detail: format!(
                    "graph has {} -{}-> {}, not {}",
                    other.source, other.rel_type, other.target, rel_type
                ),
            });
            suggestions.push(format!(
                "the stored relation between {} and {} is {}",
                source_entity.name, target_entity.name, other.rel_type
            ));
            return Ok(0.0);
        }
        contradicting.push(ConsistencyEvidence {
            kind: EvidenceKind::MissingRelation,
            detail: format!(
                "no {} edge from {} to {}",
                rel_type, source_entity.name, target_entity.name
            ),
        });
        Ok(0.0)
    }

    async fn path_support(
        &self,
        involved: &[String],
        supporting: &mut Vec<ConsistencyEvidence>,
    ) -> Result<f64, ReasonError> {
        if involved.len() < 2 {
            return Ok(0.0);
        }
        let finder = PathFinder::new(self.graph.clone());
        let query = PathQuery {
            max_hops: SUPPORT_HOPS,
            relation_types: None,
            max_paths: 3,
        };
        let mut found = 0usize;
        for pair in involved.windows(2) {
            let result = finder.find_paths(&pair[0], &pair[1], &query).await?;
            for path in &result.paths {
                found += 1;
                supporting.push(ConsistencyEvidence {
                    kind: EvidenceKind::SupportingPath,
                    detail: format!(
                        "{}-hop path: {}",
                        path.hops,
                        path.nodes
                            .iter()
                            .map(|n| n.name.as_str())
                            .collect::<Vec<_>>()
                            .join(" -> ")
                    ),
                });
            }
        }
        Ok(if found > 0 { 1.0 } else { 0.0 })
    }

    fn explain(
        &self,
        claim: &FactClaim,
        score: f64,
        supporting: &[ConsistencyEvidence],
        contradicting: &[ConsistencyEvidence],
    ) -> String {
        format!(
            "Claim \"{}\" scored {:.2}: {} supporting, {} contradicting piece(s) of graph evidence.",
            claim.text,
            score,
            supporting.len(),
            contradicting.len()
        )
    }

    // ========================================================================
    // Claim Extraction
    // ========================================================================

    /// Extract claims from free text. The LLM path is optional; the
    /// deterministic fallback always returns at least one claim for
    /// non-empty text.
    pub async fn extract_claims(&self, text: &str) -> Vec<FactClaim> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        if let Some(chat) = &self.chat {
            match self.llm_claims(chat.as_ref(), text).await {
                Ok(claims) if !claims.is_empty() => return claims,
                Ok(_) => {}
                Err(e) => warn!(error = %e, "LLM claim extraction failed, using segmenter"),
            }
        }
        segment_claims(text)
    }

    async fn llm_claims(
        &self,
        chat: &dyn ChatModel,
        text: &str,
    ) -> Result<Vec<FactClaim>, LlmError> {
        let prompt = format!(
            "Extract factual claims from this text. For each claim emit one line:\n\
             CLAIM: <claim text> | ENTITIES: <comma-separated names> | RELATION: <type or NONE> \
             | SOURCE: <name or NONE> | TARGET: <name or NONE>\n\n\
             Allowed relation types: {}\n\nText:\n{text}",
            RelationType::vocabulary()
        );
        let reply = chat
            .complete(
                &prompt,
                &GenerationOptions {
                    max_tokens: Some(512),
                    temperature: Some(0.1),
                    stop_sequences: Vec::new(),
                },
            )
            .await?;

        let mut claims = Vec::new();
        for line in reply.lines() {
            let line = line.trim();
            let Some(rest) = line.strip_prefix("CLAIM:") else {
                continue;
            };
            let mut fields = rest.split('|');
            let text = fields.next().unwrap_or_default().trim().to_string();
            if text.is_empty() {
                continue;
            }
            let mut entity_ids = Vec::new();
            let mut relation_type = None;
            let mut source = None;
            let mut target = None;
            for field in fields {
                let field = field.trim();
                if let Some(v) = field.strip_prefix("ENTITIES:") {
                    entity_ids = v
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                } else if let Some(v) = field.strip_prefix("RELATION:") {
                    relation_type = RelationType::from_str(v.trim()).ok();
                } else if let Some(v) = field.strip_prefix("SOURCE:") {
                    let v = v.trim();
                    if !v.eq_ignore_ascii_case("none") {
                        source = Some(v.to_string());
                    }
                } else if let Some(v) = field.strip_prefix("TARGET:") {
                    let v = v.trim();
                    if !v.eq_ignore_ascii_case("none") {
                        target = Some(v.to_string());
                    }
                }
            }
            claims.push(FactClaim {
                id: Uuid::new_v4().to_string(),
                text,
                entity_ids,
                source_entity_id: source,
                target_entity_id: target,
                relation_type,
                confidence: None,
            });
        }
        Ok(claims)
    }
}

/// Deterministic fallback: sentence segmentation plus capitalized-surface
/// extraction. Always returns at least one claim for non-empty text.
pub fn segment_claims(text: &str) -> Vec<FactClaim> {
    let mut claims = Vec::new();
    for sentence in text.split_inclusive(['.', '!', '?']) {
        let sentence = sentence.trim();
        if sentence.len() < 3 {
            continue;
        }
        let entities = capitalized_surfaces(sentence);
        claims.push(FactClaim {
            id: Uuid::new_v4().to_string(),
            text: sentence.trim_end_matches(['.', '!', '?']).to_string(),
            entity_ids: entities,
            source_entity_id: None,
            target_entity_id: None,
            relation_type: None,
            confidence: None,
        });
    }
    if claims.is_empty() {
        claims.push(FactClaim {
            id: Uuid::new_v4().to_string(),
            text: text.trim().to_string(),
            entity_ids: capitalized_surfaces(text),
            source_entity_id: None,
            target_entity_id: None,
            relation_type: None,
            confidence: None,
        });
    }
    claims
}

/// Capitalized tokens and runs, skipping the sentence-initial word unless
/// it continues into a multi-word name.
fn capitalized_surfaces(sentence: &str) -> Vec<String> {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    let mut surfaces: Vec<String> = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    for (i, word) in words.iter().enumerate() {
        let cleaned = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '-');
        let capitalized = cleaned
            .chars()
            .next()
            .map(|c| c.is_uppercase())
            .unwrap_or(false);
        if capitalized && !(i == 0 && run.is_empty() && words.len() > 1 && !is_all_caps(cleaned)) {
            run.push(cleaned);
        } else {
            if run.len() >= 1 && !run.is_empty() {
                surfaces.push(run.join(" "));
            }
            run.clear();
            if capitalized && is_all_caps(cleaned) {
                surfaces.push(cleaned.to_string());
            }
        }
    }
    if !run.is_empty() {
        surfaces.push(run.join(" "));
    }
    surfaces.retain(|s| s.len() >= 2);
    surfaces.dedup();
    surfaces
}

fn is_all_caps(word: &str) -> bool {
    word.len() >= 2 && word.chars().all(|c| c.is_uppercase() || c.is_ascii_digit() || c == '-')
}
