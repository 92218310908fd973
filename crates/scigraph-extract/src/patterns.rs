//! Typed lexical pattern matching
//!
//! Trigger phrases come from the relation definitions in the configuration
//! snapshot (`"{source} was developed by {target}"` reduces to the trigger
//! `"was developed by"` plus a per-type default confidence). Matching scans
//! a fixed character window around each entity pair; direction follows from
//! which entity precedes the trigger. The matcher never invents entity ids
//! — it only links entities the caller already identified.

use crate::RelationProposal;
use scigraph_core::{Document, DocumentEntity, ExtractionMethod, GraphConfig, RelationType};
use std::sync::Arc;
use tracing::trace;

struct TriggerRule {
    rel_type: RelationType,
    trigger: String,
    confidence: f64,
}

/// Config-driven trigger matcher.
pub struct PatternMatcher {
    config: Arc<GraphConfig>,
    rules: Vec<TriggerRule>,
    window: usize,
}

impl PatternMatcher {
    pub fn new(config: Arc<GraphConfig>) -> Self {
        let rules = config
            .relations
            .iter()
            .filter(|def| def.extractable)
            .flat_map(|def| {
                def.patterns.iter().map(|p| TriggerRule {
                    rel_type: def.rel_type,
                    trigger: p.to_lowercase(),
                    confidence: def.default_confidence,
                })
            })
            .collect();
        let window = config.context_window;
        Self {
            config,
            rules,
            window,
        }
    }

    /// Scan a document for trigger-phrase matches between known entities.
    pub fn find_matches(&self, doc: &Document) -> Vec<RelationProposal> {
        self.find_in_text(&doc.content, &doc.entities, &doc.id)
    }

    /// Scan arbitrary text with caller-supplied entities.
    pub fn find_in_text(
        &self,
        text: &str,
        entities: &[DocumentEntity],
        document_id: &str,
    ) -> Vec<RelationProposal> {
        let lower = text.to_lowercase();
        let occurrences = locate_entities(&lower, entities);
        let mut proposals = Vec::new();

        for i in 0..occurrences.len() {
            for j in 0..occurrences.len() {
                if i == j {
                    continue;
                }
                let (first, second) = (&occurrences[i], &occurrences[j]);
                // Only consider ordered pairs where `first` precedes
                // `second` within the window.
                if first.start >= second.start || first.end > second.start {
                    // Overlapping surface spans cannot flank a trigger.
                    continue;
                }
                let gap_start = first.end;
                let gap_end = second.start;
                if gap_end.saturating_sub(gap_start) > self.window {
                    continue;
                }
                let between = &lower[gap_start..gap_end];

                for rule in &self.rules {
                    if !between.contains(&rule.trigger) {
                        continue;
                    }
                    // The entity preceding the trigger is the source.
                    let (source, target) = (first, second);
                    if !self.types_allowed(rule.rel_type, source.entity, target.entity) {
                        trace!(
                            rel_type = %rule.rel_type,
                            source = %source.entity.name,
                            target = %target.entity.name,
                            "trigger matched but types disallowed"
                        );
                        continue;
                    }
                    let span_start = first.start;
                    let span_end = second.end.min(text.len());
                    proposals.push(RelationProposal {
                        source_id: source.entity.stable_id().to_string(),
                        target_id: target.entity.stable_id().to_string(),
                        rel_type: rule.rel_type,
                        raw_confidence: rule.confidence,
                        method: ExtractionMethod::Pattern,
                        document_id: document_id.to_string(),
                        context_snippet: snippet(text, span_start, span_end),
                    });
                }
            }
        }

        dedupe_keep_highest(proposals)
    }

    fn types_allowed(
        &self,
        rel_type: RelationType,
        source: &DocumentEntity,
        target: &DocumentEntity,
    ) -> bool {
        match self.config.relation_def(rel_type) {
            Some(def) => {
                def.source_types.contains(&source.entity_type)
                    && def.target_types.contains(&target.entity_type)
            }
            None => false,
        }
    }
}

struct EntityOccurrence<'a> {
    entity: &'a DocumentEntity,
    start: usize,
    end: usize,
}

/// Every occurrence of every entity surface in the (lowercased) text.
fn locate_entities<'a>(
    lower_text: &str,
    entities: &'a [DocumentEntity],
) -> Vec<EntityOccurrence<'a>> {
    let mut occurrences = Vec::new();
    for entity in entities {
        let needle = entity.name.to_lowercase();
        if needle.is_empty() {
            continue;
        }
        let mut from = 0;
        while let Some(found) = lower_text[from..].find(&needle) {
            let start = from + found;
            occurrences.push(EntityOccurrence {
                entity,
                start,
                end: start + needle.len(),
            });
            from = start + needle.len();
        }
    }
    occurrences.sort_by_key(|o| o.start);
    occurrences
}

/// Identical `(source, target, type)` results from different triggers keep
/// only the higher-confidence one.
fn dedupe_keep_highest(proposals: Vec<RelationProposal>) -> Vec<RelationProposal> {
    let mut best: Vec<RelationProposal> = Vec::new();
    for proposal in proposals {
        let position = best.iter().position(|p| {
            p.source_id == proposal.source_id
                && p.target_id == proposal.target_id
                && p.rel_type == proposal.rel_type
        });
        match position {
            Some(idx) => {
                if proposal.raw_confidence > best[idx].raw_confidence {
                    best[idx] = proposal;
                }
            }
            None => best.push(proposal),
        }
    }
    best
}

fn snippet(text: &str, start: usize, end: usize) -> String {
    let clamp = |mut i: usize| {
        while i < text.len() && !text.is_char_boundary(i) {
            i += 1;
        }
        i.min(text.len())
    };
    text[clamp(start)..clamp(end)].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scigraph_core::EntityType;

    fn matcher() -> PatternMatcher {
        PatternMatcher::new(Arc::new(GraphConfig::default()))
    }

    fn doc(content: &str, entities: &[(&str, EntityType)]) -> Document {
        Document {
            id: "doc-1".into(),
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

    #[test]
    fn developed_by_trigger_matches_with_direction() {
        let d = doc(
            "GPT-4 was developed by OpenAI.",
            &[
                ("GPT-4", EntityType::AIModel),
                ("OpenAI", EntityType::Organization),
            ],
        );
        let matches = matcher().find_matches(&d);
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.source_id, "GPT-4");
        assert_eq!(m.target_id, "OpenAI");
        assert_eq!(m.rel_type, RelationType::DevelopedBy);
        assert!(m.raw_confidence >= 0.7);
        assert!(m.context_snippet.contains("developed by"));
    }

    #[test]
    fn type_constraints_reject_implausible_directions() {
        // "OpenAI ... developed by ... GPT-4" would make an Organization the
        // source of DEVELOPED_BY, which the definition forbids.
        let d = doc(
            "OpenAI says the dataset was developed by GPT-4.",
            &[
                ("OpenAI", EntityType::Organization),
                ("GPT-4", EntityType::AIModel),
            ],
        );
        let matches = matcher().find_matches(&d);
        assert!(matches
            .iter()
            .all(|m| !(m.rel_type == RelationType::DevelopedBy && m.source_id == "OpenAI")));
    }

    #[test]
    fn out_of_window_pairs_do_not_match() {
        let filler = "x".repeat(400);
        let content = format!("GPT-4 {filler} was developed by OpenAI.");
        let d = doc(
            &content,
            &[
                ("GPT-4", EntityType::AIModel),
                ("OpenAI", EntityType::Organization),
            ],
        );
        assert!(matcher().find_matches(&d).is_empty());
    }

    #[test]
    fn duplicate_triggers_keep_highest_confidence() {
        let proposals = vec![
            RelationProposal {
                source_id: "a".into(),
                target_id: "b".into(),
                rel_type: RelationType::BasedOn,
                raw_confidence: 0.6,
                method: ExtractionMethod::Pattern,
                document_id: "d".into(),
                context_snippet: "weak".into(),
            },
            RelationProposal {
                source_id: "a".into(),
                target_id: "b".into(),
                rel_type: RelationType::BasedOn,
                raw_confidence: 0.8,
                method: ExtractionMethod::Pattern,
                document_id: "d".into(),
                context_snippet: "strong".into(),
            },
        ];
        let deduped = dedupe_keep_highest(proposals);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].raw_confidence, 0.8);
    }

    #[test]
    fn no_entities_means_no_matches() {
        let d = doc("GPT-4 was developed by OpenAI.", &[]);
        assert!(matcher().find_matches(&d).is_empty());
    }
}
