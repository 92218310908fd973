//! Path explanation: render a discovered path as natural language
//!
//! Deterministic template rendering with per-relation-type verb phrases,
//! direction-aware. An optional LLM polish pass rewrites the rendered
//! rationale for fluency; the template output is always the fallback.

use scigraph_core::{ChatModel, Direction, GenerationOptions, Path, RelationType};
use std::sync::Arc;
use tracing::debug;

/// Verb phrase for a forward traversal of an edge type.
fn forward_phrase(rel_type: RelationType) -> &'static str {
    match rel_type {
        RelationType::DevelopedBy => "was developed by",
        RelationType::TrainedOn => "was trained on",
        RelationType::UsesTechnique => "uses",
        RelationType::EvaluatedOn => "was evaluated on",
        RelationType::Cites => "cites",
        RelationType::AffiliatedWith => "is affiliated with",
        RelationType::ContributedTo => "contributed to",
        RelationType::SpecializesIn => "specializes in",
        RelationType::InfluencedBy => "was influenced by",
        RelationType::CollaboratedWith => "collaborated with",
        RelationType::EvolvedInto => "evolved into",
        RelationType::CompetesWith => "competes with",
        RelationType::BasedOn => "is based on",
    }
}

/// Verb phrase reading an edge against its stored direction.
fn reverse_phrase(rel_type: RelationType) -> &'static str {
    match rel_type {
        RelationType::DevelopedBy => "developed",
        RelationType::TrainedOn => "was used to train",
        RelationType::UsesTechnique => "is used by",
        RelationType::EvaluatedOn => "was used to evaluate",
        RelationType::Cites => "is cited by",
        RelationType::AffiliatedWith => "has affiliate",
        RelationType::ContributedTo => "received contributions from",
        RelationType::SpecializesIn => "is the specialty of",
        RelationType::InfluencedBy => "influenced",
        RelationType::CollaboratedWith => "collaborated with",
        RelationType::EvolvedInto => "evolved from",
        RelationType::CompetesWith => "competes with",
        RelationType::BasedOn => "is the basis of",
    }
}

/// Converts paths into human-readable rationales.
pub struct PathExplainer {
    chat: Option<Arc<dyn ChatModel>>,
}

impl Default for PathExplainer {
    fn default() -> Self {
        Self::new()
    }
}

impl PathExplainer {
    pub fn new() -> Self {
        Self { chat: None }
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatModel>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Deterministic template rendering.
    pub fn explain(&self, path: &Path) -> String {
        if path.nodes.is_empty() {
            return String::new();
        }
        if path.relations.is_empty() {
            return format!("{} is the entity itself.", path.nodes[0].name);
        }

        let mut clauses = Vec::with_capacity(path.relations.len());
        for (i, rel) in path.relations.iter().enumerate() {
            let subject = &path.nodes[i].name;
            let object = &path.nodes[i + 1].name;
            let phrase = match rel.direction {
                Direction::Outgoing => forward_phrase(rel.rel_type),
                Direction::Incoming => reverse_phrase(rel.rel_type),
            };
            if i == 0 {
                clauses.push(format!("{subject} {phrase} {object}"));
            } else {
                clauses.push(format!("which {phrase} {object}"));
            }
        }

        let confidence_note = if path.score >= 0.3 {
            ""
        } else {
            " (weakly supported)"
        };
        format!(
            "{}.{} This connection spans {} hop{}.",
            clauses.join(", "),
            confidence_note,
            path.hops,
            if path.hops == 1 { "" } else { "s" }
        )
    }

    /// Template rendering followed by an optional LLM fluency pass. Any
    /// endpoint trouble falls back to the template output.
    pub async fn explain_fluent(&self, path: &Path) -> String {
        let rendered = self.explain(path);
        let Some(chat) = &self.chat else {
            return rendered;
        };
        let prompt = format!(
            "Rewrite this graph-path rationale as one fluent sentence, \
             keeping every entity name and relationship intact:\n\n{rendered}"
        );
        match chat
            .complete(
                &prompt,
                &GenerationOptions {
                    max_tokens: Some(128),
                    temperature: Some(0.3),
                    stop_sequences: Vec::new(),
                },
            )
            .await
        {
            Ok(polished) if !polished.trim().is_empty() => polished.trim().to_string(),
            Ok(_) => rendered,
            Err(e) => {
                debug!(error = %e, "explanation polish unavailable, using template");
                rendered
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scigraph_core::{Entity, EntityType, PathRelation};

    fn two_hop_path() -> Path {
        Path {
            nodes: vec![
                Entity::new("GPT-4", "GPT-4", EntityType::AIModel),
                Entity::new("Transformer", "Transformer", EntityType::Architecture),
                Entity::new("Attention", "Attention", EntityType::Technique),
            ],
            relations: vec![
                PathRelation {
                    rel_type: RelationType::BasedOn,
                    direction: Direction::Outgoing,
                    confidence: 0.9,
                },
                PathRelation {
                    rel_type: RelationType::InfluencedBy,
                    direction: Direction::Outgoing,
                    confidence: 0.8,
                },
            ],
            hops: 2,
            score: 0.28,
        }
    }

    #[test]
    fn renders_direction_aware_clauses() {
        let explainer = PathExplainer::new();
        let text = explainer.explain(&two_hop_path());
        assert!(text.contains("GPT-4 is based on Transformer"));
        assert!(text.contains("which was influenced by Attention"));
        assert!(text.contains("2 hops"));
    }

    #[test]
    fn incoming_edges_read_reversed() {
        let mut path = two_hop_path();
        path.relations[0].direction = Direction::Incoming;
        let text = PathExplainer::new().explain(&path);
        assert!(text.contains("GPT-4 is the basis of Transformer"));
    }

    #[test]
    fn trivial_path_renders() {
        let path = Path {
            nodes: vec![Entity::new("BERT", "BERT", EntityType::AIModel)],
            relations: vec![],
            hops: 0,
            score: 1.0,
        };
        let text = PathExplainer::new().explain(&path);
        assert!(text.contains("BERT"));
    }

    #[test]
    fn weak_paths_are_flagged() {
        let mut path = two_hop_path();
        path.score = 0.05;
        let text = PathExplainer::new().explain(&path);
        assert!(text.contains("weakly supported"));
    }
}
