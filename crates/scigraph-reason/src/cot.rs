//! Chain-of-thought reasoning over retrieved subgraphs
//!
//! A bounded subgraph is retrieved around seed entities (given explicitly,
//! found by name overlap with the question, or located through vector
//! search when an embedding service and vector store are wired). The model
//! is then prompted one step at a time; every step must cite node/edge ids
//! from the subgraph. Iteration stops on an explicit conclusion, on the
//! step budget, or when step confidence falls below the floor. Overall
//! confidence is the minimum step confidence.

use crate::ReasonError;
use scigraph_core::{
    ChatModel, Direction, Entity, GenerationOptions, GraphReader, LlmError, Relation,
};
use scigraph_store::{EmbeddingService, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Step confidence below which iteration stops.
const CONFIDENCE_FLOOR: f64 = 0.3;
/// Subgraph retrieval bounds.
const SUBGRAPH_HOPS: usize = 2;
const SUBGRAPH_EDGE_CAP: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub index: usize,
    pub statement: String,
    /// Node/edge ids cited as evidence.
    pub evidence_ids: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningOutcome {
    pub steps: Vec<ReasoningStep>,
    pub conclusion: String,
    pub confidence: f64,
    pub total_time_ms: u64,
}

/// Options for one reasoning run.
#[derive(Debug, Clone)]
pub struct ReasoningOptions {
    pub entity_ids: Vec<String>,
    pub max_steps: usize,
}

impl Default for ReasoningOptions {
    fn default() -> Self {
        Self {
            entity_ids: Vec::new(),
            max_steps: 5,
        }
    }
}

struct Subgraph {
    entities: BTreeMap<String, Entity>,
    relations: Vec<Relation>,
}

impl Subgraph {
    fn render(&self) -> String {
        let mut lines = Vec::new();
        for entity in self.entities.values() {
            lines.push(format!(
                "node {} [{}]: {}",
                entity.id, entity.entity_type, entity.name
            ));
        }
        for (i, r) in self.relations.iter().enumerate() {
            lines.push(format!(
                "edge e{}: {} -{}-> {} (confidence {:.2})",
                i, r.source, r.rel_type, r.target, r.confidence
            ));
        }
        lines.join("\n")
    }
}

/// Stepwise reasoner over a [`GraphReader`] and a chat endpoint.
pub struct CotReasoner {
    graph: Arc<dyn GraphReader>,
    chat: Arc<dyn ChatModel>,
    embeddings: Option<Arc<EmbeddingService>>,
    vectors: Option<Arc<VectorStore>>,
}

impl CotReasoner {
    pub fn new(graph: Arc<dyn GraphReader>, chat: Arc<dyn ChatModel>) -> Self {
        Self {
            graph,
            chat,
            embeddings: None,
            vectors: None,
        }
    }

    /// Wire vector search for seeding when no entity ids are given.
    pub fn with_vector_search(
        mut self,
        embeddings: Arc<EmbeddingService>,
        vectors: Arc<VectorStore>,
    ) -> Self {
        self.embeddings = Some(embeddings);
        self.vectors = Some(vectors);
        self
    }

    pub async fn reason(
        &self,
        question: &str,
        opts: &ReasoningOptions,
    ) -> Result<ReasoningOutcome, ReasonError> {
        let start = Instant::now();

        let seeds = self.resolve_seeds(question, opts).await?;
        let subgraph = self.retrieve_subgraph(&seeds).await?;
        let facts = subgraph.render();
        debug!(
            seeds = seeds.len(),
            nodes = subgraph.entities.len(),
            edges = subgraph.relations.len(),
            "subgraph retrieved"
        );

        let mut steps: Vec<ReasoningStep> = Vec::new();
        let mut conclusion = String::new();

        while steps.len() < opts.max_steps {
            let prompt = self.step_prompt(question, &facts, &steps);
            let reply = self
                .chat
                .complete(
                    &prompt,
                    &GenerationOptions {
                        max_tokens: Some(256),
                        temperature: Some(0.2),
                        stop_sequences: Vec::new(),
                    },
                )
                .await?;

            match parse_step_reply(&reply, steps.len() + 1) {
                StepReply::Step(step) => {
                    let confidence = step.confidence;
                    steps.push(step);
                    if confidence < CONFIDENCE_FLOOR {
                        debug!(confidence, "step confidence below floor, stopping");
                        break;
                    }
                }
                StepReply::Conclusion(text) => {
                    conclusion = text;
                    break;
                }
                StepReply::Unparseable => {
                    warn!("unparseable reasoning step, stopping iteration");
                    break;
                }
            }
        }

        if conclusion.is_empty() {
            conclusion = self.synthesize(question, &steps).await?;
        }

        let confidence = steps
            .iter()
            .map(|s| s.confidence)
            .fold(f64::INFINITY, f64::min);
        let confidence = if confidence.is_finite() { confidence } else { 0.0 };

        Ok(ReasoningOutcome {
            steps,
            conclusion,
            confidence,
            total_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn resolve_seeds(
        &self,
        question: &str,
        opts: &ReasoningOptions,
    ) -> Result<Vec<String>, ReasonError> {
        if !opts.entity_ids.is_empty() {
            return Ok(opts.entity_ids.clone());
        }

        // Vector search when wired.
        if let (Some(embeddings), Some(vectors)) = (&self.embeddings, &self.vectors) {
            match self.vector_seeds(embeddings, vectors, question).await {
                Ok(seeds) if !seeds.is_empty() => return Ok(seeds),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "vector seeding unavailable, falling back"),
            }
        }

        // Fallback: canonical names mentioned in the question.
        let lower = question.to_lowercase();
        let names = self.graph.canonical_names(None).await?;
        Ok(names
            .into_iter()
            .filter(|(_, name)| lower.contains(&name.to_lowercase()))
            .map(|(id, _)| id)
            .collect())
    }

    async fn vector_seeds(
        &self,
        embeddings: &EmbeddingService,
        vectors: &VectorStore,
        question: &str,
    ) -> Result<Vec<String>, ReasonError> {
        let vector = embeddings
            .embed(question)
            .await
            .map_err(ReasonError::Llm)?;
        let hits = vectors
            .search(&vector, 5, Some(0.5), None)
            .await
            .map_err(ReasonError::Store)?;
        Ok(hits.into_iter().map(|h| h.id).collect())
    }

    async fn retrieve_subgraph(&self, seeds: &[String]) -> Result<Subgraph, ReasonError> {
        let mut entities = BTreeMap::new();
        let mut relations: Vec<Relation> = Vec::new();
        let mut seen_edges: HashSet<(String, String, String)> = HashSet::new();
        let mut frontier: Vec<String> = Vec::new();

        for seed in seeds {
            if let Some(entity) = self.graph.find_entity(seed).await? {
                frontier.push(entity.id.clone());
                entities.insert(entity.id.clone(), entity);
            }
        }

        for _ in 0..SUBGRAPH_HOPS {
            if relations.len() >= SUBGRAPH_EDGE_CAP {
                break;
            }
            let mut next_frontier = Vec::new();
            for id in &frontier {
                for (relation, direction) in self.graph.neighbors(id).await? {
                    if relations.len() >= SUBGRAPH_EDGE_CAP {
                        break;
                    }
                    let edge_key = (
                        relation.source.clone(),
                        relation.rel_type.as_str().to_string(),
                        relation.target.clone(),
                    );
                    if !seen_edges.insert(edge_key) {
                        continue;
                    }
                    let other = match direction {
                        Direction::Outgoing => relation.target.clone(),
                        Direction::Incoming => relation.source.clone(),
                    };
                    if !entities.contains_key(&other) {
                        if let Some(entity) = self.graph.get_entity(&other).await? {
                            entities.insert(other.clone(), entity);
                            next_frontier.push(other);
                        }
                    }
                    relations.push(relation);
                }
            }
            frontier = next_frontier;
        }

        Ok(Subgraph {
            entities,
            relations,
        })
    }

    fn step_prompt(&self, question: &str, facts: &str, steps: &[ReasoningStep]) -> String {
        let history = if steps.is_empty() {
            String::from("(none yet)")
        } else {
            steps
                .iter()
                .map(|s| format!("{}. {} [{}]", s.index, s.statement, s.evidence_ids.join(", ")))
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "You are reasoning over a knowledge graph, one step at a time.\n\n\
             Question: {question}\n\n\
             Graph facts:\n{facts}\n\n\
             Steps so far:\n{history}\n\n\
             Emit exactly ONE of:\n\
             STEP: <one new inference> | EVIDENCE: <comma-separated node/edge ids> | CONFIDENCE: <0.0-1.0>\n\
             CONCLUSION: <final answer once no further steps are needed>"
        )
    }

    async fn synthesize(
        &self,
        question: &str,
        steps: &[ReasoningStep],
    ) -> Result<String, ReasonError> {
        if steps.is_empty() {
            return Ok(String::from(
                "No supported reasoning steps could be derived from the graph.",
            ));
        }
        let listing: Vec<String> = steps
            .iter()
            .map(|s| format!("{}. {}", s.index, s.statement))
            .collect();
        let prompt = format!(
            "Question: {question}\n\nReasoning steps:\n{}\n\n\
             Synthesize a single concluding answer grounded only in these steps.",
            listing.join("\n")
        );
        match self
            .chat
            .complete(
                &prompt,
                &GenerationOptions {
                    max_tokens: Some(256),
                    temperature: Some(0.2),
                    stop_sequences: Vec::new(),
                },
            )
            .await
        {
            Ok(text) => Ok(text.trim().to_string()),
            Err(LlmError::AdmissionRejected | LlmError::CircuitOpen) => {
                // Degrade to the last step as the conclusion.
                Ok(steps.last().map(|s| s.statement.clone()).unwrap_or_default())
            }
            Err(e) => Err(ReasonError::Llm(e)),
        }
    }
}

enum StepReply {
    Step(ReasoningStep),
    Conclusion(String),
    Unparseable,
}

fn parse_step_reply(reply: &str, index: usize) -> StepReply {
    for line in reply.lines() {
        let line = line.trim();
        if let Some(rest) = label(line, "CONCLUSION:") {
            return StepReply::Conclusion(rest.to_string());
        }
        if let Some(rest) = label(line, "STEP:") {
            let mut statement = rest.to_string();
            let mut evidence_ids = Vec::new();
            let mut confidence = 0.5;
            if let Some((head, tail)) = statement.split_once("| EVIDENCE:") {
                let head = head.trim().to_string();
                let (evidence_part, conf_part) = match tail.split_once("| CONFIDENCE:") {
                    Some((e, c)) => (e.trim().to_string(), c.trim().to_string()),
                    None => (tail.trim().to_string(), String::new()),
                };
                evidence_ids = evidence_part
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if let Ok(c) = conf_part.parse::<f64>() {
                    confidence = c.clamp(0.0, 1.0);
                }
                statement = head;
            }
            return StepReply::Step(ReasoningStep {
                index,
                statement,
                evidence_ids,
                confidence,
            });
        }
    }
    StepReply::Unparseable
}

fn label<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(line[prefix.len()..].trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use scigraph_core::{EntityType, RelationType};
    use scigraph_store::MemoryGraph;

    async fn seeded() -> Arc<MemoryGraph> {
        let g = Arc::new(MemoryGraph::new());
        g.seed_entity("GPT-4", "GPT-4", EntityType::AIModel).await.unwrap();
        g.seed_entity("Transformer", "Transformer", EntityType::Architecture)
            .await
            .unwrap();
        g.seed_relation("GPT-4", RelationType::BasedOn, "Transformer", 0.9)
            .await
            .unwrap();
        g
    }

    /// Scripted chat: emits one step, then a conclusion.
    struct ScriptedChat {
        replies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        async fn complete(&self, _: &str, _: &GenerationOptions) -> Result<String, LlmError> {
            let mut replies = self.replies.lock();
            if replies.is_empty() {
                Ok("CONCLUSION: done".into())
            } else {
                Ok(replies.remove(0))
            }
        }
    }

    #[tokio::test]
    async fn steps_then_conclusion() {
        let chat = ScriptedChat {
            replies: Mutex::new(vec![
                "STEP: GPT-4 is based on the Transformer | EVIDENCE: e0 | CONFIDENCE: 0.9".into(),
                "CONCLUSION: GPT-4 derives from the Transformer architecture.".into(),
            ]),
        };
        let reasoner = CotReasoner::new(seeded().await, Arc::new(chat));
        let outcome = reasoner
            .reason(
                "How does GPT-4 relate to the Transformer?",
                &ReasoningOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.steps[0].evidence_ids, vec!["e0"]);
        assert_eq!(outcome.confidence, 0.9);
        assert!(outcome.conclusion.contains("Transformer"));
    }

    #[tokio::test]
    async fn max_steps_bounds_iteration() {
        let step = "STEP: another inference | EVIDENCE: e0 | CONFIDENCE: 0.8".to_string();
        let chat = ScriptedChat {
            replies: Mutex::new(vec![step.clone(); 10]),
        };
        let reasoner = CotReasoner::new(seeded().await, Arc::new(chat));
        let opts = ReasoningOptions {
            max_steps: 3,
            ..Default::default()
        };
        let outcome = reasoner.reason("question", &opts).await.unwrap();
        assert_eq!(outcome.steps.len(), 3);
        // Synthesis ran after the budget was spent.
        assert!(!outcome.conclusion.is_empty());
    }

    #[tokio::test]
    async fn low_confidence_step_stops_iteration() {
        let chat = ScriptedChat {
            replies: Mutex::new(vec![
                "STEP: shaky guess | EVIDENCE: e0 | CONFIDENCE: 0.1".into(),
                "STEP: never reached | EVIDENCE: e0 | CONFIDENCE: 0.9".into(),
            ]),
        };
        let reasoner = CotReasoner::new(seeded().await, Arc::new(chat));
        let outcome = reasoner
            .reason("question", &ReasoningOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.confidence, 0.1);
    }

    #[tokio::test]
    async fn explicit_seed_ids_are_used() {
        let chat = ScriptedChat {
            replies: Mutex::new(vec![]),
        };
        let reasoner = CotReasoner::new(seeded().await, Arc::new(chat));
        let opts = ReasoningOptions {
            entity_ids: vec!["GPT-4".into()],
            max_steps: 2,
        };
        let outcome = reasoner.reason("anything", &opts).await.unwrap();
        assert_eq!(outcome.conclusion, "done");
    }

    #[test]
    fn step_parse_tolerates_missing_fields() {
        match parse_step_reply("STEP: just a statement", 1) {
            StepReply::Step(s) => {
                assert_eq!(s.statement, "just a statement");
                assert!(s.evidence_ids.is_empty());
                assert_eq!(s.confidence, 0.5);
            }
            _ => panic!("expected step"),
        }
        assert!(matches!(
            parse_step_reply("nothing recognizable", 1),
            StepReply::Unparseable
        ));
    }
}
