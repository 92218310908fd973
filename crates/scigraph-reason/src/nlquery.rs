//! Natural-language query service
//!
//! Four stages: intent parsing (LLM when available, deterministic keyword
//! fallback otherwise) → structured query → deterministic Cypher generation
//! → execution. Failures carry the stage that produced them; no partial
//! results are returned.

use scigraph_core::{
    ChatModel, EntityType, GenerationOptions, GraphReader, LlmError, RelationType,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Result cardinality at which the confidence factor saturates.
const EXPECTED_RESULTS: usize = 10;
const DEFAULT_LIMIT: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Search,
    Describe,
    Compare,
    Rank,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub field: String,
    pub value: String,
}

/// The intermediate representation between intent parsing and Cypher
/// generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub query_type: QueryType,
    pub entity_types: Vec<EntityType>,
    pub relation_types: Vec<RelationType>,
    pub filters: Vec<QueryFilter>,
    pub ordering: Option<String>,
    pub limit: usize,
}

/// Which stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStage {
    Intent,
    Generate,
    Execute,
}

#[derive(Debug, thiserror::Error)]
#[error("query failed at {stage:?} stage: {message}")]
pub struct QueryError {
    pub stage: QueryStage,
    pub message: String,
}

impl QueryError {
    fn at(stage: QueryStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Full response for one NL query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub structured_query: StructuredQuery,
    pub graph_query: String,
    pub intent_confidence: f64,
    pub confidence: f64,
    pub results: Vec<serde_json::Value>,
    pub execution_time_ms: u64,
}

/// NL → structured → Cypher → records.
pub struct NlQueryService {
    graph: Arc<dyn GraphReader>,
    chat: Option<Arc<dyn ChatModel>>,
}

impl NlQueryService {
    pub fn new(graph: Arc<dyn GraphReader>) -> Self {
        Self { graph, chat: None }
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatModel>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub async fn query(&self, natural_language: &str) -> Result<QueryResponse, QueryError> {
        let start = Instant::now();

        let (structured, intent_confidence) = self.parse_intent(natural_language).await?;
        let graph_query = generate_cypher(&structured)
            .map_err(|m| QueryError::at(QueryStage::Generate, m))?;
        debug!(query = %graph_query, "generated graph query");

        let results = self
            .graph
            .run_query(&graph_query, serde_json::json!({}))
            .await
            .map_err(|e| QueryError::at(QueryStage::Execute, e.to_string()))?;

        let cardinality_factor =
            (results.len().min(EXPECTED_RESULTS) as f64) / EXPECTED_RESULTS as f64;
        let confidence = intent_confidence * cardinality_factor;

        Ok(QueryResponse {
            structured_query: structured,
            graph_query,
            intent_confidence,
            confidence,
            results,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Stage (i): LLM intent parse with deterministic fallback.
    async fn parse_intent(&self, nl: &str) -> Result<(StructuredQuery, f64), QueryError> {
        if let Some(chat) = &self.chat {
            match self.llm_intent(chat.as_ref(), nl).await {
                Ok(parsed) => return Ok(parsed),
                Err(LlmError::AdmissionRejected | LlmError::CircuitOpen) => {
                    debug!("intent endpoint unavailable, using keyword parse");
                }
                Err(e) => return Err(QueryError::at(QueryStage::Intent, e.to_string())),
            }
        }
        Ok(keyword_intent(nl))
    }

    async fn llm_intent(
        &self,
        chat: &dyn ChatModel,
        nl: &str,
    ) -> Result<(StructuredQuery, f64), LlmError> {
        let prompt = format!(
            "Classify this knowledge-graph question.\n\n\
             Question: {nl}\n\n\
             Entity types: {}\n\
             Relation types: {}\n\n\
             Respond in exactly this format (omit lines that do not apply):\n\
             QUERY_TYPE: search|describe|compare|rank\n\
             ENTITY_TYPES: <comma-separated entity types>\n\
             RELATION_TYPES: <comma-separated relation types>\n\
             FILTER: <field>=<value>\n\
             CONFIDENCE: <0.0-1.0>",
            EntityType::ALL
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            RelationType::vocabulary(),
        );
        let reply = chat
            .complete(
                &prompt,
                &GenerationOptions {
                    max_tokens: Some(128),
                    temperature: Some(0.0),
                    stop_sequences: Vec::new(),
                },
            )
            .await?;
        Ok(parse_intent_reply(&reply, nl))
    }
}

/// Parse the line-oriented intent reply; anything unparsed falls back to
/// the keyword heuristics for that field.
fn parse_intent_reply(reply: &str, nl: &str) -> (StructuredQuery, f64) {
    let fallback = keyword_intent(nl);
    let mut query = fallback.0;
    let mut confidence = 0.6;

    for line in reply.lines() {
        let line = line.trim();
        if let Some(rest) = label(line, "QUERY_TYPE:") {
            query.query_type = match rest.to_ascii_lowercase().as_str() {
                "describe" => QueryType::Describe,
                "compare" => QueryType::Compare,
                "rank" => QueryType::Rank,
                _ => QueryType::Search,
            };
        } else if let Some(rest) = label(line, "ENTITY_TYPES:") {
            let parsed: Vec<EntityType> = rest
                .split(',')
                .filter_map(|t| EntityType::from_str(t.trim()).ok())
                .collect();
            if !parsed.is_empty() {
                query.entity_types = parsed;
            }
        } else if let Some(rest) = label(line, "RELATION_TYPES:") {
            let parsed: Vec<RelationType> = rest
                .split(',')
                .filter_map(|t| RelationType::from_str(t.trim()).ok())
                .collect();
            if !parsed.is_empty() {
                query.relation_types = parsed;
            }
        } else if let Some(rest) = label(line, "FILTER:") {
            if let Some((field, value)) = rest.split_once('=') {
                query.filters.push(QueryFilter {
                    field: field.trim().to_string(),
                    value: value.trim().to_string(),
                });
            }
        } else if let Some(rest) = label(line, "CONFIDENCE:") {
            if let Ok(c) = rest.parse::<f64>() {
                confidence = c.clamp(0.0, 1.0);
            }
        }
    }

    (query, confidence)
}

/// Deterministic keyword heuristics; always produces something.
fn keyword_intent(nl: &str) -> (StructuredQuery, f64) {
    let lower = nl.to_lowercase();
    let query_type = if lower.contains("compare") || lower.contains(" versus ") || lower.contains(" vs ") {
        QueryType::Compare
    } else if lower.contains("rank") || lower.contains("top ") || lower.contains("best") {
        QueryType::Rank
    } else if lower.starts_with("what is") || lower.starts_with("who is") || lower.contains("describe") {
        QueryType::Describe
    } else {
        QueryType::Search
    };

    let entity_types: Vec<EntityType> = EntityType::ALL
        .iter()
        .filter(|t| lower.contains(&t.as_str().to_lowercase()))
        .copied()
        .collect();
    let relation_types: Vec<RelationType> = RelationType::ALL
        .iter()
        .filter(|t| {
            let phrase = t.as_str().to_lowercase().replace('_', " ");
            lower.contains(&phrase)
        })
        .copied()
        .collect();

    (
        StructuredQuery {
            query_type,
            entity_types,
            relation_types,
            filters: Vec::new(),
            ordering: None,
            limit: DEFAULT_LIMIT,
        },
        0.5,
    )
}

/// Stage (ii): deterministic translation into the graph query language.
pub fn generate_cypher(query: &StructuredQuery) -> Result<String, String> {
    if query.limit == 0 {
        return Err("limit must be positive".to_string());
    }

    let mut clauses: Vec<String> = Vec::new();
    let uses_relations = !query.relation_types.is_empty();

    if uses_relations {
        let types: Vec<&str> = query.relation_types.iter().map(|t| t.as_str()).collect();
        clauses.push(format!(
            "MATCH (a:Entity)-[r:{}]->(b:Entity)",
            types.join("|")
        ));
    } else {
        clauses.push("MATCH (a:Entity)".to_string());
    }

    let mut conditions: Vec<String> = Vec::new();
    if !query.entity_types.is_empty() {
        let types: Vec<String> = query
            .entity_types
            .iter()
            .map(|t| format!("'{}'", t.as_str()))
            .collect();
        conditions.push(format!("a.type IN [{}]", types.join(", ")));
    }
    for filter in &query.filters {
        // Field names are restricted to identifier characters; values are
        // escaped. Anything else is a generation error.
        if !filter.field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid filter field: {}", filter.field));
        }
        let escaped = filter.value.replace('\'', "\\'");
        conditions.push(format!("a.{} CONTAINS '{}'", filter.field, escaped));
    }
    if !conditions.is_empty() {
        clauses.push(format!("WHERE {}", conditions.join(" AND ")));
    }

    let returns = if uses_relations {
        "RETURN a.name, type(r), b.name, r.confidence"
    } else {
        match query.query_type {
            QueryType::Describe => "RETURN a.name, a.type, a.description",
            _ => "RETURN a.name, a.type",
        }
    };
    clauses.push(returns.to_string());

    match (&query.ordering, query.query_type) {
        (Some(ordering), _) if ordering.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') => {
            clauses.push(format!("ORDER BY {ordering} DESC"));
        }
        (None, QueryType::Rank) if uses_relations => {
            clauses.push("ORDER BY r.confidence DESC".to_string());
        }
        _ => {}
    }

    clauses.push(format!("LIMIT {}", query.limit));
    Ok(clauses.join(" "))
}

fn label<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(line[prefix.len()..].trim())
    } else {
        None
    }
}
