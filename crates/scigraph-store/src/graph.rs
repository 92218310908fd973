//! Cypher graph adapter
//!
//! Talks to a Cypher-capable property graph over its HTTP transactional
//! endpoint (`POST {base}/db/{database}/tx/commit`, statements + parameters,
//! rows back in `results[0].data[*].row`). All node and edge writes are
//! `MERGE`-based upserts keyed the same way as [`crate::MemoryGraph`].

use async_trait::async_trait;
use reqwest::Client;
use scigraph_core::{
    Entity, EntityType, GraphReader, GraphWriter, Relation, ReviewStatus, ScoreComponents,
    StoreError,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Adapter over an HTTP Cypher endpoint.
pub struct CypherGraphStore {
    client: Client,
    endpoint: String,
    auth: Option<(String, String)>,
}

impl CypherGraphStore {
    /// `base_url` like `http://localhost:7474`, `database` like `neo4j`.
    pub fn new(base_url: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{base_url}/db/{database}/tx/commit"),
            auth: None,
        })
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.auth = Some((user.into(), pass.into()));
        self
    }

    /// Run one Cypher statement, returning the raw row arrays.
    async fn statement(
        &self,
        query: &str,
        params: serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        debug!(query = %query, "cypher statement");
        let body = serde_json::json!({
            "statements": [{"statement": query, "parameters": params}]
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some((user, pass)) = &self.auth {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(StoreError::Query(format!("{status}: {text}")));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;

        if let Some(errors) = data["errors"].as_array() {
            if let Some(first) = errors.first() {
                return Err(StoreError::Query(first.to_string()));
            }
        }

        Ok(data["results"][0]["data"]
            .as_array()
            .map(|rows| rows.iter().map(|r| r["row"].clone()).collect())
            .unwrap_or_default())
    }

    fn entity_from_row(row: &serde_json::Value) -> Result<Entity, StoreError> {
        let props = &row[0];
        let type_str = props["type"]
            .as_str()
            .ok_or_else(|| StoreError::MalformedResponse("node missing type".into()))?;
        let entity_type = EntityType::from_str(type_str).map_err(StoreError::MalformedResponse)?;
        Ok(Entity {
            id: props["id"]
                .as_str()
                .ok_or_else(|| StoreError::MalformedResponse("node missing id".into()))?
                .to_string(),
            name: props["name"].as_str().unwrap_or_default().to_string(),
            entity_type,
            description: props["description"].as_str().map(str::to_string),
            attributes: props["attributes"]
                .as_object()
                .map(|m| {
                    m.iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    fn relation_from_row(row: &serde_json::Value) -> Result<Relation, StoreError> {
        let props = &row[0];
        let rel_type = props["type"]
            .as_str()
            .ok_or_else(|| StoreError::MalformedResponse("edge missing type".into()))
            .and_then(|s| {
                scigraph_core::RelationType::from_str(s).map_err(StoreError::MalformedResponse)
            })?;
        let evidence = props["evidence"]
            .as_str()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        Ok(Relation {
            source: props["source"].as_str().unwrap_or_default().to_string(),
            target: props["target"].as_str().unwrap_or_default().to_string(),
            rel_type,
            confidence: props["confidence"].as_f64().unwrap_or(0.0),
            score_components: props["scoreComponents"]
                .as_str()
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_else(ScoreComponents::neutral),
            evidence,
            review_status: props["reviewStatus"]
                .as_str()
                .and_then(|s| serde_json::from_str(&format!("\"{s}\"")).ok())
                .unwrap_or(ReviewStatus::Pending),
            needs_review: props["needsReview"].as_bool().unwrap_or(false),
            method: props["method"]
                .as_str()
                .and_then(|s| serde_json::from_str(&format!("\"{s}\"")).ok())
                .unwrap_or(scigraph_core::ExtractionMethod::Hybrid),
        })
    }

    const RELATION_PROJECTION: &'static str = "{source: a.id, target: b.id, type: type(r), \
         confidence: r.confidence, scoreComponents: r.scoreComponents, evidence: r.evidence, \
         reviewStatus: r.reviewStatus, needsReview: r.needsReview, method: r.method}";
}

#[async_trait]
impl GraphReader for CypherGraphStore {
    async fn get_entity(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        let rows = self
            .statement(
                "MATCH (n:Entity {id: $id}) RETURN {id: n.id, name: n.name, type: n.type, \
                 description: n.description, attributes: n.attributes} LIMIT 1",
                serde_json::json!({"id": id}),
            )
            .await?;
        rows.first().map(Self::entity_from_row).transpose()
    }

    async fn find_entity(&self, name_or_id: &str) -> Result<Option<Entity>, StoreError> {
        let rows = self
            .statement(
                "MATCH (n:Entity) WHERE n.id = $v OR n.name = $v RETURN {id: n.id, \
                 name: n.name, type: n.type, description: n.description, \
                 attributes: n.attributes} LIMIT 1",
                serde_json::json!({"v": name_or_id}),
            )
            .await?;
        rows.first().map(Self::entity_from_row).transpose()
    }

    async fn outgoing(&self, id: &str) -> Result<Vec<Relation>, StoreError> {
        let query = format!(
            "MATCH (a:Entity {{id: $id}})-[r]->(b:Entity) RETURN {}",
            Self::RELATION_PROJECTION
        );
        let rows = self.statement(&query, serde_json::json!({"id": id})).await?;
        rows.iter().map(Self::relation_from_row).collect()
    }

    async fn incoming(&self, id: &str) -> Result<Vec<Relation>, StoreError> {
        let query = format!(
            "MATCH (a:Entity)-[r]->(b:Entity {{id: $id}}) RETURN {}",
            Self::RELATION_PROJECTION
        );
        let rows = self.statement(&query, serde_json::json!({"id": id})).await?;
        rows.iter().map(Self::relation_from_row).collect()
    }

    async fn canonical_names(
        &self,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let (query, params) = match entity_type {
            Some(t) => (
                "MATCH (n:Entity {type: $type}) RETURN [n.id, n.name]",
                serde_json::json!({"type": t.as_str()}),
            ),
            None => (
                "MATCH (n:Entity) RETURN [n.id, n.name]",
                serde_json::json!({}),
            ),
        };
        let rows = self.statement(query, params).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let pair = row[0].as_array()?;
                Some((pair[0].as_str()?.to_string(), pair[1].as_str()?.to_string()))
            })
            .collect())
    }

    async fn entity_count(&self) -> Result<usize, StoreError> {
        let rows = self
            .statement("MATCH (n:Entity) RETURN count(n)", serde_json::json!({}))
            .await?;
        Ok(rows
            .first()
            .and_then(|r| r[0].as_u64())
            .unwrap_or(0) as usize)
    }

    async fn run_query(
        &self,
        query: &str,
        params: serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        self.statement(query, params).await
    }
}

#[async_trait]
impl GraphWriter for CypherGraphStore {
    async fn upsert_entity(&self, entity: &Entity) -> Result<(), StoreError> {
        // MERGE by (type, id); name is only set on create so surface drift
        // never overwrites the first-observed form.
        self.statement(
            "MERGE (n:Entity {id: $id, type: $type}) \
             ON CREATE SET n.name = $name \
             SET n.description = coalesce(n.description, $description), \
                 n.attributes = $attributes",
            serde_json::json!({
                "id": entity.id,
                "type": entity.entity_type.as_str(),
                "name": entity.name,
                "description": entity.description,
                "attributes": entity.attributes,
            }),
        )
        .await?;
        Ok(())
    }

    async fn upsert_relation(&self, relation: &Relation) -> Result<(), StoreError> {
        let evidence = serde_json::to_string(&relation.evidence)
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;
        let components = serde_json::to_string(&relation.score_components)
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;
        let query = format!(
            "MATCH (a:Entity {{id: $source}}), (b:Entity {{id: $target}}) \
             MERGE (a)-[r:{}]->(b) \
             SET r.confidence = $confidence, r.scoreComponents = $components, \
                 r.evidence = $evidence, r.reviewStatus = $status, \
                 r.needsReview = $needsReview, r.method = $method",
            relation.rel_type.as_str()
        );
        self.statement(
            &query,
            serde_json::json!({
                "source": relation.source,
                "target": relation.target,
                "confidence": relation.confidence,
                "components": components,
                "evidence": evidence,
                "status": serde_json::to_value(relation.review_status)
                    .map_err(|e| StoreError::MalformedResponse(e.to_string()))?,
                "needsReview": relation.needs_review,
                "method": relation.method.as_str(),
            }),
        )
        .await?;
        Ok(())
    }
}
