//! Vector index adapter
//!
//! A named collection of cosine-distance vectors behind a qdrant-style REST
//! surface. The backend requires UUID point ids; stable internal ids that
//! are not UUIDs are deterministically UUID-ified (v5 over a fixed
//! namespace) and the original id travels in the payload.

use reqwest::Client;
use scigraph_core::StoreError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Namespace for deterministic UUID-ification of internal ids.
const ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0xa7, 0xb8, 0x10, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30,
    0xc8,
]);

/// Payload key carrying the original internal id.
const ORIGINAL_ID_KEY: &str = "_scigraph_id";

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub base_url: String,
    pub collection: String,
    pub dimension: usize,
    pub timeout_secs: u64,
}

impl VectorStoreConfig {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>, dimension: usize) -> Self {
        Self {
            base_url: base_url.into(),
            collection: collection.into(),
            dimension,
            timeout_secs: 5,
        }
    }
}

/// One similarity-search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    /// Original internal id (recovered from payload).
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

pub struct VectorStore {
    client: Client,
    config: VectorStoreConfig,
}

impl VectorStore {
    pub fn new(config: VectorStoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Deterministic point id for an internal id: pass UUIDs through, hash
    /// everything else.
    pub fn point_id(internal_id: &str) -> String {
        match Uuid::parse_str(internal_id) {
            Ok(uuid) => uuid.to_string(),
            Err(_) => Uuid::new_v5(&ID_NAMESPACE, internal_id.as_bytes()).to_string(),
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.config.base_url, self.config.collection, suffix
        )
    }

    async fn check(&self, response: reqwest::Response) -> Result<serde_json::Value, StoreError> {
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(StoreError::Query(format!("{status}: {text}")));
        }
        response
            .json()
            .await
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))
    }

    /// Create the collection if absent, with the configured dimension and
    /// cosine distance.
    pub async fn ensure_collection(&self) -> Result<(), StoreError> {
        let exists = self
            .client
            .get(self.url(""))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);
        if exists {
            return Ok(());
        }

        debug!(collection = %self.config.collection, "creating vector collection");
        let body = serde_json::json!({
            "vectors": {"size": self.config.dimension, "distance": "Cosine"}
        });
        let response = self
            .client
            .put(self.url(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        self.check(response).await?;
        Ok(())
    }

    /// Upsert one vector with payload under a stable internal id.
    pub async fn upsert(
        &self,
        internal_id: &str,
        vector: &[f32],
        mut payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        if vector.len() != self.config.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        if let Some(map) = payload.as_object_mut() {
            map.insert(
                ORIGINAL_ID_KEY.to_string(),
                serde_json::Value::String(internal_id.to_string()),
            );
        }
        let body = serde_json::json!({
            "points": [{
                "id": Self::point_id(internal_id),
                "vector": vector,
                "payload": payload,
            }]
        });
        let response = self
            .client
            .put(self.url("/points"))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        self.check(response).await?;
        Ok(())
    }

    /// Cosine similarity search, optionally thresholded and filtered.
    pub async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        filter: Option<serde_json::Value>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        if vector.len() != self.config.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        let mut body = serde_json::json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(threshold) = score_threshold {
            body["score_threshold"] = serde_json::json!(threshold);
        }
        if let Some(filter) = filter {
            body["filter"] = filter;
        }

        let response = self
            .client
            .post(self.url("/points/search"))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let data = self.check(response).await?;

        Ok(data["result"]
            .as_array()
            .map(|hits| hits.iter().map(Self::scored_point_from).collect())
            .unwrap_or_default())
    }

    /// Retrieve points by internal id, with vectors and payloads.
    pub async fn retrieve(&self, internal_ids: &[String]) -> Result<Vec<ScoredPoint>, StoreError> {
        if internal_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = internal_ids.iter().map(|id| Self::point_id(id)).collect();
        let body = serde_json::json!({
            "ids": ids,
            "with_payload": true,
            "with_vector": true,
        });
        let response = self
            .client
            .post(self.url("/points"))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let data = self.check(response).await?;

        Ok(data["result"]
            .as_array()
            .map(|points| points.iter().map(Self::scored_point_from).collect())
            .unwrap_or_default())
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        let response = self
            .client
            .post(self.url("/points/count"))
            .json(&serde_json::json!({"exact": true}))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let data = self.check(response).await?;
        Ok(data["result"]["count"].as_u64().unwrap_or(0) as usize)
    }

    /// Delete points by internal id list.
    pub async fn delete(&self, internal_ids: &[String]) -> Result<(), StoreError> {
        if internal_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = internal_ids.iter().map(|id| Self::point_id(id)).collect();
        let response = self
            .client
            .post(self.url("/points/delete"))
            .json(&serde_json::json!({"points": ids}))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        self.check(response).await?;
        Ok(())
    }

    fn scored_point_from(hit: &serde_json::Value) -> ScoredPoint {
        let payload = hit["payload"].clone();
        let id = payload[ORIGINAL_ID_KEY]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| hit["id"].as_str().unwrap_or_default().to_string());
        ScoredPoint {
            id,
            score: hit["score"].as_f64().unwrap_or(0.0) as f32,
            payload,
            vector: hit["vector"].as_array().map(|v| {
                v.iter()
                    .filter_map(|x| x.as_f64().map(|f| f as f32))
                    .collect()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_passes_uuids_through() {
        let raw = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";
        assert_eq!(VectorStore::point_id(raw), raw);
    }

    #[test]
    fn point_id_is_deterministic_for_internal_ids() {
        let a = VectorStore::point_id("entity:gpt-4");
        let b = VectorStore::point_id("entity:gpt-4");
        assert_eq!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
        assert_ne!(a, VectorStore::point_id("entity:gpt-3"));
    }
}
