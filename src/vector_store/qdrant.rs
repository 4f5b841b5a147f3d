//! Qdrant vector store over its REST API.

use super::{collection_not_found, ensure_embedded, NodePayload, SearchResult, VectorStore};
use crate::chunking::Node;
use crate::error::{PlotlineError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Points per upsert request.
const UPSERT_BATCH: usize = 256;

/// Qdrant collection with cosine distance.
pub struct QdrantVectorStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct Point<'a> {
    id: String,
    vector: &'a [f32],
    payload: NodePayload,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_threshold: Option<f32>,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: serde_json::Value,
    score: f32,
    payload: Option<NodePayload>,
}

#[derive(Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

impl QdrantVectorStore {
    /// Connect and create the collection if it does not exist.
    #[instrument(skip(api_key))]
    pub async fn connect(
        base_url: &str,
        api_key: Option<&str>,
        collection: &str,
        dimensions: usize,
    ) -> Result<Self> {
        let store = Self::build(base_url, api_key, collection, dimensions)?;
        store.ensure_collection().await?;
        Ok(store)
    }

    /// Connect to a collection that must already exist.
    #[instrument(skip(api_key))]
    pub async fn open_existing(
        base_url: &str,
        api_key: Option<&str>,
        collection: &str,
    ) -> Result<Self> {
        let store = Self::build(base_url, api_key, collection, 0)?;
        if !store.exists().await? {
            return Err(collection_not_found(collection));
        }
        Ok(store)
    }

    fn build(
        base_url: &str,
        api_key: Option<&str>,
        collection: &str,
        dimensions: usize,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| PlotlineError::Config(format!("Invalid Qdrant API key: {}", e)))?;
            headers.insert(HeaderName::from_static("api-key"), value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            dimensions,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    async fn exists(&self) -> Result<bool> {
        let response = self.client.get(self.collection_url()).send().await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(Self::failure("collection lookup", status, response).await),
        }
    }

    async fn ensure_collection(&self) -> Result<()> {
        if self.exists().await? {
            debug!("Collection {} exists", self.collection);
            return Ok(());
        }

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": {
                    "size": self.dimensions,
                    "distance": "Cosine"
                }
            }))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::CONFLICT => {
                info!(
                    "Created Qdrant collection {} ({} dims)",
                    self.collection, self.dimensions
                );
                Ok(())
            }
            status => Err(Self::failure("collection create", status, response).await),
        }
    }

    async fn failure(action: &str, status: StatusCode, response: reqwest::Response) -> PlotlineError {
        let body = response.text().await.unwrap_or_default();
        PlotlineError::VectorStore(format!("Qdrant {} failed ({}): {}", action, status, body))
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    #[instrument(skip(self, nodes), fields(collection = %self.collection, count = nodes.len()))]
    async fn add(&self, nodes: &[Node]) -> Result<usize> {
        ensure_embedded(nodes)?;
        let url = format!("{}/points", self.collection_url());

        for batch in nodes.chunks(UPSERT_BATCH) {
            let points: Vec<Point<'_>> = batch
                .iter()
                .map(|node| Point {
                    id: node.id.to_string(),
                    vector: &node.embedding,
                    payload: NodePayload::from_node(node),
                })
                .collect();

            let response = self
                .client
                .put(&url)
                .query(&[("wait", "true")])
                .json(&json!({ "points": points }))
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                return Err(Self::failure("upsert", status, response).await);
            }
            debug!("Upserted {} points", batch.len());
        }

        info!("Added {} nodes", nodes.len());
        Ok(nodes.len())
    }

    #[instrument(skip(self, query_embedding), fields(collection = %self.collection))]
    async fn search_with_threshold(
        &self,
        query_embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        let url = format!("{}/points/search", self.collection_url());
        let response = self
            .client
            .post(&url)
            .json(&SearchRequest {
                vector: query_embedding,
                limit,
                with_payload: true,
                score_threshold: (min_score > f32::MIN).then_some(min_score),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Self::failure("search", status, response).await);
        }

        let body: SearchResponse = response.json().await?;
        let results = body
            .result
            .into_iter()
            .filter_map(|point| {
                let id = point
                    .id
                    .as_str()
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .unwrap_or_default();
                match point.payload {
                    Some(payload) => Some(SearchResult {
                        node: payload.into_node(id, Vec::new()),
                        score: point.score,
                    }),
                    None => {
                        warn!("Point {} has no payload", id);
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        debug!("Found {} matching nodes", results.len());
        Ok(results)
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn reset(&self) -> Result<()> {
        let response = self.client.delete(self.collection_url()).send().await?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            let status = response.status();
            return Err(Self::failure("delete", status, response).await);
        }
        info!("Deleted Qdrant collection {}", self.collection);
        self.ensure_collection().await
    }

    async fn count(&self) -> Result<usize> {
        let url = format!("{}/points/count", self.collection_url());
        let response = self
            .client
            .post(&url)
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Self::failure("count", status, response).await);
        }

        let body: CountResponse = response.json().await?;
        Ok(body.result.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::test_node;

    #[test]
    fn test_point_serialization() {
        let node = test_node("Heat", "A heist.", vec![0.25, 0.75]);
        let point = Point {
            id: node.id.to_string(),
            vector: &node.embedding,
            payload: NodePayload::from_node(&node),
        };
        let value = serde_json::to_value(&point).unwrap();

        assert_eq!(value["id"], node.id.to_string());
        assert_eq!(value["vector"], json!([0.25, 0.75]));
        assert_eq!(value["payload"]["text"], "A heist.");
        assert_eq!(value["payload"]["metadata"]["title"], "Heat");
    }

    #[test]
    fn test_search_response_parsing() {
        let id = Uuid::new_v4();
        let body = json!({
            "result": [{
                "id": id.to_string(),
                "version": 3,
                "score": 0.91,
                "payload": {
                    "text": "Daniel trains.",
                    "document_id": Uuid::new_v4().to_string(),
                    "start_char": 0,
                    "end_char": 14,
                    "order": 0,
                    "metadata": { "title": "The Karate Kid" }
                }
            }],
            "status": "ok",
            "time": 0.001
        });

        let parsed: SearchResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.result.len(), 1);
        assert!((parsed.result[0].score - 0.91).abs() < 1e-6);
        let payload = parsed.result[0].payload.clone().unwrap();
        let node = payload.into_node(id, Vec::new());
        assert_eq!(node.title().as_deref(), Some("The Karate Kid"));
    }

    #[test]
    fn test_threshold_is_omitted_without_minimum() {
        let request = SearchRequest {
            vector: &[1.0],
            limit: 2,
            with_payload: true,
            score_threshold: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("score_threshold").is_none());
    }
}
