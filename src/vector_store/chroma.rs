//! Chroma vector store over its v1 REST API.
//!
//! Chroma only accepts scalar metadata values, so node offsets and the
//! original metadata map travel as one JSON string under [`NODE_KEY`]. The
//! scalar metadata fields are also stored flat, so they show up in Chroma's
//! own tooling.

use super::{collection_not_found, ensure_embedded, NodePayload, SearchResult, VectorStore};
use crate::chunking::Node;
use crate::error::{PlotlineError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const NODE_KEY: &str = "_node";

/// Records per add request.
const ADD_BATCH: usize = 256;

/// Chroma collection using cosine space.
pub struct ChromaVectorStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    /// Server-side collection id; changes when the collection is reset.
    collection_id: RwLock<String>,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Map<String, Value>>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
}

impl ChromaVectorStore {
    /// Connect and get or create the collection.
    #[instrument]
    pub async fn connect(base_url: &str, collection: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let collection_id = Self::get_or_create(&client, &base_url, collection).await?;

        Ok(Self {
            client,
            base_url,
            collection: collection.to_string(),
            collection_id: RwLock::new(collection_id),
        })
    }

    /// Connect to a collection that must already exist.
    #[instrument]
    pub async fn open_existing(base_url: &str, collection: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let collection_id = Self::lookup(&client, &base_url, collection)
            .await?
            .ok_or_else(|| collection_not_found(collection))?;

        Ok(Self {
            client,
            base_url,
            collection: collection.to_string(),
            collection_id: RwLock::new(collection_id),
        })
    }

    /// Id of an existing collection. Older servers answer a missing
    /// collection with a 500 whose body says it does not exist.
    async fn lookup(client: &reqwest::Client, base_url: &str, collection: &str) -> Result<Option<String>> {
        let response = client
            .get(format!("{}/api/v1/collections/{}", base_url, collection))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: CollectionResponse = response.json().await?;
            return Ok(Some(body.id));
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND || body.contains("does not exist") {
            return Ok(None);
        }
        Err(PlotlineError::VectorStore(format!(
            "Chroma collection lookup failed ({}): {}",
            status, body
        )))
    }

    async fn get_or_create(client: &reqwest::Client, base_url: &str, collection: &str) -> Result<String> {
        let response = client
            .post(format!("{}/api/v1/collections", base_url))
            .json(&json!({
                "name": collection,
                "get_or_create": true,
                "metadata": { "hnsw:space": "cosine" }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Self::failure("collection create", status, response).await);
        }

        let body: CollectionResponse = response.json().await?;
        debug!("Using Chroma collection {} ({})", collection, body.id);
        Ok(body.id)
    }

    fn collection_id(&self) -> Result<String> {
        self.collection_id
            .read()
            .map(|id| id.clone())
            .map_err(|e| PlotlineError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    async fn failure(action: &str, status: StatusCode, response: reqwest::Response) -> PlotlineError {
        let body = response.text().await.unwrap_or_default();
        PlotlineError::VectorStore(format!("Chroma {} failed ({}): {}", action, status, body))
    }

    /// Flat scalar metadata plus the serialized node payload.
    fn to_metadata(node: &Node) -> Result<Map<String, Value>> {
        let mut metadata: Map<String, Value> = node
            .metadata
            .iter()
            .filter(|(_, v)| matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut payload = NodePayload::from_node(node);
        payload.text = String::new();
        metadata.insert(
            NODE_KEY.to_string(),
            Value::String(serde_json::to_string(&payload)?),
        );
        Ok(metadata)
    }

    fn from_record(id: &str, text: String, metadata: Option<Map<String, Value>>) -> Result<Node> {
        let id = Uuid::parse_str(id)
            .map_err(|e| PlotlineError::VectorStore(format!("Corrupt Chroma id {:?}: {}", id, e)))?;
        let encoded = metadata
            .as_ref()
            .and_then(|m| m.get(NODE_KEY))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                PlotlineError::VectorStore(format!("Chroma record {} has no node payload", id))
            })?;

        let mut payload: NodePayload = serde_json::from_str(encoded)?;
        payload.text = text;
        Ok(payload.into_node(id, Vec::new()))
    }
}

#[async_trait]
impl VectorStore for ChromaVectorStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    #[instrument(skip(self, nodes), fields(collection = %self.collection, count = nodes.len()))]
    async fn add(&self, nodes: &[Node]) -> Result<usize> {
        ensure_embedded(nodes)?;
        let url = format!(
            "{}/api/v1/collections/{}/add",
            self.base_url,
            self.collection_id()?
        );

        for batch in nodes.chunks(ADD_BATCH) {
            let metadatas = batch
                .iter()
                .map(Self::to_metadata)
                .collect::<Result<Vec<_>>>()?;

            let response = self
                .client
                .post(&url)
                .json(&json!({
                    "ids": batch.iter().map(|n| n.id.to_string()).collect::<Vec<_>>(),
                    "embeddings": batch.iter().map(|n| &n.embedding).collect::<Vec<_>>(),
                    "documents": batch.iter().map(|n| &n.text).collect::<Vec<_>>(),
                    "metadatas": metadatas,
                }))
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                return Err(Self::failure("add", status, response).await);
            }
            debug!("Added {} records", batch.len());
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
        let url = format!(
            "{}/api/v1/collections/{}/query",
            self.base_url,
            self.collection_id()?
        );

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "query_embeddings": [query_embedding],
                "n_results": limit,
                "include": ["documents", "metadatas", "distances"],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Self::failure("query", status, response).await);
        }

        let body: QueryResponse = response.json().await?;
        parse_query_response(body, min_score)
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn reset(&self) -> Result<()> {
        let response = self
            .client
            .delete(format!(
                "{}/api/v1/collections/{}",
                self.base_url, self.collection
            ))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(Self::failure("delete", status, response).await);
        }
        info!("Deleted Chroma collection {}", self.collection);

        let id = Self::get_or_create(&self.client, &self.base_url, &self.collection).await?;
        let mut current = self
            .collection_id
            .write()
            .map_err(|e| PlotlineError::VectorStore(format!("Failed to acquire lock: {}", e)))?;
        *current = id;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let response = self
            .client
            .get(format!(
                "{}/api/v1/collections/{}/count",
                self.base_url,
                self.collection_id()?
            ))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Self::failure("count", status, response).await);
        }
        Ok(response.json::<usize>().await?)
    }
}

/// Convert a single-query Chroma response; cosine distance becomes `1 - d`.
fn parse_query_response(body: QueryResponse, min_score: f32) -> Result<Vec<SearchResult>> {
    let ids = body.ids.into_iter().next().unwrap_or_default();
    let mut documents = body
        .documents
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default()
        .into_iter();
    let mut metadatas = body
        .metadatas
        .and_then(|m| m.into_iter().next())
        .unwrap_or_default()
        .into_iter();
    let mut distances = body
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default()
        .into_iter();

    let mut results = Vec::with_capacity(ids.len());
    for id in ids {
        let text = documents.next().flatten().unwrap_or_default();
        let metadata = metadatas.next().flatten();
        let score = 1.0 - distances.next().unwrap_or(1.0);
        if score < min_score {
            continue;
        }
        results.push(SearchResult {
            node: ChromaVectorStore::from_record(&id, text, metadata)?,
            score,
        });
    }
    Ok(results)
}
