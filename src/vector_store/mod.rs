//! Vector store abstraction for Plotline.
//!
//! Every backend (local SQLite file, Chroma, Qdrant, and the in-memory store
//! used in tests) sits behind the same [`VectorStore`] trait. Each store
//! instance is bound to one collection.

mod chroma;
mod memory;
mod qdrant;
mod sqlite;

pub use chroma::ChromaVectorStore;
pub use memory::MemoryVectorStore;
pub use qdrant::QdrantVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::chunking::Node;
use crate::config::Settings;
use crate::error::{PlotlineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// File name of the local backend's database inside the storage directory.
pub const LOCAL_DB_FILE: &str = "local.db";

/// A search result with score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matched node.
    pub node: Node,
    /// Similarity score (higher is better).
    pub score: f32,
}

/// Supported vector store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// SQLite file under the root directory.
    Local,
    /// Chroma server.
    Chromadb,
    /// Qdrant server.
    Qdrant,
}

impl BackendKind {
    /// Whether ingestion replaces the whole collection instead of appending.
    pub fn overwrites_on_ingest(&self) -> bool {
        matches!(self, BackendKind::Local)
    }
}

impl std::str::FromStr for BackendKind {
    type Err = PlotlineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(BackendKind::Local),
            "chromadb" => Ok(BackendKind::Chromadb),
            "qdrant" => Ok(BackendKind::Qdrant),
            other => Err(PlotlineError::UnsupportedBackend(format!(
                "vector store '{}' (expected local, chromadb or qdrant)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Chromadb => write!(f, "chromadb"),
            BackendKind::Qdrant => write!(f, "qdrant"),
        }
    }
}

/// Trait for vector store implementations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Collection this store reads and writes.
    fn collection(&self) -> &str;

    /// Append embedded nodes. Returns the number written.
    async fn add(&self, nodes: &[Node]) -> Result<usize>;

    /// Search for similar nodes.
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        self.search_with_threshold(query_embedding, limit, f32::MIN).await
    }

    /// Search with a minimum similarity threshold.
    async fn search_with_threshold(
        &self,
        query_embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>>;

    /// Delete every node of the collection.
    ///
    /// Destructive and not atomic with respect to concurrent writers. Callers
    /// must invoke it explicitly; ingestion never calls it on its own except
    /// for backends that overwrite on ingest.
    async fn reset(&self) -> Result<()>;

    /// Replace the collection's contents with `nodes`.
    async fn replace(&self, nodes: &[Node]) -> Result<usize> {
        self.reset().await?;
        self.add(nodes).await
    }

    /// Number of nodes in the collection.
    async fn count(&self) -> Result<usize>;
}

/// Open the store for `backend` and `collection`, creating the collection
/// if needed. Used by ingestion.
///
/// No connection is made and nothing is written for an unsupported backend,
/// since parsing the backend name fails first.
pub async fn open_store(
    backend: BackendKind,
    collection: &str,
    settings: &Settings,
    dimensions: usize,
) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match backend {
        BackendKind::Local => Arc::new(SqliteVectorStore::new(
            &settings.local_store_dir().join(LOCAL_DB_FILE),
            collection,
        )?),
        BackendKind::Chromadb => Arc::new(
            ChromaVectorStore::connect(&settings.vector_store.chroma_url, collection).await?,
        ),
        BackendKind::Qdrant => Arc::new(
            QdrantVectorStore::connect(
                &settings.vector_store.qdrant_url(),
                settings.vector_store.qdrant_api_key.as_deref(),
                collection,
                dimensions,
            )
            .await?,
        ),
    };
    Ok(store)
}

/// Open a collection that was already ingested, for retrieval.
///
/// Unlike [`open_store`] this never creates anything: a collection name that
/// was never ingested fails with [`PlotlineError::VectorStore`].
pub async fn open_existing_store(
    backend: BackendKind,
    collection: &str,
    settings: &Settings,
) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match backend {
        BackendKind::Local => Arc::new(SqliteVectorStore::open_existing(
            &settings.local_store_dir().join(LOCAL_DB_FILE),
            collection,
        )?),
        BackendKind::Chromadb => Arc::new(
            ChromaVectorStore::open_existing(&settings.vector_store.chroma_url, collection).await?,
        ),
        BackendKind::Qdrant => Arc::new(
            QdrantVectorStore::open_existing(
                &settings.vector_store.qdrant_url(),
                settings.vector_store.qdrant_api_key.as_deref(),
                collection,
            )
            .await?,
        ),
    };
    Ok(store)
}

pub(crate) fn collection_not_found(collection: &str) -> PlotlineError {
    PlotlineError::VectorStore(format!("collection {} not found", collection))
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Sort by descending score, drop results under `min_score`, keep `limit`.
pub(crate) fn rank(mut results: Vec<SearchResult>, limit: usize, min_score: f32) -> Vec<SearchResult> {
    results.retain(|r| r.score >= min_score);
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results
}

/// Payload stored next to each vector on remote backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct NodePayload {
    pub text: String,
    pub document_id: Uuid,
    pub start_char: usize,
    pub end_char: usize,
    pub order: usize,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl NodePayload {
    pub fn from_node(node: &Node) -> Self {
        Self {
            text: node.text.clone(),
            document_id: node.document_id,
            start_char: node.start_char,
            end_char: node.end_char,
            order: node.order,
            metadata: node.metadata.clone(),
        }
    }

    pub fn into_node(self, id: Uuid, embedding: Vec<f32>) -> Node {
        Node {
            id,
            document_id: self.document_id,
            text: self.text,
            start_char: self.start_char,
            end_char: self.end_char,
            order: self.order,
            metadata: self.metadata,
            embedding,
        }
    }
}

/// Reject nodes that were never embedded.
pub(crate) fn ensure_embedded(nodes: &[Node]) -> Result<()> {
    match nodes.iter().find(|n| n.embedding.is_empty()) {
        Some(node) => Err(PlotlineError::VectorStore(format!(
            "Node {} has no embedding",
            node.id
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) fn test_node(title: &str, text: &str, embedding: Vec<f32>) -> Node {
    let mut metadata = Map::new();
    metadata.insert("title".to_string(), Value::String(title.to_string()));
    Node {
        id: Uuid::new_v4(),
        document_id: Uuid::new_v4(),
        text: text.to_string(),
        start_char: 0,
        end_char: text.chars().count(),
        order: 0,
        metadata,
        embedding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("local".parse::<BackendKind>().unwrap(), BackendKind::Local);
        assert_eq!("chromadb".parse::<BackendKind>().unwrap(), BackendKind::Chromadb);
        assert_eq!("qdrant".parse::<BackendKind>().unwrap(), BackendKind::Qdrant);
        assert!(matches!(
            "mongo".parse::<BackendKind>(),
            Err(PlotlineError::UnsupportedBackend(_))
        ));
        assert_eq!(BackendKind::Chromadb.to_string(), "chromadb");
    }

    #[test]
    fn test_payload_roundtrip() {
        let node = test_node("Heat", "A heist in LA.", vec![0.5, 0.5]);
        let payload = serde_json::to_value(NodePayload::from_node(&node)).unwrap();
        let restored: NodePayload = serde_json::from_value(payload).unwrap();
        let restored = restored.into_node(node.id, node.embedding.clone());

        assert_eq!(restored.text, node.text);
        assert_eq!(restored.title().as_deref(), Some("Heat"));
    }
}
