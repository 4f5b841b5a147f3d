//! In-memory vector store implementation.
//!
//! Useful for testing and small datasets.

use super::{cosine_similarity, ensure_embedded, rank, SearchResult, VectorStore};
use crate::chunking::Node;
use crate::error::{PlotlineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// In-memory vector store.
pub struct MemoryVectorStore {
    collection: String,
    nodes: RwLock<HashMap<Uuid, Node>>,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            nodes: RwLock::new(HashMap::new()),
        }
    }

    fn poisoned<T>(e: std::sync::PoisonError<T>) -> PlotlineError {
        PlotlineError::VectorStore(format!("Failed to acquire lock: {}", e))
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn add(&self, nodes: &[Node]) -> Result<usize> {
        ensure_embedded(nodes)?;
        let mut store = self.nodes.write().map_err(Self::poisoned)?;
        for node in nodes {
            store.insert(node.id, node.clone());
        }
        Ok(nodes.len())
    }

    async fn search_with_threshold(
        &self,
        query_embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        let nodes = self.nodes.read().map_err(Self::poisoned)?;

        let results = nodes
            .values()
            .map(|node| SearchResult {
                score: cosine_similarity(query_embedding, &node.embedding),
                node: node.clone(),
            })
            .collect();

        Ok(rank(results, limit, min_score))
    }

    async fn reset(&self) -> Result<()> {
        self.nodes.write().map_err(Self::poisoned)?.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.nodes.read().map_err(Self::poisoned)?.len())
    }
}
