//! Context building for RAG responses.

use super::ContextChunk;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::vector_store::VectorStore;
use std::sync::Arc;
use tracing::debug;

/// Retrieves the top-k nodes for a query.
#[derive(Clone)]
pub struct ContextBuilder {
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    min_score: Option<f32>,
}

impl ContextBuilder {
    /// Create a new context builder.
    pub fn new(vector_store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            vector_store,
            embedder,
            top_k: 2,
            min_score: None,
        }
    }

    /// Set the number of nodes to retrieve.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Drop nodes scoring under `min_score`.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Collection the builder retrieves from.
    pub fn collection(&self) -> &str {
        self.vector_store.collection()
    }

    /// Build context for a query.
    pub async fn build(&self, query: &str) -> Result<Vec<ContextChunk>> {
        let query_embedding = self.embedder.embed(query).await?;

        let results = match self.min_score {
            Some(min_score) => {
                self.vector_store
                    .search_with_threshold(&query_embedding, self.top_k, min_score)
                    .await?
            }
            None => self.vector_store.search(&query_embedding, self.top_k).await?,
        };

        debug!("Retrieved {} nodes from {}", results.len(), self.collection());
        Ok(results.into_iter().map(ContextChunk::from).collect())
    }
}

/// Format context chunks for a prompt.
pub fn format_context_for_prompt(chunks: &[ContextChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.render())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One-line summary of the retrieved nodes: `0.82: Heat, 0.61: Ronin`.
pub fn format_nodes_summary(chunks: &[ContextChunk]) -> String {
    if chunks.is_empty() {
        return "No nodes found".to_string();
    }
    chunks
        .iter()
        .map(|c| format!("{:.2}: {}", c.score, c.title.as_deref().unwrap_or("Untitled")))
        .collect::<Vec<_>>()
        .join(", ")
}
