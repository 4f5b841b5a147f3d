//! Embedding generation for semantic search and retrieval.

mod hashing;
mod ollama;

pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;

use crate::config::Settings;
use crate::error::{PlotlineError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;
}

/// Create the embedder selected in the settings.
pub fn create_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    let embedding = &settings.embedding;
    match embedding.provider.to_lowercase().as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(
            &settings.llm.ollama_url,
            &embedding.model,
            embedding.dimensions as usize,
            embedding.batch_size,
        )?)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(embedding.dimensions as usize))),
        other => Err(PlotlineError::UnsupportedBackend(format!(
            "embedding provider '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_embedder() {
        let mut settings = Settings::default();
        settings.embedding.provider = "hashing".to_string();
        settings.embedding.dimensions = 64;
        assert_eq!(create_embedder(&settings).unwrap().dimensions(), 64);

        settings.embedding.provider = "word2vec".to_string();
        assert!(matches!(
            create_embedder(&settings),
            Err(PlotlineError::UnsupportedBackend(_))
        ));
    }
}
