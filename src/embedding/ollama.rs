//! Ollama embeddings implementation.

use super::Embedder;
use crate::error::{PlotlineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Embedder backed by an Ollama server (`POST /api/embed`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
    batch_size: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder.
    pub fn new(base_url: &str, model: &str, dimensions: usize, batch_size: usize) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
            batch_size: batch_size.max(1),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    #[instrument(skip(self, text))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| PlotlineError::Embedding("Empty embedding response".to_string()))
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let url = format!("{}/api/embed", self.base_url);
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let response = self
                .client
                .post(&url)
                .json(&EmbedRequest {
                    model: &self.model,
                    input: chunk,
                })
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(PlotlineError::Embedding(format!(
                    "Ollama returned {}: {}",
                    status, body
                )));
            }

            let body: EmbedResponse = response.json().await?;
            if body.embeddings.len() != chunk.len() {
                return Err(PlotlineError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    chunk.len(),
                    body.embeddings.len()
                )));
            }
            all_embeddings.extend(body.embeddings);
        }

        debug!("Generated {} embeddings", all_embeddings.len());
        Ok(all_embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
