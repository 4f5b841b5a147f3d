//! Pre-flight checks before expensive operations.
//!
//! Validates that the services an operation talks to are reachable before
//! starting work that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{PlotlineError, Result};
use crate::llm::ModelSpec;
use crate::vector_store::BackendKind;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    /// Ingestion needs the embedding service and the vector store.
    Ingest { backend: BackendKind },
    /// Answering needs the embedding service, the vector store and the model.
    Answer { model: &'a str },
    /// A judge needs its model.
    Judge { model: &'a str },
}

/// Run pre-flight checks for the given operation.
pub async fn check(operation: Operation<'_>, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Ingest { backend } => {
            check_embedding_service(settings).await?;
            check_backend(backend, settings).await?;
        }
        Operation::Answer { model } => {
            check_embedding_service(settings).await?;
            check_backend(settings.vector_store.backend.parse()?, settings).await?;
            check_model(model, settings).await?;
        }
        Operation::Judge { model } => {
            check_model(model, settings).await?;
        }
    }
    Ok(())
}

async fn check_embedding_service(settings: &Settings) -> Result<()> {
    if settings.embedding.provider == "ollama" {
        check_ollama(&settings.llm.ollama_url).await?;
    }
    Ok(())
}

async fn check_backend(backend: BackendKind, settings: &Settings) -> Result<()> {
    match backend {
        BackendKind::Local => Ok(()),
        BackendKind::Qdrant => check_qdrant(&settings.vector_store.qdrant_url()).await,
        BackendKind::Chromadb => check_chroma(&settings.vector_store.chroma_url).await,
    }
}

async fn check_model(selector: &str, settings: &Settings) -> Result<()> {
    match selector.parse::<ModelSpec>()? {
        ModelSpec::Ollama(_) => check_ollama(&settings.llm.ollama_url).await,
        ModelSpec::OpenAI(_) => check_api_key(settings),
    }
}

/// Check that an Ollama server answers at `base_url`.
pub async fn check_ollama(base_url: &str) -> Result<()> {
    probe(&format!("{}/api/tags", base_url.trim_end_matches('/')))
        .await
        .map_err(|e| PlotlineError::Llm(format!("Ollama is not reachable at {}: {}", base_url, e)))
}

/// Check that a Qdrant server answers at `base_url`.
pub async fn check_qdrant(base_url: &str) -> Result<()> {
    probe(&format!("{}/collections", base_url.trim_end_matches('/')))
        .await
        .map_err(|e| {
            PlotlineError::VectorStore(format!("Qdrant is not reachable at {}: {}", base_url, e))
        })
}

/// Check that a Chroma server answers at `base_url`.
pub async fn check_chroma(base_url: &str) -> Result<()> {
    probe(&format!("{}/api/v1/heartbeat", base_url.trim_end_matches('/')))
        .await
        .map_err(|e| {
            PlotlineError::VectorStore(format!("Chroma is not reachable at {}: {}", base_url, e))
        })
}

/// Check if an OpenAI API key is configured.
pub fn check_api_key(settings: &Settings) -> Result<()> {
    match settings.llm.openai_api_key.as_deref() {
        Some(key) if !key.is_empty() => Ok(()),
        _ => Err(PlotlineError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

async fn probe(url: &str) -> std::result::Result<(), String> {
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|e| e.to_string())?;

    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => Ok(()),
        Ok(response) => Err(format!("HTTP {}", response.status())),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_ingest_needs_no_services() {
        let mut settings = Settings::default();
        settings.embedding.provider = "hashing".to_string();
        assert!(check(Operation::Ingest { backend: BackendKind::Local }, &settings)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_openai_judge_needs_key() {
        let settings = Settings::default();
        let result = check(Operation::Judge { model: "openai_gpt-3.5-turbo" }, &settings).await;
        assert!(matches!(result, Err(PlotlineError::Config(_))));

        let mut settings = Settings::default();
        settings.llm.openai_api_key = Some("sk-test".to_string());
        assert!(check(Operation::Judge { model: "openai_gpt-3.5-turbo" }, &settings)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_model_selector() {
        let result = check(Operation::Judge { model: "gpt4" }, &Settings::default()).await;
        assert!(matches!(result, Err(PlotlineError::UnsupportedBackend(_))));
    }
}
