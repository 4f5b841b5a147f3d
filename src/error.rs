//! Error types for Plotline.

use thiserror::Error;

/// Library-level error type for Plotline operations.
#[derive(Error, Debug)]
pub enum PlotlineError {
    #[error("No file found at {0}")]
    FileNotFound(String),

    #[error("Invalid data: {0}")]
    ValueData(String),

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),
}

impl PlotlineError {
    /// Whether the error came from an external service (vector store,
    /// embedding service or LLM runtime).
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            PlotlineError::Http(_)
                | PlotlineError::OpenAI(_)
                | PlotlineError::Llm(_)
                | PlotlineError::Embedding(_)
                | PlotlineError::VectorStore(_)
        )
    }
}

/// Result type alias for Plotline operations.
pub type Result<T> = std::result::Result<T, PlotlineError>;
