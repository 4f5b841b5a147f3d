//! Configuration settings for Plotline.

use crate::error::{PlotlineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
///
/// Built once at startup (file, then environment overrides) and handed to
/// components by reference. Nothing mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub vector_store: VectorStoreSettings,
    pub llm: LlmSettings,
    pub rag: RagSettings,
    pub evaluation: EvaluationSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Root directory; relative paths elsewhere resolve against it.
    pub root_dir: String,
    /// Debug mode (verbose logging, progress output).
    pub debug: bool,
    /// Compute device hint for local model runtimes (cpu, cuda, mps).
    pub device: String,
    /// Cache directory for model artifacts.
    pub cache_dir: String,
    /// Log level when no `-v` flag is given (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            root_dir: "~/.plotline".to_string(),
            debug: false,
            device: "cpu".to_string(),
            cache_dir: "~/.plotline/cache".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding provider (ollama, hashing).
    pub provider: String,
    /// Embedding model served by the provider.
    pub model: String,
    /// Short tag used in collection names (e.g. "mxbai").
    pub tag: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Number of texts per embedding request.
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "mxbai-embed-large".to_string(),
            tag: "mxbai".to_string(),
            dimensions: 1024,
            batch_size: 128,
        }
    }
}

/// Text splitting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Splitting strategy (sentence, window).
    pub strategy: String,
    /// Chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks.
    pub overlap_size: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            strategy: "sentence".to_string(),
            chunk_size: 1024,
            overlap_size: 100,
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    /// Backend (local, chromadb, qdrant).
    pub backend: String,
    /// Default collection to query.
    pub collection: String,
    /// Collection name prefix used at ingestion.
    pub collection_prefix: String,
    /// Qdrant host.
    pub host: String,
    /// Qdrant REST port.
    pub port: u16,
    /// Qdrant API key (optional).
    pub qdrant_api_key: Option<String>,
    /// Chroma server URL.
    pub chroma_url: String,
    /// Directory of the local backend, relative to the root directory.
    pub local_dir: String,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            backend: "qdrant".to_string(),
            collection: "wiki_movie_plots_1024_100_mxbai".to_string(),
            collection_prefix: "wiki_movie_plots".to_string(),
            host: "localhost".to_string(),
            port: 6333,
            qdrant_api_key: None,
            chroma_url: "http://localhost:8000".to_string(),
            local_dir: "data/storage".to_string(),
        }
    }
}

impl VectorStoreSettings {
    /// Base URL of the Qdrant REST API.
    pub fn qdrant_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// LLM runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Ollama server URL.
    pub ollama_url: String,
    /// Default model selector (e.g. "oll_llama3_instruct").
    pub default_model: String,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Sampling temperature.
    pub temperature: f32,
    /// Context window in tokens.
    pub context_window: u32,
    /// OpenAI API key, used by OpenAI-backed judges.
    pub openai_api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            default_model: "oll_llama3_instruct".to_string(),
            request_timeout_secs: 60,
            temperature: 1.0,
            context_window: 4096,
            openai_api_key: None,
        }
    }
}

/// Retrieval and chat settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    /// Chat mode (simple, context, condense_plus_context).
    pub chat_mode: String,
    /// Number of nodes retrieved per query.
    pub top_k: usize,
    /// System prompt override.
    pub system_prompt: Option<String>,
    /// Maximum chat messages kept in history.
    pub max_history: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chat_mode: "condense_plus_context".to_string(),
            top_k: 2,
            system_prompt: None,
            max_history: 20,
        }
    }
}

/// Evaluation harness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    /// SQLite database for evaluation records, relative to the root directory.
    pub database_path: String,
    /// QnA dataset (JSON), relative to the root directory.
    pub dataset_path: String,
    /// Directory for prompt-evaluation transcripts.
    pub results_dir: String,
    /// File holding the question ids used by prompt evaluation.
    pub question_ids_path: String,
    /// Model selectors evaluated by the harness.
    pub models: Vec<String>,
    /// Collections evaluated by the harness.
    pub collections: Vec<String>,
    /// Chat modes evaluated by the harness.
    pub chat_modes: Vec<String>,
    /// Retrieval depth used during evaluation.
    pub top_k: usize,
    /// Model selector used by the relevancy judges.
    pub judge_model: String,
    /// Model selector used by the pairwise judge.
    pub pairwise_judge_model: String,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            database_path: "data/evaluation.db".to_string(),
            dataset_path: "data/qna_dataset.json".to_string(),
            results_dir: "evaluation/prompt_evaluation/results".to_string(),
            question_ids_path: "evaluation/random_question_ids.txt".to_string(),
            models: vec![
                "oll_llama3_instruct".to_string(),
                "oll_gemma_instruct".to_string(),
                "oll_mistral_instruct".to_string(),
            ],
            collections: vec![
                "wiki_movie_plots_512_50_mxbai".to_string(),
                "wiki_movie_plots_1024_100_mxbai".to_string(),
                "wiki_movie_plots_2048_200_mxbai".to_string(),
            ],
            chat_modes: vec!["CONTEXT".to_string()],
            top_k: 2,
            judge_model: "oll_llama3_instruct".to_string(),
            pairwise_judge_model: "openai_gpt-3.5-turbo".to_string(),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
}

impl Settings {
    /// Load settings from the default configuration file, then apply the
    /// process environment.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let mut settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Settings>(&content)?
        } else {
            Settings::default()
        };

        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Override values from environment variables, looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DEBUG") {
            self.general.debug = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = lookup("PLOTLINE_ROOT_DIR").or_else(|| lookup("ROOT_DIR")) {
            self.general.root_dir = v;
        }
        if let Some(v) = lookup("DEVICE") {
            self.general.device = v;
        }
        if let Some(v) = lookup("CACHE_DIR") {
            self.general.cache_dir = v;
        }
        if let Some(v) = lookup("CHUNK_SIZE") {
            self.chunking.chunk_size = parse_env("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("OVERLAP_SIZE") {
            self.chunking.overlap_size = parse_env("OVERLAP_SIZE", &v)?;
        }
        if let Some(v) = lookup("VECTOR_STORE_HOST") {
            self.vector_store.host = v;
        }
        if let Some(v) = lookup("VECTOR_STORE_PORT") {
            self.vector_store.port = parse_env("VECTOR_STORE_PORT", &v)?;
        }
        if let Some(v) = lookup("QDRANT_API_KEY") {
            self.vector_store.qdrant_api_key = Some(v);
        }
        if let Some(v) = lookup("CHROMA_URL") {
            self.vector_store.chroma_url = v;
        }
        if let Some(v) = lookup("OLLAMA_URL") {
            self.llm.ollama_url = v;
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            if !v.is_empty() {
                self.llm.openai_api_key = Some(v);
            }
        }
        Ok(())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PlotlineError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("plotline")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded root directory.
    pub fn root_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.root_dir)
    }

    /// Resolve a configured path: absolute and `~` paths are kept, relative
    /// paths are joined onto the root directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let expanded = Self::expand_path(path);
        if expanded.is_absolute() {
            expanded
        } else {
            self.root_dir().join(expanded)
        }
    }

    /// Directory of the local vector store backend.
    pub fn local_store_dir(&self) -> PathBuf {
        self.resolve(&self.vector_store.local_dir)
    }

    /// Path of the evaluation database.
    pub fn evaluation_db_path(&self) -> PathBuf {
        self.resolve(&self.evaluation.database_path)
    }

    /// Get the expanded cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.resolve(&self.general.cache_dir)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PlotlineError::Config(format!("{} has an invalid value: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DEBUG", "true"),
            ("ROOT_DIR", "/srv/plotline"),
            ("CHUNK_SIZE", "512"),
            ("OVERLAP_SIZE", "50"),
            ("VECTOR_STORE_PORT", "7000"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert!(settings.general.debug);
        assert_eq!(settings.chunking.chunk_size, 512);
        assert_eq!(settings.chunking.overlap_size, 50);
        assert_eq!(settings.vector_store.qdrant_url(), "http://localhost:7000");
        assert_eq!(
            settings.local_store_dir(),
            PathBuf::from("/srv/plotline/data/storage")
        );
    }

    #[test]
    fn test_invalid_env_value() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(|k| (k == "CHUNK_SIZE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, PlotlineError::Config(_)));
    }

    #[test]
    fn test_settings_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.rag.top_k = 5;
        settings.save_to(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let loaded: Settings = toml::from_str(&content).unwrap();
        assert_eq!(loaded.rag.top_k, 5);
        assert_eq!(loaded.evaluation.models.len(), 3);
    }
}
