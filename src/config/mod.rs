//! Configuration module for Plotline.
//!
//! Handles loading application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{JudgePrompts, Prompts, RagPrompts};
pub use settings::{
    ChunkingSettings, EmbeddingSettings, EvaluationSettings, GeneralSettings, LlmSettings,
    PromptSettings, RagSettings, Settings, VectorStoreSettings,
};
