//! RAG (Retrieval-Augmented Generation) over the movie collections.
//!
//! Provides single-shot question answering and stateful chat sessions.

pub mod context;
mod engine;

pub use context::ContextBuilder;
pub use engine::{ChatEngine, EngineBuilder, EngineConfig, EngineFactory, QueryEngine};

use crate::error::{PlotlineError, Result};
use crate::loading::render_with_metadata;
use crate::vector_store::SearchResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// How a chat engine uses retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// No retrieval; the model answers from history alone.
    Simple,
    /// Retrieve with the raw message.
    Context,
    /// Condense history and message into a standalone question, then retrieve.
    #[default]
    CondensePlusContext,
}

impl ChatMode {
    /// Upper-case name, the form stored in evaluation records.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Simple => "SIMPLE",
            ChatMode::Context => "CONTEXT",
            ChatMode::CondensePlusContext => "CONDENSE_PLUS_CONTEXT",
        }
    }
}

impl std::str::FromStr for ChatMode {
    type Err = PlotlineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "simple" => Ok(ChatMode::Simple),
            "context" => Ok(ChatMode::Context),
            "condense_plus_context" => Ok(ChatMode::CondensePlusContext),
            _ => Err(PlotlineError::InvalidInput(format!("Unknown chat mode: {}", s))),
        }
    }
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrieved node prepared for prompting and display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextChunk {
    /// Node ID.
    pub node_id: Uuid,
    /// Movie title, if known.
    pub title: Option<String>,
    /// Chunk text.
    pub text: String,
    /// Metadata inherited from the movie record.
    pub metadata: Map<String, Value>,
    /// Similarity score.
    pub score: f32,
}

impl ContextChunk {
    /// Chunk text with its metadata header, as shown to the LLM.
    pub fn render(&self) -> String {
        render_with_metadata(&self.metadata, &self.text)
    }
}

impl From<SearchResult> for ContextChunk {
    fn from(result: SearchResult) -> Self {
        Self {
            node_id: result.node.id,
            title: result.node.title(),
            text: result.node.text,
            metadata: result.node.metadata,
            score: result.score,
        }
    }
}

/// An answer with the nodes it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated answer.
    pub response: String,
    /// Retrieved nodes, best first. Empty in `simple` mode.
    pub source_nodes: Vec<ContextChunk>,
}

impl ChatResponse {
    /// Rendered texts of the source nodes.
    pub fn contexts(&self) -> Vec<String> {
        self.source_nodes.iter().map(|c| c.render()).collect()
    }

    /// Format the response for display.
    pub fn format_for_display(&self) -> String {
        let mut output = self.response.clone();

        if !self.source_nodes.is_empty() {
            output.push_str("\n\n--- Sources ---\n");
            for source in &self.source_nodes {
                output.push_str(&format!(
                    "\n{} (score: {:.2})",
                    source.title.as_deref().unwrap_or("Untitled"),
                    source.score
                ));
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_mode_parsing() {
        assert_eq!("CONTEXT".parse::<ChatMode>().unwrap(), ChatMode::Context);
        assert_eq!(
            "condense_plus_context".parse::<ChatMode>().unwrap(),
            ChatMode::CondensePlusContext
        );
        assert_eq!("Simple".parse::<ChatMode>().unwrap(), ChatMode::Simple);
        assert!("react".parse::<ChatMode>().is_err());
        assert_eq!(ChatMode::CondensePlusContext.to_string(), "CONDENSE_PLUS_CONTEXT");
    }

    #[test]
    fn test_display_lists_sources() {
        let mut metadata = Map::new();
        metadata.insert("title".to_string(), Value::String("Heat".to_string()));
        let response = ChatResponse {
            response: "Watch Heat.".to_string(),
            source_nodes: vec![ContextChunk {
                node_id: Uuid::new_v4(),
                title: Some("Heat".to_string()),
                text: "A heist in LA.".to_string(),
                metadata,
                score: 0.8123,
            }],
        };

        let display = response.format_for_display();
        assert!(display.starts_with("Watch Heat."));
        assert!(display.contains("Heat (score: 0.81)"));
        assert_eq!(
            response.contexts(),
            vec!["Metadata:\ntitle: Heat\n-----------\nContent:\nA heist in LA.".to_string()]
        );
    }
}
