//! Splitting documents into overlapping nodes.
//!
//! Sizes are measured in characters. Every node keeps the metadata of the
//! document it was cut from.

mod sentence;
mod window;

pub use sentence::SentenceSplitter;
pub use window::WindowSplitter;

use crate::error::{PlotlineError, Result};
use crate::loading::{display_value, render_with_metadata, MovieDocument};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A chunk of a document, the unit that gets embedded and indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node ID.
    pub id: Uuid,
    /// Document this node was cut from.
    pub document_id: Uuid,
    /// Text slice of the document body.
    pub text: String,
    /// Start offset in the document body (chars, inclusive).
    pub start_char: usize,
    /// End offset in the document body (chars, exclusive).
    pub end_char: usize,
    /// Position of this node within its document.
    pub order: usize,
    /// Metadata inherited from the document.
    pub metadata: Map<String, Value>,
    /// Embedding vector; empty until the node is embedded.
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl Node {
    /// Text sent to the embedder and the LLM: metadata header plus chunk.
    pub fn embed_text(&self) -> String {
        render_with_metadata(&self.metadata, &self.text)
    }

    /// Movie title from the inherited metadata.
    pub fn title(&self) -> Option<String> {
        self.metadata.get("title").map(display_value)
    }
}

/// A span of text produced by a splitter, in char offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Splitting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    /// Fixed-stride character windows.
    Window,
    /// Sentences packed up to the chunk size.
    #[default]
    Sentence,
}

impl std::str::FromStr for ChunkingStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "window" => Ok(ChunkingStrategy::Window),
            "sentence" => Ok(ChunkingStrategy::Sentence),
            _ => Err(format!("Unknown chunking strategy: {}", s)),
        }
    }
}

/// Chunk size and overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap_size: usize,
}

impl ChunkingConfig {
    /// Validated configuration: `chunk_size > 0` and `overlap_size < chunk_size`.
    pub fn new(chunk_size: usize, overlap_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(PlotlineError::InvalidInput(
                "chunk_size must be positive".to_string(),
            ));
        }
        if overlap_size >= chunk_size {
            return Err(PlotlineError::InvalidInput(format!(
                "overlap_size ({}) must be smaller than chunk_size ({})",
                overlap_size, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap_size,
        })
    }

    /// Distance between the starts of adjacent windows.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap_size
    }
}

/// Trait for text splitting implementations.
pub trait Splitter: Send + Sync {
    /// Split text into spans.
    fn split(&self, text: &str) -> Vec<TextSpan>;

    /// Split a document into nodes carrying the document's metadata.
    fn split_document(&self, document: &MovieDocument) -> Vec<Node> {
        self.split(&document.text)
            .into_iter()
            .enumerate()
            .map(|(order, span)| Node {
                id: Uuid::new_v4(),
                document_id: document.id,
                text: span.text,
                start_char: span.start,
                end_char: span.end,
                order,
                metadata: document.metadata.clone(),
                embedding: Vec::new(),
            })
            .collect()
    }

    /// Split many documents, in order.
    fn split_documents(&self, documents: &[MovieDocument]) -> Vec<Node> {
        documents
            .iter()
            .flat_map(|doc| self.split_document(doc))
            .collect()
    }
}

/// Create a splitter for the strategy.
pub fn create_splitter(strategy: ChunkingStrategy, config: ChunkingConfig) -> Box<dyn Splitter> {
    match strategy {
        ChunkingStrategy::Window => Box::new(WindowSplitter::new(config)),
        ChunkingStrategy::Sentence => Box::new(SentenceSplitter::new(config)),
    }
}

/// Char windows over `chars[start..end]`, shared by both splitters.
pub(crate) fn window_spans(
    chars: &[char],
    start: usize,
    end: usize,
    config: ChunkingConfig,
) -> Vec<TextSpan> {
    let mut spans = Vec::new();
    if start >= end {
        return spans;
    }

    let mut window_start = start;
    loop {
        let window_end = (window_start + config.chunk_size).min(end);
        spans.push(TextSpan {
            start: window_start,
            end: window_end,
            text: chars[window_start..window_end].iter().collect(),
        });
        if window_end == end {
            break;
        }
        window_start += config.stride();
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(ChunkingConfig::new(512, 50).is_ok());
        assert!(matches!(
            ChunkingConfig::new(0, 0),
            Err(PlotlineError::InvalidInput(_))
        ));
        assert!(matches!(
            ChunkingConfig::new(100, 100),
            Err(PlotlineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Sentence".parse::<ChunkingStrategy>(), Ok(ChunkingStrategy::Sentence));
        assert_eq!("window".parse::<ChunkingStrategy>(), Ok(ChunkingStrategy::Window));
        assert!("token".parse::<ChunkingStrategy>().is_err());
        assert_eq!(ChunkingStrategy::default(), ChunkingStrategy::Sentence);
    }

    #[test]
    fn test_nodes_inherit_metadata() {
        let mut metadata = Map::new();
        metadata.insert("title".to_string(), Value::String("Heat".to_string()));
        metadata.insert("release_year".to_string(), Value::from(1995));
        let doc = MovieDocument::new("x".repeat(300), metadata, "movies.json".to_string());

        let splitter = create_splitter(
            ChunkingStrategy::Window,
            ChunkingConfig::new(128, 16).unwrap(),
        );
        let nodes = splitter.split_document(&doc);

        assert_eq!(nodes.len(), 3);
        for (i, node) in nodes.iter().enumerate() {
            assert_eq!(node.order, i);
            assert_eq!(node.document_id, doc.id);
            assert_eq!(node.title().as_deref(), Some("Heat"));
        }
        assert!(nodes[0]
            .embed_text()
            .starts_with("Metadata:\ntitle: Heat\nrelease_year: 1995\n"));
    }
}
