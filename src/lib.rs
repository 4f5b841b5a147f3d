//! Plotline - chat with a movie-plot knowledge base
//!
//! A local-first retrieval-augmented chatbot over a movie-plot dataset, with a
//! harness that evaluates answer quality across models, chat modes and
//! collections.
//!
//! # Overview
//!
//! Plotline allows you to:
//! - Chunk and embed movie records into Qdrant, Chroma or a local SQLite store
//! - Chat with local Ollama models grounded on the retrieved plots
//! - Answer a QnA dataset for every model, chat mode and collection
//! - Score answers with LLM judges and compare system prompts
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `loading` - Movie records to documents
//! - `chunking` - Documents to nodes
//! - `embedding` - Embedding generation
//! - `llm` - Chat model backends
//! - `vector_store` - Vector store backends
//! - `ingest` - The ingestion pipeline
//! - `rag` - Retrieval, query and chat engines
//! - `evaluation` - Evaluation store, harness and judges
//!
//! # Example
//!
//! ```rust,no_run
//! use plotline::chunking::ChunkingConfig;
//! use plotline::config::Settings;
//! use plotline::ingest::{CollectionSpec, IngestOptions, IngestionPipeline};
//! use plotline::loading::Loader;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let documents = Loader::from_path("data/wiki_movie_plots.json", true)?.documents();
//!
//!     let collection = CollectionSpec::from_settings(&settings, 512, 50).name();
//!     let options = IngestOptions::new(collection, ChunkingConfig::new(512, 50)?);
//!     let report = IngestionPipeline::new(settings)?
//!         .run(&documents, "qdrant", &options)
//!         .await?;
//!     println!("Stored {} nodes in {}", report.written, report.collection);
//!
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod ingest;
pub mod llm;
pub mod loading;
pub mod rag;
pub mod vector_store;

pub use error::{PlotlineError, Result};
