//! CLI module for Plotline.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Plotline - chat with a movie-plot knowledge base
///
/// Ingests movie records into a vector store, answers questions with a
/// retrieval-augmented chat engine on local models, and evaluates the answers.
#[derive(Parser, Debug)]
#[command(name = "plotline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check services and configuration
    Doctor,

    /// Chunk, embed and store movie records
    Ingest {
        /// JSON file with an array of movie records
        input: PathBuf,

        /// Chunk size and overlap as SIZE:OVERLAP; repeat for one collection per pair
        #[arg(long = "chunks", value_name = "SIZE:OVERLAP")]
        chunks: Vec<String>,

        /// Vector store backend (local, chromadb, qdrant)
        #[arg(short, long)]
        backend: Option<String>,

        /// Splitting strategy (sentence, window)
        #[arg(long)]
        strategy: Option<String>,

        /// Delete the collection's previous contents first (chromadb, qdrant)
        #[arg(long)]
        reset: bool,

        /// Use the raw JSON record as document text
        #[arg(long)]
        raw: bool,
    },

    /// Shuffle movie records and split them 80/20 into train and test files
    Split {
        /// JSON file with an array of movie records
        input: PathBuf,

        /// Directory for train.json and test.json
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Seed for a reproducible shuffle
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Ask a single question
    Ask {
        /// The question to ask
        question: String,

        /// Model selector (e.g. oll_llama3_instruct)
        #[arg(short, long)]
        model: Option<String>,

        /// Collection to retrieve from
        #[arg(long)]
        collection: Option<String>,

        /// Number of nodes to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Start an interactive chat session
    Chat {
        /// Model selector (e.g. oll_llama3_instruct)
        #[arg(short, long)]
        model: Option<String>,

        /// Collection to retrieve from
        #[arg(long)]
        collection: Option<String>,

        /// Chat mode (simple, context, condense_plus_context)
        #[arg(long)]
        mode: Option<String>,
    },

    /// Serve one chat session over HTTP
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Model selector (e.g. oll_llama3_instruct)
        #[arg(short, long)]
        model: Option<String>,

        /// Collection to retrieve from
        #[arg(long)]
        collection: Option<String>,

        /// Chat mode (simple, context, condense_plus_context)
        #[arg(long)]
        mode: Option<String>,
    },

    /// Evaluate answer quality
    Eval {
        #[command(subcommand)]
        action: EvalAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum EvalAction {
    /// Create the evaluation database tables
    Init,

    /// Answer every dataset question for every collection, model and chat mode
    Run {
        /// QnA dataset (defaults to evaluation.dataset_path)
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Collections to evaluate (defaults to evaluation.collections)
        #[arg(long = "collection")]
        collections: Vec<String>,

        /// Model selectors to evaluate (defaults to evaluation.models)
        #[arg(long = "model")]
        models: Vec<String>,

        /// Chat modes to evaluate (defaults to evaluation.chat_modes)
        #[arg(long = "mode")]
        modes: Vec<String>,
    },

    /// Score answers with an LLM judge
    Judge {
        #[command(subcommand)]
        judge: JudgeAction,
    },

    /// Compare the system prompt templates
    Prompts {
        /// File whose first line lists question ids, e.g. "1, 2, 3"
        #[arg(long)]
        ids: Option<PathBuf>,

        /// Template ids to use (0-4, defaults to all)
        #[arg(long = "template")]
        templates: Vec<u8>,

        /// Collections to use (defaults to evaluation.collections)
        #[arg(long = "collection")]
        collections: Vec<String>,

        /// Model selectors to use (defaults to evaluation.models)
        #[arg(long = "model")]
        models: Vec<String>,

        /// Directory for the Markdown transcripts
        #[arg(long)]
        results_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum JudgeAction {
    /// Does the response address the query?
    AnswerRelevancy {
        query: String,

        /// Response to judge; generated with the query engine when omitted
        #[arg(long)]
        response: Option<String>,

        /// Collection used to generate the response
        #[arg(long)]
        collection: Option<String>,

        /// Model selector used to generate the response
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Can the contexts answer the query?
    ContextRelevancy {
        query: String,

        /// Context text; retrieved from the collection when omitted
        #[arg(long = "context")]
        contexts: Vec<String>,

        /// Collection to retrieve from
        #[arg(long)]
        collection: Option<String>,
    },

    /// Which of two responses is better?
    Pairwise {
        query: String,

        /// First response
        #[arg(long)]
        response: String,

        /// Second response
        #[arg(long)]
        second_response: String,

        /// Reference text shown to the judge
        #[arg(long)]
        reference: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
