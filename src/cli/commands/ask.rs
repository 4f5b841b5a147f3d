//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{Prompts, Settings};
use crate::rag::{EngineBuilder, EngineConfig};
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    model: Option<String>,
    collection: Option<String>,
    top_k: Option<usize>,
    settings: Settings,
) -> Result<()> {
    let mut config = EngineConfig::from_settings(&settings)?;
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(collection) = collection {
        config.collection = collection;
    }
    if let Some(top_k) = top_k {
        config.top_k = top_k;
    }

    if let Err(e) = preflight::check(Operation::Answer { model: config.model.as_str() }, &settings).await {
        Output::error(&format!("{}", e));
        Output::info("Run 'plotline doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let prompts = Prompts::load(settings.prompts.custom_dir.as_deref())?;
    let engine = EngineBuilder::new(settings, prompts)?
        .query_engine(&config)
        .await?;

    let spinner = Output::spinner("Searching movie plots...");

    match engine.query(question).await {
        Ok(response) => {
            spinner.finish_and_clear();

            println!("\n{}\n", response.response);

            if !response.source_nodes.is_empty() {
                Output::header("Sources");
                for node in &response.source_nodes {
                    Output::source_node(node);
                }
            }
        }
        Err(e) => {
            spinner.finish_and_clear();
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
