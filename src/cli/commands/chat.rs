//! Interactive chat command.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{Prompts, Settings};
use crate::rag::{ChatEngine, EngineBuilder, EngineConfig, EngineFactory};
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};

/// Engine configuration from the settings and command-line overrides.
pub(crate) fn engine_config(
    settings: &Settings,
    model: Option<String>,
    collection: Option<String>,
    mode: Option<String>,
) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_settings(settings)?;
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(collection) = collection {
        config.collection = collection;
    }
    if let Some(mode) = mode {
        config.mode = mode.parse()?;
    }
    Ok(config)
}

/// Build a chat engine after checking that its services are reachable.
pub(crate) async fn build_chat_engine(config: &EngineConfig, settings: Settings) -> Result<ChatEngine> {
    if let Err(e) = preflight::check(Operation::Answer { model: config.model.as_str() }, &settings).await {
        Output::error(&format!("{}", e));
        Output::info("Run 'plotline doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let prompts = Prompts::load(settings.prompts.custom_dir.as_deref())?;
    let builder = EngineBuilder::new(settings, prompts)?;
    Ok(builder.chat_engine(config).await?)
}

/// Run the interactive chat command.
pub async fn run_chat(
    model: Option<String>,
    collection: Option<String>,
    mode: Option<String>,
    settings: Settings,
) -> Result<()> {
    let config = engine_config(&settings, model, collection, mode)?;
    let mut engine = build_chat_engine(&config, settings).await?;

    println!("\n{}", style("Plotline Chat").bold().cyan());
    println!(
        "{}",
        style(format!(
            "{} on {} ({})",
            engine.model_name(),
            engine.collection(),
            engine.mode()
        ))
        .dim()
    );
    println!(
        "{}\n",
        style("Ask about movies, or 'exit' to quit. Use 'clear' to reset the conversation.").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            engine.reset();
            Output::info("Conversation history cleared.");
            continue;
        }

        let spinner = Output::spinner("Thinking...");
        let result = engine.chat(input).await;
        spinner.finish_and_clear();

        match result {
            Ok(response) => {
                println!("\n{} {}\n", style("Plotline:").cyan().bold(), response.response);
                if !response.source_nodes.is_empty() {
                    for node in &response.source_nodes {
                        Output::source_node(node);
                    }
                    println!();
                }
            }
            Err(e) => {
                Output::error(&format!("Error: {}", e));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::ChatMode;

    #[test]
    fn test_engine_config_overrides() {
        let settings = Settings::default();

        let config = engine_config(&settings, None, None, None).unwrap();
        assert_eq!(config.model, "oll_llama3_instruct");
        assert_eq!(config.mode, ChatMode::CondensePlusContext);

        let config = engine_config(
            &settings,
            Some("oll_gemma_instruct".to_string()),
            Some("wiki_movie_plots_512_50_mxbai".to_string()),
            Some("CONTEXT".to_string()),
        )
        .unwrap();
        assert_eq!(config.model, "oll_gemma_instruct");
        assert_eq!(config.collection, "wiki_movie_plots_512_50_mxbai");
        assert_eq!(config.mode, ChatMode::Context);

        assert!(engine_config(&settings, None, None, Some("agent".to_string())).is_err());
    }
}
