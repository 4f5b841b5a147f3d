//! Plotline CLI entry point.

use anyhow::Result;
use clap::Parser;
use plotline::cli::{commands, Cli, Commands};
use plotline::config::Settings;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.as_ref().map(PathBuf::from);
    let settings = Settings::load_from(config_path.as_ref())?;

    // Initialize logging
    let log_level = match cli.verbose {
        0 if settings.general.debug => "debug",
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("plotline={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Execute command
    match &cli.command {
        Commands::Doctor => {
            commands::run_doctor(&settings).await?;
        }

        Commands::Ingest {
            input,
            chunks,
            backend,
            strategy,
            reset,
            raw,
        } => {
            commands::run_ingest(
                input,
                chunks,
                backend.clone(),
                strategy.clone(),
                *reset,
                *raw,
                settings,
            )
            .await?;
        }

        Commands::Split {
            input,
            output_dir,
            seed,
        } => {
            commands::run_split(input, output_dir, *seed)?;
        }

        Commands::Ask {
            question,
            model,
            collection,
            top_k,
        } => {
            commands::run_ask(question, model.clone(), collection.clone(), *top_k, settings).await?;
        }

        Commands::Chat {
            model,
            collection,
            mode,
        } => {
            commands::run_chat(model.clone(), collection.clone(), mode.clone(), settings).await?;
        }

        Commands::Serve {
            host,
            port,
            model,
            collection,
            mode,
        } => {
            commands::run_serve(
                host,
                *port,
                model.clone(),
                collection.clone(),
                mode.clone(),
                settings,
            )
            .await?;
        }

        Commands::Eval { action } => {
            commands::run_eval(action, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, config_path.as_ref(), settings)?;
        }
    }

    Ok(())
}
