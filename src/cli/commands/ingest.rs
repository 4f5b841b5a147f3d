//! Ingest and split command implementations.

use crate::chunking::{ChunkingConfig, ChunkingStrategy};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::embedding::create_embedder;
use crate::ingest::{CollectionSpec, IngestOptions, IngestionPipeline};
use crate::loading::Loader;
use crate::vector_store::BackendKind;
use anyhow::{anyhow, Context, Result};
use std::path::Path;

/// Run the ingest command.
pub async fn run_ingest(
    input: &Path,
    chunks: &[String],
    backend: Option<String>,
    strategy: Option<String>,
    reset: bool,
    raw: bool,
    settings: Settings,
) -> Result<()> {
    let backend_name = backend.unwrap_or_else(|| settings.vector_store.backend.clone());
    let backend: BackendKind = backend_name.parse()?;

    let strategy: ChunkingStrategy = strategy
        .as_deref()
        .unwrap_or(&settings.chunking.strategy)
        .parse()
        .map_err(|e: String| anyhow!(e))?;

    let pairs = if chunks.is_empty() {
        vec![(settings.chunking.chunk_size, settings.chunking.overlap_size)]
    } else {
        chunks
            .iter()
            .map(|pair| parse_chunk_pair(pair))
            .collect::<Result<Vec<_>>>()?
    };
    let configs = pairs
        .into_iter()
        .map(|(size, overlap)| ChunkingConfig::new(size, overlap))
        .collect::<crate::Result<Vec<_>>>()?;

    if let Err(e) = preflight::check(Operation::Ingest { backend }, &settings).await {
        Output::error(&format!("{}", e));
        Output::info("Run 'plotline doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let loader = Loader::from_path(input, !raw)?;
    let documents = loader.documents();
    Output::info(&format!(
        "Loaded {} movies from {}",
        documents.len(),
        input.display()
    ));

    if reset && backend.overwrites_on_ingest() {
        Output::info("The local backend always replaces the collection; --reset is implied.");
    }

    let embedder = create_embedder(&settings)?;

    for chunking in configs {
        let collection =
            CollectionSpec::from_settings(&settings, chunking.chunk_size, chunking.overlap_size)
                .name();
        let options = IngestOptions {
            strategy,
            chunking,
            collection: collection.clone(),
            reset_collection: reset,
        };

        let pb = Output::progress_bar(0, &format!("Embedding {}", collection));
        let progress = pb.clone();
        let pipeline = IngestionPipeline::with_embedder(settings.clone(), embedder.clone())
            .on_progress(move |done, total| {
                progress.set_length(total as u64);
                progress.set_position(done as u64);
            });

        match pipeline.run(&documents, &backend_name, &options).await {
            Ok(report) => {
                pb.finish_and_clear();
                Output::success(&format!(
                    "Stored {} nodes from {} movies in {} ({})",
                    report.written, report.documents, report.collection, backend
                ));
            }
            Err(e) => {
                pb.abandon();
                Output::error(&format!("Failed to ingest into {}: {}", collection, e));
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Run the split command.
pub fn run_split(input: &Path, output_dir: &Path, seed: Option<u64>) -> Result<()> {
    let mut loader = Loader::from_path(input, true)?;
    let (train, test) = loader.train_test_split(seed);

    let (train_records, test_records) = loader.records().split_at(train.len());
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let train_path = output_dir.join("train.json");
    let test_path = output_dir.join("test.json");
    std::fs::write(&train_path, serde_json::to_string_pretty(train_records)?)?;
    std::fs::write(&test_path, serde_json::to_string_pretty(test_records)?)?;

    Output::success(&format!(
        "Split {} movies: {} training, {} test",
        train.len() + test.len(),
        train.len(),
        test.len()
    ));
    Output::kv("Training", &train_path.display().to_string());
    Output::kv("Test", &test_path.display().to_string());
    if seed.is_none() {
        Output::info("No --seed given; the split differs on every run.");
    }

    Ok(())
}

/// Parse `SIZE:OVERLAP`.
fn parse_chunk_pair(pair: &str) -> Result<(usize, usize)> {
    let (size, overlap) = pair
        .split_once(':')
        .ok_or_else(|| anyhow!("Expected SIZE:OVERLAP, got '{}'", pair))?;
    let size = size
        .trim()
        .parse()
        .with_context(|| format!("Invalid chunk size in '{}'", pair))?;
    let overlap = overlap
        .trim()
        .parse()
        .with_context(|| format!("Invalid overlap in '{}'", pair))?;
    Ok((size, overlap))
}
