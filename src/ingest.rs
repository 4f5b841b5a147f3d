//! Ingestion pipeline for Plotline.
//!
//! Splits documents into nodes, embeds them and writes them into one
//! collection of the selected vector store backend.

use crate::chunking::{create_splitter, ChunkingConfig, ChunkingStrategy, Node};
use crate::config::Settings;
use crate::embedding::{create_embedder, Embedder};
use crate::error::Result;
use crate::loading::MovieDocument;
use crate::vector_store::{open_store, BackendKind, VectorStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Collection naming: `{prefix}_{chunk_size}_{overlap_size}_{embed_tag}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub prefix: String,
    pub chunk_size: usize,
    pub overlap_size: usize,
    pub embed_tag: String,
}

impl CollectionSpec {
    /// Collection spec for a chunk/overlap pair under the configured prefix and tag.
    pub fn from_settings(settings: &Settings, chunk_size: usize, overlap_size: usize) -> Self {
        Self {
            prefix: settings.vector_store.collection_prefix.clone(),
            chunk_size,
            overlap_size,
            embed_tag: settings.embedding.tag.clone(),
        }
    }

    /// The collection name.
    pub fn name(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.prefix, self.chunk_size, self.overlap_size, self.embed_tag
        )
    }
}

/// Options for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub strategy: ChunkingStrategy,
    pub chunking: ChunkingConfig,
    pub collection: String,
    /// Delete the collection's prior contents first (chromadb, qdrant).
    pub reset_collection: bool,
}

impl IngestOptions {
    /// Sentence-split options for `collection`, without reset.
    pub fn new(collection: impl Into<String>, chunking: ChunkingConfig) -> Self {
        Self {
            strategy: ChunkingStrategy::default(),
            chunking,
            collection: collection.into(),
            reset_collection: false,
        }
    }
}

/// Summary of an ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub collection: String,
    pub documents: usize,
    pub nodes: usize,
    pub written: usize,
}

type ProgressFn = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Documents to nodes to embeddings to vector store.
pub struct IngestionPipeline {
    settings: Settings,
    embedder: Arc<dyn Embedder>,
    on_progress: Option<ProgressFn>,
}

impl IngestionPipeline {
    /// Create a pipeline with the configured embedder.
    pub fn new(settings: Settings) -> Result<Self> {
        let embedder = create_embedder(&settings)?;
        Ok(Self::with_embedder(settings, embedder))
    }

    /// Create a pipeline with a custom embedder.
    pub fn with_embedder(settings: Settings, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            settings,
            embedder,
            on_progress: None,
        }
    }

    /// Report `(embedded, total)` node counts after each embedding batch.
    pub fn on_progress(mut self, f: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Get the embedder.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    /// Ingest `documents` into `backend`.
    ///
    /// The backend name is resolved before anything else happens: an
    /// unsupported name fails with `UnsupportedBackend` and nothing is split,
    /// embedded or written.
    #[instrument(skip(self, documents, options), fields(collection = %options.collection))]
    pub async fn run(
        &self,
        documents: &[MovieDocument],
        backend: &str,
        options: &IngestOptions,
    ) -> Result<IngestReport> {
        let backend: BackendKind = backend.parse()?;
        let store = open_store(
            backend,
            &options.collection,
            &self.settings,
            self.embedder.dimensions(),
        )
        .await?;

        self.run_into(documents, store.as_ref(), backend.overwrites_on_ingest(), options)
            .await
    }

    /// Ingest into an already opened store.
    ///
    /// With `overwrite` the collection is replaced wholesale. Otherwise nodes
    /// are appended, after an explicit reset if `options.reset_collection`
    /// is set.
    pub async fn run_into(
        &self,
        documents: &[MovieDocument],
        store: &dyn VectorStore,
        overwrite: bool,
        options: &IngestOptions,
    ) -> Result<IngestReport> {
        let splitter = create_splitter(options.strategy, options.chunking);
        let mut nodes = splitter.split_documents(documents);
        info!(
            "Split {} documents into {} nodes ({:?}, {}/{})",
            documents.len(),
            nodes.len(),
            options.strategy,
            options.chunking.chunk_size,
            options.chunking.overlap_size
        );

        self.embed_nodes(&mut nodes).await?;

        let written = if overwrite {
            store.replace(&nodes).await?
        } else {
            if options.reset_collection {
                warn!(
                    "Resetting collection {}; its previous contents are deleted",
                    store.collection()
                );
                store.reset().await?;
            }
            store.add(&nodes).await?
        };

        info!("Wrote {} nodes to {}", written, store.collection());

        Ok(IngestReport {
            collection: store.collection().to_string(),
            documents: documents.len(),
            nodes: nodes.len(),
            written,
        })
    }

    async fn embed_nodes(&self, nodes: &mut [Node]) -> Result<()> {
        let total = nodes.len();
        let batch_size = self.settings.embedding.batch_size.max(1);
        let mut done = 0;

        for batch in nodes.chunks_mut(batch_size) {
            let texts: Vec<String> = batch.iter().map(|n| n.embed_text()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            for (node, embedding) in batch.iter_mut().zip(embeddings) {
                node.embedding = embedding;
            }

            done += batch.len();
            debug!("Embedded {}/{} nodes", done, total);
            if let Some(report) = &self.on_progress {
                report(done, total);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::error::PlotlineError;
    use crate::chunking::Splitter;
    use crate::loading::Loader;
    use crate::rag::ContextBuilder;
    use crate::vector_store::{open_existing_store, MemoryVectorStore, SqliteVectorStore};
    use std::io::Write;

    const RECORDS: &str = r#"[
        {"title": "The Karate Kid", "release_year": 1984,
         "plot": "Daniel LaRusso learns karate from Mr. Miyagi, a handyman and martial arts master."},
        {"title": "Top Gun", "release_year": 1986,
         "plot": "Maverick, a hotshot naval aviator, trains at the fighter weapons school."},
        {"title": "Alien", "release_year": 1979,
         "plot": "The crew of the Nostromo is hunted by a deadly creature aboard their ship."}
    ]"#;

    fn test_settings(root: &std::path::Path) -> Settings {
        let mut settings = Settings::default();
        settings.general.root_dir = root.to_string_lossy().to_string();
        settings.embedding.batch_size = 2;
        settings
    }

    fn load_documents() -> Vec<MovieDocument> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RECORDS.as_bytes()).unwrap();
        Loader::from_path(file.path(), true).unwrap().documents()
    }

    fn pipeline(settings: Settings) -> IngestionPipeline {
        IngestionPipeline::with_embedder(settings, Arc::new(HashingEmbedder::new(256)))
    }

    #[test]
    fn test_collection_name() {
        let spec = CollectionSpec {
            prefix: "wiki_movie_plots".to_string(),
            chunk_size: 512,
            overlap_size: 50,
            embed_tag: "mxbai".to_string(),
        };
        assert_eq!(spec.name(), "wiki_movie_plots_512_50_mxbai");
    }

    #[tokio::test]
    async fn test_query_returns_matching_record() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(test_settings(dir.path()));
        let store = MemoryVectorStore::new("movies_64_8_hash");
        let mut options = IngestOptions::new("movies_64_8_hash", ChunkingConfig::new(64, 8).unwrap());
        options.strategy = ChunkingStrategy::Window;

        let documents = load_documents();
        let report = pipeline
            .run_into(&documents, &store, false, &options)
            .await
            .unwrap();

        assert_eq!(report.documents, 3);
        assert_eq!(report.written, report.nodes);
        assert!(report.nodes > 3);

        let query = pipeline
            .embedder()
            .embed("naval aviator Maverick fighter weapons school")
            .await
            .unwrap();
        let results = store.search(&query, 1).await.unwrap();

        assert_eq!(results[0].node.title().as_deref(), Some("Top Gun"));
        assert_eq!(results[0].node.metadata["release_year"], 1986);
    }

    #[tokio::test]
    async fn test_local_ingest_then_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        let pipeline = pipeline(settings.clone());
        let options = IngestOptions::new("movies_512_50_hash", ChunkingConfig::new(512, 50).unwrap());

        let report = pipeline
            .run(&load_documents(), "local", &options)
            .await
            .unwrap();
        assert_eq!(report.nodes, 3);

        let store = open_existing_store(BackendKind::Local, "movies_512_50_hash", &settings)
            .await
            .unwrap();
        let chunks = ContextBuilder::new(store, pipeline.embedder())
            .with_top_k(2)
            .build("Which movie follows Maverick, a hotshot naval aviator?")
            .await
            .unwrap();

        let titles: Vec<_> = chunks.iter().map(|c| c.title.as_deref()).collect();
        assert!(titles.contains(&Some("Top Gun")), "top-k titles: {:?}", titles);
        let top_gun = chunks
            .iter()
            .find(|c| c.title.as_deref() == Some("Top Gun"))
            .unwrap();
        assert_eq!(top_gun.metadata["release_year"], 1986);
    }

    #[test]
    fn test_default_options_split_on_sentences() {
        let options = IngestOptions::new("movies", ChunkingConfig::new(48, 0).unwrap());
        assert_eq!(options.strategy, ChunkingStrategy::Sentence);

        let splitter = create_splitter(options.strategy, options.chunking);
        let nodes = splitter.split_document(&load_documents()[0]);

        let texts: Vec<&str> = nodes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "title: The Karate Kid\nrelease_year: 1984\n",
                "plot: Daniel LaRusso learns karate from Mr. ",
                "Miyagi, a handyman and martial arts master.\n",
            ]
        );
    }

    #[tokio::test]
    async fn test_local_backend_overwrites_collection() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        let pipeline = pipeline(settings.clone());
        let options = IngestOptions::new("movies_1024_100_hash", ChunkingConfig::new(1024, 100).unwrap());
        let documents = load_documents();

        pipeline.run(&documents, "local", &options).await.unwrap();
        let report = pipeline.run(&documents, "local", &options).await.unwrap();
        assert_eq!(report.written, 3);

        let db = settings.local_store_dir().join(crate::vector_store::LOCAL_DB_FILE);
        let store = SqliteVectorStore::new(&db, "movies_1024_100_hash").unwrap();
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_append_and_explicit_reset() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(test_settings(dir.path()));
        let store = MemoryVectorStore::new("movies");
        let mut options = IngestOptions::new("movies", ChunkingConfig::new(1024, 100).unwrap());
        let documents = load_documents();

        pipeline.run_into(&documents, &store, false, &options).await.unwrap();
        pipeline.run_into(&documents, &store, false, &options).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 6);

        options.reset_collection = true;
        pipeline.run_into(&documents, &store, false, &options).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unsupported_backend_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        let pipeline = pipeline(settings.clone());
        let options = IngestOptions::new("movies", ChunkingConfig::new(512, 50).unwrap());

        let err = pipeline
            .run(&load_documents(), "pinecone", &options)
            .await
            .unwrap_err();

        assert!(matches!(err, PlotlineError::UnsupportedBackend(_)));
        assert!(!settings.local_store_dir().exists());
    }

    #[tokio::test]
    async fn test_progress_reports_each_batch() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let pipeline = pipeline(test_settings(dir.path()))
            .on_progress(move |done, total| sink.lock().unwrap().push((done, total)));
        let store = MemoryVectorStore::new("movies");
        let options = IngestOptions::new("movies", ChunkingConfig::new(1024, 100).unwrap());

        pipeline
            .run_into(&load_documents(), &store, false, &options)
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(2, 3), (3, 3)]);
    }
}
