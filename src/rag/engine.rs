//! Query and chat engines.

use super::context::format_context_for_prompt;
use super::{ChatMode, ChatResponse, ContextBuilder, ContextChunk};
use crate::config::{Prompts, RagPrompts, Settings};
use crate::embedding::{create_embedder, Embedder};
use crate::error::Result;
use crate::llm::{load_llm, ChatMessage, ChatModel, Role};
use crate::vector_store::{open_existing_store, BackendKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Stateless retrieval plus completion.
pub struct QueryEngine {
    llm: Arc<dyn ChatModel>,
    context_builder: ContextBuilder,
    system_prompt: String,
    prompts: RagPrompts,
}

impl QueryEngine {
    /// Create a new query engine.
    pub fn new(
        llm: Arc<dyn ChatModel>,
        context_builder: ContextBuilder,
        system_prompt: impl Into<String>,
        prompts: RagPrompts,
    ) -> Self {
        Self {
            llm,
            context_builder,
            system_prompt: system_prompt.into(),
            prompts,
        }
    }

    /// Answer a single question.
    #[instrument(skip(self), fields(question = %question))]
    pub async fn query(&self, question: &str) -> Result<ChatResponse> {
        let source_nodes = self.context_builder.build(question).await?;
        let system = context_system_prompt(&self.system_prompt, &self.prompts.context, &source_nodes);

        let response = self
            .llm
            .chat(&[ChatMessage::system(system), ChatMessage::user(question)])
            .await?;

        debug!("Generated response with {} sources", source_nodes.len());
        Ok(ChatResponse {
            response,
            source_nodes,
        })
    }
}

/// A chat session with history.
///
/// History lives as long as the engine and is never shared between engines.
pub struct ChatEngine {
    llm: Arc<dyn ChatModel>,
    context_builder: ContextBuilder,
    mode: ChatMode,
    system_prompt: String,
    prompts: RagPrompts,
    history: Vec<ChatMessage>,
    max_history: usize,
}

impl ChatEngine {
    /// Create a new chat engine.
    pub fn new(
        llm: Arc<dyn ChatModel>,
        context_builder: ContextBuilder,
        mode: ChatMode,
        system_prompt: impl Into<String>,
        prompts: RagPrompts,
    ) -> Self {
        Self {
            llm,
            context_builder,
            mode,
            system_prompt: system_prompt.into(),
            prompts,
            history: Vec::new(),
            max_history: 20,
        }
    }

    /// Cap the number of history messages kept.
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    pub fn collection(&self) -> &str {
        self.context_builder.collection()
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Messages exchanged so far, oldest first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Send a message and get the reply.
    #[instrument(skip(self), fields(mode = %self.mode, message = %message))]
    pub async fn chat(&mut self, message: &str) -> Result<ChatResponse> {
        info!("Chat message: {}", message);

        let (system, source_nodes) = match self.mode {
            ChatMode::Simple => (self.system_prompt.clone(), Vec::new()),
            ChatMode::Context => {
                let nodes = self.context_builder.build(message).await?;
                let system = context_system_prompt(&self.system_prompt, &self.prompts.context, &nodes);
                (system, nodes)
            }
            ChatMode::CondensePlusContext => {
                let question = self.condense_question(message).await?;
                let nodes = self.context_builder.build(&question).await?;
                let system =
                    context_system_prompt(&self.system_prompt, &self.prompts.condense_context, &nodes);
                (system, nodes)
            }
        };

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if !system.trim().is_empty() {
            messages.push(ChatMessage::system(system));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(message));

        let response = self.llm.chat(&messages).await?;

        self.history.push(ChatMessage::user(message));
        self.history.push(ChatMessage::assistant(response.clone()));
        self.trim_history();

        Ok(ChatResponse {
            response,
            source_nodes,
        })
    }

    /// Clear the conversation history.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Rewrite the message as a standalone question using the history.
    async fn condense_question(&self, message: &str) -> Result<String> {
        if self.history.is_empty() {
            return Ok(message.to_string());
        }

        let chat_history = self
            .history
            .iter()
            .map(|m| match m.role {
                Role::User => format!("user: {}", m.content),
                Role::Assistant => format!("assistant: {}", m.content),
                Role::System => format!("system: {}", m.content),
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut vars = HashMap::new();
        vars.insert("chat_history", chat_history);
        vars.insert("question", message.to_string());
        let prompt = Prompts::render(&self.prompts.condense, &vars);

        let condensed = self.llm.complete(&prompt).await?;
        let condensed = condensed.trim();
        debug!("Condensed question: {}", condensed);

        Ok(if condensed.is_empty() {
            message.to_string()
        } else {
            condensed.to_string()
        })
    }

    /// Drop the oldest turns once the history exceeds the cap.
    fn trim_history(&mut self) {
        if self.history.len() > self.max_history {
            let mut excess = self.history.len() - self.max_history;
            // Keep user/assistant pairs together.
            excess += excess % 2;
            self.history.drain(..excess.min(self.history.len()));
        }
    }
}

fn context_system_prompt(system_prompt: &str, template: &str, chunks: &[ContextChunk]) -> String {
    let mut vars = HashMap::new();
    vars.insert("context", format_context_for_prompt(chunks));
    let context = Prompts::render(template, &vars);

    if system_prompt.trim().is_empty() {
        context
    } else {
        format!("{}\n{}", system_prompt, context)
    }
}

/// What an engine is built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub collection: String,
    /// Model selector, e.g. `oll_llama3_instruct`.
    pub model: String,
    pub mode: ChatMode,
    pub top_k: usize,
    /// Overrides the configured system prompt.
    pub system_prompt: Option<String>,
}

impl EngineConfig {
    /// Configuration from the `rag` settings section.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            collection: settings.vector_store.collection.clone(),
            model: settings.llm.default_model.clone(),
            mode: settings.rag.chat_mode.parse()?,
            top_k: settings.rag.top_k,
            system_prompt: settings.rag.system_prompt.clone(),
        })
    }
}

/// Builds chat engines on demand.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn chat_engine(&self, config: &EngineConfig) -> Result<ChatEngine>;
}

/// Builds engines against the configured vector store backend and models.
pub struct EngineBuilder {
    settings: Settings,
    prompts: Prompts,
    embedder: Arc<dyn Embedder>,
}

impl EngineBuilder {
    /// Create a builder with the configured embedder.
    pub fn new(settings: Settings, prompts: Prompts) -> Result<Self> {
        let embedder = create_embedder(&settings)?;
        Ok(Self {
            settings,
            prompts,
            embedder,
        })
    }

    async fn context_builder(&self, config: &EngineConfig) -> Result<ContextBuilder> {
        let backend: BackendKind = self.settings.vector_store.backend.parse()?;
        let store = open_existing_store(backend, &config.collection, &self.settings).await?;
        Ok(ContextBuilder::new(store, self.embedder.clone()).with_top_k(config.top_k))
    }

    fn system_prompt(&self, config: &EngineConfig) -> String {
        config
            .system_prompt
            .clone()
            .unwrap_or_else(|| self.prompts.rag.system.clone())
    }

    /// Build a stateless query engine.
    pub async fn query_engine(&self, config: &EngineConfig) -> Result<QueryEngine> {
        let llm = load_llm(&config.model, &self.settings.llm)?;
        let context_builder = self.context_builder(config).await?;
        Ok(QueryEngine::new(
            llm,
            context_builder,
            self.system_prompt(config),
            self.prompts.rag.clone(),
        ))
    }
}

#[async_trait]
impl EngineFactory for EngineBuilder {
    async fn chat_engine(&self, config: &EngineConfig) -> Result<ChatEngine> {
        let llm = load_llm(&config.model, &self.settings.llm)?;
        let context_builder = self.context_builder(config).await?;
        info!(
            "Chat engine: {} on {} ({})",
            config.model, config.collection, config.mode
        );
        Ok(ChatEngine::new(
            llm,
            context_builder,
            config.mode,
            self.system_prompt(config),
            self.prompts.rag.clone(),
        )
        .with_max_history(self.settings.rag.max_history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::error::PlotlineError;
    use crate::llm::testing::ScriptedModel;
    use crate::vector_store::{test_node, MemoryVectorStore, VectorStore};

    async fn context_builder() -> ContextBuilder {
        let embedder = Arc::new(HashingEmbedder::new(128));
        let store = Arc::new(MemoryVectorStore::new("movies"));
        let mut nodes = vec![
            test_node("Top Gun", "Maverick trains as a naval fighter pilot.", Vec::new()),
            test_node("Babe", "A pig learns to herd sheep.", Vec::new()),
        ];
        for node in &mut nodes {
            node.embedding = embedder.embed(&node.embed_text()).await.unwrap();
        }
        store.add(&nodes).await.unwrap();
        ContextBuilder::new(store, embedder).with_top_k(1)
    }

    fn engine(llm: Arc<ScriptedModel>, builder: ContextBuilder, mode: ChatMode) -> ChatEngine {
        ChatEngine::new(llm, builder, mode, "You are a movie expert.", RagPrompts::default())
    }

    #[tokio::test]
    async fn test_query_engine_includes_context() {
        let llm = Arc::new(ScriptedModel::new(&["Watch Top Gun."]));
        let engine = QueryEngine::new(
            llm.clone(),
            context_builder().await,
            "You are a movie expert.",
            RagPrompts::default(),
        );

        let response = engine.query("naval fighter pilot movie").await.unwrap();
        assert_eq!(response.response, "Watch Top Gun.");
        assert_eq!(response.source_nodes[0].title.as_deref(), Some("Top Gun"));

        let requests = llm.requests.lock().unwrap();
        let system = &requests[0][0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.starts_with("You are a movie expert.\n"));
        assert!(system.content.contains("Maverick trains"));
    }

    #[tokio::test]
    async fn test_context_mode_keeps_history() {
        let llm = Arc::new(ScriptedModel::new(&["First answer.", "Second answer."]));
        let mut engine = engine(llm.clone(), context_builder().await, ChatMode::Context);

        engine.chat("naval fighter pilot movie").await.unwrap();
        let response = engine.chat("who is the hero?").await.unwrap();

        assert_eq!(response.response, "Second answer.");
        assert_eq!(engine.history().len(), 4);

        let requests = llm.requests.lock().unwrap();
        // system + first user + first answer + second user
        assert_eq!(requests[1].len(), 4);
        assert_eq!(requests[1][2].content, "First answer.");
    }

    #[tokio::test]
    async fn test_condense_plus_context_rewrites_follow_up() {
        let llm = Arc::new(ScriptedModel::new(&[
            "Top Gun is great.",
            "Which naval fighter pilot movie stars Maverick?",
            "That is Top Gun.",
        ]));
        let mut engine = engine(llm.clone(), context_builder().await, ChatMode::CondensePlusContext);

        // No history yet: no condense call.
        engine.chat("naval fighter pilot movie").await.unwrap();
        assert_eq!(llm.request_count(), 1);

        let response = engine.chat("and who stars in it?").await.unwrap();
        assert_eq!(response.response, "That is Top Gun.");
        assert_eq!(llm.request_count(), 3);

        let requests = llm.requests.lock().unwrap();
        let condense = &requests[1][0].content;
        assert!(condense.contains("user: naval fighter pilot movie"));
        assert!(condense.contains("Follow Up Input: and who stars in it?"));
        assert_eq!(response.source_nodes[0].title.as_deref(), Some("Top Gun"));
    }

    #[tokio::test]
    async fn test_simple_mode_skips_retrieval() {
        let llm = Arc::new(ScriptedModel::new(&[]));
        let mut engine = engine(llm.clone(), context_builder().await, ChatMode::Simple);

        let response = engine.chat("hello").await.unwrap();
        assert_eq!(response.response, "echo: hello");
        assert!(response.source_nodes.is_empty());

        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests[0][0].content, "You are a movie expert.");
    }

    #[tokio::test]
    async fn test_reset_and_history_cap() {
        let llm = Arc::new(ScriptedModel::new(&[]));
        let mut engine =
            engine(llm, context_builder().await, ChatMode::Simple).with_max_history(4);

        for i in 0..5 {
            engine.chat(&format!("message {}", i)).await.unwrap();
        }
        assert_eq!(engine.history().len(), 4);
        assert_eq!(engine.history()[0].content, "message 3");
        assert_eq!(engine.history()[0].role, Role::User);

        engine.reset();
        assert!(engine.history().is_empty());
    }

    #[test]
    fn test_engine_config_from_settings() {
        let settings = Settings::default();
        let config = EngineConfig::from_settings(&settings).unwrap();
        assert_eq!(config.mode, ChatMode::CondensePlusContext);
        assert_eq!(config.top_k, 2);
        assert_eq!(config.collection, "wiki_movie_plots_1024_100_mxbai");
    }

    #[tokio::test]
    async fn test_unknown_collection_fails_without_creating_it() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.general.root_dir = dir.path().display().to_string();
        settings.vector_store.backend = "local".to_string();
        settings.embedding.provider = "hashing".to_string();

        let builder = EngineBuilder::new(settings.clone(), Prompts::default()).unwrap();
        let mut config = EngineConfig::from_settings(&settings).unwrap();
        config.collection = "wiki_movie_plots_512_5_mxbai".to_string();

        let err = builder.chat_engine(&config).await.err();
        assert!(
            matches!(&err, Some(PlotlineError::VectorStore(msg)) if msg.contains("wiki_movie_plots_512_5_mxbai")),
            "unexpected result: {:?}",
            err
        );
        assert!(builder.query_engine(&config).await.is_err());
        assert!(!settings.local_store_dir().exists());
    }
}
