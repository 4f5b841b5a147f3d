//! System-prompt comparison.
//!
//! Asks the same questions under each [`PromptTemplate`] for every
//! collection and model, and appends the transcripts to one Markdown file per
//! (model, collection).

use super::store::EvaluationStore;
use crate::error::{PlotlineError, Result};
use crate::rag::context::format_nodes_summary;
use crate::rag::{ChatMode, ChatResponse, EngineConfig, EngineFactory};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

/// Questions asked in addition to the stored ones.
pub const EXTRA_QUESTIONS: [&str; 3] = [
    "Recommend an action movie",
    "I want to watch a movie with fast cars and explosions",
    "I want to watch a movie with a Superhero",
];

/// Retrieval depth used for every prompt evaluation chat.
const PROMPT_EVAL_TOP_K: usize = 2;

/// System prompt variants, combining role, style, content and format
/// instructions to different degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// Small and simple.
    Simple,
    /// Simple, spoiler-free, with some detail about the movie.
    Librarian,
    /// Detailed, offers to tell more.
    Interactive,
    /// Everything combined; refuses without context.
    Detailed,
    /// Short but detailed.
    Recommender,
}

impl PromptTemplate {
    pub const ALL: [PromptTemplate; 5] = [
        PromptTemplate::Simple,
        PromptTemplate::Librarian,
        PromptTemplate::Interactive,
        PromptTemplate::Detailed,
        PromptTemplate::Recommender,
    ];

    pub fn id(&self) -> u8 {
        match self {
            PromptTemplate::Simple => 0,
            PromptTemplate::Librarian => 1,
            PromptTemplate::Interactive => 2,
            PromptTemplate::Detailed => 3,
            PromptTemplate::Recommender => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }

    pub fn text(&self) -> &'static str {
        match self {
            PromptTemplate::Simple => concat!(
                "You are a Movie Expert. Keep your responses simple. ",
                "Structure your output in a way that is easy to read and understand."
            ),
            PromptTemplate::Librarian => concat!(
                "You are a Video Librarian you want to recommend movies to others. ",
                "But you don't want to spoil. Be kind ",
                "and don't give away too much. Keep your responses simple and to the point.",
                "Talk about the movie's genre, plot, and main characters to arouse the interest of the user "
            ),
            PromptTemplate::Interactive => concat!(
                "You are very knowledgeable about movies. ",
                "You want to share your knowledge with others. ",
                "Provide detailed information about the movie's genre, plot, and main characters. ",
                "Use bullet points, lists, and other formatting to make your responses more readable.",
                "Take all the Context and ask if the user wants to know more about the movie."
            ),
            PromptTemplate::Detailed => concat!(
                "You are a movie expert. Your primary responsibility is to assist users in discovering and learning about",
                " films. You will have context with information about the movie. ",
                "Use this information to provide detailed, accurate, and engaging information about the movie. ",
                "Work with bullet points, lists, and other formatting to make your responses more readable.",
                "Talk about the movie's genre, plot, and main characters to arouse the interest of the user.",
                "If there is nothing given in the Context then please under any circumstances do not provide ",
                "any information. Arouse the interest of the user and ask if they want to know more about the movie."
            ),
            PromptTemplate::Recommender => concat!(
                "You are a recommender. The User want to Discover Movies or Films. Use provided Context. ",
                "Structure your Output (bullet-points). Arouse the users interest. Don't Spoil. ",
                "Ask if user want to now more."
            ),
        }
    }
}

/// Parse a question ids file. The first line holds the ids: `1, 2, 3`.
pub fn parse_question_ids(content: &str) -> Result<Vec<i64>> {
    let line = content.lines().next().unwrap_or_default().trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    line.split(',')
        .map(|id| {
            id.trim()
                .parse()
                .map_err(|_| PlotlineError::ValueData(format!("Invalid question id: {:?}", id.trim())))
        })
        .collect()
}

/// Read and parse a question ids file.
pub fn read_question_ids(path: &Path) -> Result<Vec<i64>> {
    if !path.exists() {
        return Err(PlotlineError::FileNotFound(path.display().to_string()));
    }
    parse_question_ids(&std::fs::read_to_string(path)?)
}

/// Transcript block appended to the results file.
pub fn format_block(
    template: PromptTemplate,
    collection: &str,
    question: &str,
    response: &ChatResponse,
) -> String {
    format!(
        "\n{}\nIteration: {}\nCollection: {}\nPrompt: {}\nQuery: {}\nResponse: {}\nNodes: {}\n",
        "-".repeat(50),
        template.id(),
        collection,
        template.text(),
        question,
        response.response,
        format_nodes_summary(&response.source_nodes)
    )
}

/// Results file for a (model, collection) pair. The `oll_` selector prefix
/// is left out of the file name.
pub fn results_file(results_dir: &Path, model: &str, collection: &str) -> PathBuf {
    let model = model.strip_prefix("oll_").unwrap_or(model);
    results_dir.join(format!("{}_{}.md", model, collection))
}

/// Runs the prompt comparison.
pub struct PromptEvaluation {
    engines: Arc<dyn EngineFactory>,
    results_dir: PathBuf,
}

impl PromptEvaluation {
    pub fn new(engines: Arc<dyn EngineFactory>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            engines,
            results_dir: results_dir.into(),
        }
    }

    /// Stored questions for `ids` (first occurrence of each, in record order)
    /// followed by [`EXTRA_QUESTIONS`].
    pub fn questions(store: &EvaluationStore, ids: &[i64]) -> Result<Vec<String>> {
        let mut questions: Vec<String> = Vec::new();
        for record in store.get_records_by_question_ids(ids)? {
            if !questions.contains(&record.question) {
                questions.push(record.question);
            }
        }
        questions.extend(EXTRA_QUESTIONS.iter().map(|q| q.to_string()));
        Ok(questions)
    }

    /// Ask every question under every template for every collection and
    /// model. Returns the number of blocks written.
    #[instrument(skip_all, fields(questions = questions.len()))]
    pub async fn run(
        &self,
        questions: &[String],
        templates: &[PromptTemplate],
        collections: &[String],
        models: &[String],
    ) -> Result<usize> {
        std::fs::create_dir_all(&self.results_dir)?;
        let mut written = 0;

        for question in questions {
            for template in templates {
                for collection in collections {
                    for model in models {
                        let config = EngineConfig {
                            collection: collection.clone(),
                            model: model.clone(),
                            mode: ChatMode::Context,
                            top_k: PROMPT_EVAL_TOP_K,
                            system_prompt: Some(template.text().to_string()),
                        };
                        let mut engine = self.engines.chat_engine(&config).await?;
                        let response = engine.chat(question).await?;

                        let path = results_file(&self.results_dir, model, collection);
                        let mut file = std::fs::OpenOptions::new()
                            .create(true)
                            .append(true)
                            .open(&path)?;
                        file.write_all(format_block(*template, collection, question, &response).as_bytes())?;
                        written += 1;

                        info!(
                            "Prompt {} | {} | {} | {}",
                            template.id(),
                            model,
                            collection,
                            question
                        );
                    }
                }
            }
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RagPrompts;
    use crate::embedding::{Embedder, HashingEmbedder};
    use crate::evaluation::store::EvaluationRecord;
    use crate::llm::testing::ScriptedModel;
    use crate::llm::Role;
    use crate::rag::{ChatEngine, ContextBuilder, ContextChunk};
    use crate::vector_store::{test_node, MemoryVectorStore, VectorStore};
    use async_trait::async_trait;
    use chrono::Utc;

    struct TestEngines {
        llm: Arc<ScriptedModel>,
    }

    #[async_trait]
    impl EngineFactory for TestEngines {
        async fn chat_engine(&self, config: &EngineConfig) -> Result<ChatEngine> {
            let embedder = Arc::new(HashingEmbedder::new(64));
            let store = Arc::new(MemoryVectorStore::new(config.collection.clone()));
            let mut node = test_node("Speed", "A bus with a bomb must keep moving fast.", Vec::new());
            node.embedding = embedder.embed(&node.embed_text()).await?;
            store.add(&[node]).await?;

            Ok(ChatEngine::new(
                self.llm.clone(),
                ContextBuilder::new(store, embedder).with_top_k(config.top_k),
                config.mode,
                config.system_prompt.clone().unwrap_or_default(),
                RagPrompts::default(),
            ))
        }
    }

    #[test]
    fn test_template_ids() {
        let ids: Vec<u8> = PromptTemplate::ALL.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(PromptTemplate::from_id(4), Some(PromptTemplate::Recommender));
        assert_eq!(PromptTemplate::from_id(5), None);
        assert!(PromptTemplate::Simple.text().starts_with("You are a Movie Expert."));
    }

    #[test]
    fn test_parse_question_ids() {
        assert_eq!(parse_question_ids("1, 2, 3\n").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_question_ids("42\nignored").unwrap(), vec![42]);
        assert!(parse_question_ids("").unwrap().is_empty());
        assert!(matches!(
            parse_question_ids("1, two"),
            Err(PlotlineError::ValueData(_))
        ));
    }

    #[test]
    fn test_block_format() {
        let mut with_nodes = ChatResponse {
            response: "Watch Speed.".to_string(),
            source_nodes: vec![ContextChunk {
                node_id: uuid::Uuid::new_v4(),
                title: Some("Speed".to_string()),
                text: String::new(),
                metadata: Default::default(),
                score: 0.8361,
            }],
        };

        let block = format_block(PromptTemplate::Simple, "movies_512_50_mxbai", "Fast cars?", &with_nodes);
        let expected = format!(
            "\n{}\nIteration: 0\nCollection: movies_512_50_mxbai\nPrompt: {}\nQuery: Fast cars?\nResponse: Watch Speed.\nNodes: 0.84: Speed\n",
            "-".repeat(50),
            PromptTemplate::Simple.text()
        );
        assert_eq!(block, expected);

        with_nodes.source_nodes.clear();
        let block = format_block(PromptTemplate::Recommender, "c", "q", &with_nodes);
        assert!(block.contains("Iteration: 4\n"));
        assert!(block.ends_with("Nodes: No nodes found\n"));
    }

    #[test]
    fn test_questions_are_deduplicated() {
        let store = EvaluationStore::in_memory().unwrap();
        store.create_tables().unwrap();
        for model in ["oll_llama3_instruct", "oll_gemma_instruct"] {
            store
                .write_evaluation(&EvaluationRecord {
                    id: None,
                    llm_model: model.to_string(),
                    collection_name: "c".to_string(),
                    chat_mode: "CONTEXT".to_string(),
                    question_id: 7,
                    question: "Who directed Heat?".to_string(),
                    context: String::new(),
                    reference_answer: String::new(),
                    response: String::new(),
                    created_at: Utc::now(),
                })
                .unwrap();
        }

        let questions = PromptEvaluation::questions(&store, &[7]).unwrap();
        assert_eq!(questions.len(), 1 + EXTRA_QUESTIONS.len());
        assert_eq!(questions[0], "Who directed Heat?");
    }

    #[tokio::test]
    async fn test_run_appends_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedModel::new(&[]));
        let evaluation = PromptEvaluation::new(Arc::new(TestEngines { llm: llm.clone() }), dir.path());

        let questions = vec!["I want to watch a movie with fast cars and explosions".to_string()];
        let written = evaluation
            .run(
                &questions,
                &[PromptTemplate::Simple, PromptTemplate::Detailed],
                &["movies_512_50_mxbai".to_string()],
                &["oll_llama3_instruct".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(written, 2);

        let content =
            std::fs::read_to_string(dir.path().join("llama3_instruct_movies_512_50_mxbai.md")).unwrap();
        assert_eq!(content.matches("Iteration: ").count(), 2);
        assert!(content.contains("Iteration: 3\n"));
        assert!(content.contains("Nodes: "));

        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests[1][0].role, Role::System);
        assert!(requests[1][0].content.starts_with(PromptTemplate::Detailed.text()));
    }
}
