//! The evaluation matrix: collections × models × chat modes × questions.

use super::dataset::{evaluation_questions, EvaluationQuestion, QnaRow};
use super::store::{EvaluationRecord, EvaluationStore};
use crate::config::Settings;
use crate::error::Result;
use crate::rag::{ChatEngine, ChatMode, EngineConfig, EngineFactory};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Axes of one harness run.
#[derive(Debug, Clone)]
pub struct EvaluationMatrix {
    pub collections: Vec<String>,
    /// Model selectors, e.g. `oll_llama3_instruct`.
    pub models: Vec<String>,
    pub chat_modes: Vec<ChatMode>,
    pub top_k: usize,
}

impl EvaluationMatrix {
    /// Matrix from the `evaluation` settings section.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let chat_modes = settings
            .evaluation
            .chat_modes
            .iter()
            .map(|m| m.parse())
            .collect::<Result<Vec<ChatMode>>>()?;

        Ok(Self {
            collections: settings.evaluation.collections.clone(),
            models: settings.evaluation.models.clone(),
            chat_modes,
            top_k: settings.evaluation.top_k,
        })
    }

    /// Number of (collection, model, mode) combinations.
    pub fn combinations(&self) -> usize {
        self.collections.len() * self.models.len() * self.chat_modes.len()
    }
}

/// Terminal state of one evaluation cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// A record already existed; nothing was queried.
    Skipped,
    /// The question was answered and a record written.
    Persisted,
}

/// Counts of a harness run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HarnessReport {
    pub written: usize,
    pub skipped: usize,
}

impl HarnessReport {
    fn record(&mut self, state: CellState) {
        match state {
            CellState::Skipped => self.skipped += 1,
            CellState::Persisted => self.written += 1,
        }
    }
}

/// Answers every dataset question for every matrix cell and persists the
/// responses.
///
/// Cells that already have a record are skipped without querying, so a rerun
/// after a failure resumes at the first missing record. A query failure
/// stops the run.
pub struct EvaluationHarness {
    engines: Arc<dyn EngineFactory>,
    store: Arc<EvaluationStore>,
    questions: Vec<EvaluationQuestion>,
}

impl EvaluationHarness {
    /// Create a harness over the dataset rows.
    pub fn new(engines: Arc<dyn EngineFactory>, store: Arc<EvaluationStore>, rows: &[QnaRow]) -> Self {
        Self {
            engines,
            store,
            questions: evaluation_questions(rows),
        }
    }

    /// Questions the harness asks, with their ids.
    pub fn questions(&self) -> &[EvaluationQuestion] {
        &self.questions
    }

    /// Run the whole matrix.
    #[instrument(skip_all, fields(combinations = matrix.combinations(), questions = self.questions.len()))]
    pub async fn run(&self, matrix: &EvaluationMatrix) -> Result<HarnessReport> {
        let mut report = HarnessReport::default();

        for collection in &matrix.collections {
            for model in &matrix.models {
                for mode in &matrix.chat_modes {
                    let config = EngineConfig {
                        collection: collection.clone(),
                        model: model.clone(),
                        mode: *mode,
                        top_k: matrix.top_k,
                        system_prompt: None,
                    };
                    let cell_report = self.run_combination(&config).await?;
                    report.written += cell_report.written;
                    report.skipped += cell_report.skipped;
                }
            }
        }

        info!(
            "Evaluation finished: {} written, {} skipped",
            report.written, report.skipped
        );
        Ok(report)
    }

    /// Run every question for one (collection, model, mode) combination.
    ///
    /// History is cleared before each question, so every record is
    /// independent of the questions answered before it in the same run.
    pub async fn run_combination(&self, config: &EngineConfig) -> Result<HarnessReport> {
        info!(
            "Evaluating llm_model: {} | collection_name: {} | chat_mode: {}",
            config.model, config.collection, config.mode
        );

        let mut report = HarnessReport::default();
        let mut engine: Option<ChatEngine> = None;

        for question in &self.questions {
            let state = self.run_cell(config, question, &mut engine).await?;
            report.record(state);
        }
        Ok(report)
    }

    async fn run_cell(
        &self,
        config: &EngineConfig,
        question: &EvaluationQuestion,
        engine: &mut Option<ChatEngine>,
    ) -> Result<CellState> {
        let chat_mode = config.mode.as_str();

        if self.store.record_exists(
            &config.model,
            &config.collection,
            question.question_id,
            chat_mode,
        )? {
            info!(
                "Record exists: {} | {}",
                question.question_id, question.question
            );
            return Ok(CellState::Skipped);
        }

        info!(
            "Create record for: {} | {}",
            question.question_id, question.question
        );

        // Built on the first missing record only, so fully covered
        // combinations never touch the vector store or the model.
        let engine = match engine {
            Some(engine) => engine,
            None => engine.insert(self.engines.chat_engine(config).await?),
        };

        engine.reset();
        let response = engine.chat(&question.question).await?;
        debug!(
            "Answered {} with {} source nodes",
            question.question_id,
            response.source_nodes.len()
        );

        self.store.write_evaluation(&EvaluationRecord {
            id: None,
            llm_model: config.model.clone(),
            collection_name: config.collection.clone(),
            chat_mode: chat_mode.to_string(),
            question_id: question.question_id,
            question: question.question.clone(),
            context: question.context.clone(),
            reference_answer: question.reference_answer.clone(),
            response: response.response,
            created_at: Utc::now(),
        })?;

        Ok(CellState::Persisted)
    }
}
