//! Evaluation of the RAG pipeline.
//!
//! The harness answers the dataset questions for every configured
//! (collection, model, chat mode) combination and persists the answers.
//! Judges and the prompt comparison work on top of those records.

pub mod dataset;
pub mod evaluators;
pub mod harness;
pub mod prompt_eval;
pub mod store;

pub use dataset::{evaluation_questions, load_evaluation_dataset, EvaluationQuestion, QnaRow};
pub use evaluators::{
    AnswerRelevancyEvaluator, ContextRelevancyEvaluator, EvaluationResult, PairwiseEvaluator,
};
pub use harness::{CellState, EvaluationHarness, EvaluationMatrix, HarnessReport};
pub use prompt_eval::{PromptEvaluation, PromptTemplate, EXTRA_QUESTIONS};
pub use store::{EvaluationRecord, EvaluationStore};
