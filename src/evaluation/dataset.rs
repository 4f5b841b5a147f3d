//! Question/answer dataset used by the evaluation harness.

use crate::error::{PlotlineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, instrument};

/// One dataset row: a source context with questions about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QnaRow {
    pub context: String,
    pub questions: Vec<String>,
    pub reference_answers: Vec<String>,
    /// Rows with sub-questions that the harness leaves out.
    #[serde(default)]
    pub complex: Option<bool>,
}

impl QnaRow {
    pub fn is_complex(&self) -> bool {
        self.complex.unwrap_or(false)
    }
}

/// A question with its stable id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationQuestion {
    pub question_id: i64,
    pub question: String,
    pub context: String,
    pub reference_answer: String,
}

/// Read the dataset file (a JSON array of [`QnaRow`]).
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_evaluation_dataset(path: impl AsRef<Path>) -> Result<Vec<QnaRow>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PlotlineError::FileNotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)?;
    let rows: Vec<QnaRow> = serde_json::from_str(&content)
        .map_err(|e| PlotlineError::ValueData(format!("Malformed dataset {}: {}", path.display(), e)))?;

    for (i, row) in rows.iter().enumerate() {
        if row.questions.len() != row.reference_answers.len() {
            return Err(PlotlineError::ValueData(format!(
                "Row {} has {} questions but {} reference answers",
                i,
                row.questions.len(),
                row.reference_answers.len()
            )));
        }
    }

    info!("Loaded {} dataset rows", rows.len());
    Ok(rows)
}

/// Flatten the dataset into questions with running ids.
///
/// Complex rows are skipped and do not consume ids, so ids stay stable as
/// long as the non-complex part of the dataset is unchanged.
pub fn evaluation_questions(rows: &[QnaRow]) -> Vec<EvaluationQuestion> {
    rows.iter()
        .filter(|row| !row.is_complex())
        .flat_map(|row| {
            row.questions
                .iter()
                .zip(&row.reference_answers)
                .map(move |(question, answer)| (row, question, answer))
        })
        .enumerate()
        .map(|(index, (row, question, answer))| EvaluationQuestion {
            question_id: index as i64,
            question: question.clone(),
            context: row.context.clone(),
            reference_answer: answer.clone(),
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn sample_rows() -> Vec<QnaRow> {
    vec![
        QnaRow {
            context: "title: The Karate Kid\ndirector: John G. Avildsen".to_string(),
            questions: vec![
                "Who directed The Karate Kid?".to_string(),
                "When was The Karate Kid released?".to_string(),
            ],
            reference_answers: vec!["John G. Avildsen".to_string(), "1984".to_string()],
            complex: None,
        },
        QnaRow {
            context: "title: Heat".to_string(),
            questions: vec!["Compare Heat and Ronin.".to_string()],
            reference_answers: vec!["Both are heist films.".to_string()],
            complex: Some(true),
        },
        QnaRow {
            context: "title: Top Gun\ndirector: Tony Scott".to_string(),
            questions: vec!["Who directed Top Gun?".to_string()],
            reference_answers: vec!["Tony Scott".to_string()],
            complex: Some(false),
        },
    ]
}
