//! SQLite store for evaluation records.

use crate::error::{PlotlineError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

/// One answered question for a (model, collection, chat mode) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Row id; `None` until persisted.
    pub id: Option<i64>,
    pub llm_model: String,
    pub collection_name: String,
    pub chat_mode: String,
    pub question_id: i64,
    pub question: String,
    pub context: String,
    pub reference_answer: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// Evaluation records in a SQLite file.
///
/// The store does not enforce one record per cell; the harness checks
/// [`EvaluationStore::record_exists`] before writing.
pub struct EvaluationStore {
    conn: Mutex<Connection>,
}

impl EvaluationStore {
    /// Open (or create) the database at `path`.
    #[instrument(skip_all)]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Opened evaluation store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PlotlineError::Evaluation(format!("Failed to acquire lock: {}", e)))
    }

    /// Create the evaluation table if it does not exist.
    pub fn create_tables(&self) -> Result<()> {
        self.lock()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS evaluations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                llm_model TEXT NOT NULL,
                collection_name TEXT NOT NULL,
                chat_mode TEXT NOT NULL,
                question_id INTEGER NOT NULL,
                question TEXT NOT NULL,
                context TEXT NOT NULL,
                reference_answer TEXT NOT NULL,
                response TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_evaluations_cell
                ON evaluations(llm_model, collection_name, chat_mode, question_id);
            "#,
        )?;
        debug!("Evaluation tables ready");
        Ok(())
    }

    /// Insert a record and return its row id.
    #[instrument(skip(self, record), fields(model = %record.llm_model, question_id = record.question_id))]
    pub fn write_evaluation(&self, record: &EvaluationRecord) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO evaluations
            (llm_model, collection_name, chat_mode, question_id, question, context,
             reference_answer, response, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.llm_model,
                record.collection_name,
                record.chat_mode,
                record.question_id,
                record.question,
                record.context,
                record.reference_answer,
                record.response,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Whether a record exists for the cell.
    pub fn record_exists(
        &self,
        llm_model: &str,
        collection_name: &str,
        question_id: i64,
        chat_mode: &str,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM evaluations
            WHERE llm_model = ?1 AND collection_name = ?2 AND question_id = ?3 AND chat_mode = ?4
            "#,
            params![llm_model, collection_name, question_id, chat_mode],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// All records whose question id is in `ids`, ordered by id.
    pub fn get_records_by_question_ids(&self, ids: &[i64]) -> Result<Vec<EvaluationRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT id, llm_model, collection_name, chat_mode, question_id, question, context,
                   reference_answer, response, created_at
            FROM evaluations
            WHERE question_id IN ({})
            ORDER BY id
            "#,
            placeholders
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), Self::from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM evaluations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<EvaluationRecord> {
        let created_at: String = row.get(9)?;
        Ok(EvaluationRecord {
            id: Some(row.get(0)?),
            llm_model: row.get(1)?,
            collection_name: row.get(2)?,
            chat_mode: row.get(3)?,
            question_id: row.get(4)?,
            question: row.get(5)?,
            context: row.get(6)?,
            reference_answer: row.get(7)?,
            response: row.get(8)?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(model: &str, question_id: i64) -> EvaluationRecord {
        EvaluationRecord {
            id: None,
            llm_model: model.to_string(),
            collection_name: "wiki_movie_plots_1024_100_mxbai".to_string(),
            chat_mode: "CONTEXT".to_string(),
            question_id,
            question: format!("Question {}", question_id),
            context: "title: Heat".to_string(),
            reference_answer: "Michael Mann".to_string(),
            response: "Michael Mann directed it.".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_write_and_exists() {
        let store = EvaluationStore::in_memory().unwrap();
        store.create_tables().unwrap();

        assert!(!store
            .record_exists("oll_llama3_instruct", "wiki_movie_plots_1024_100_mxbai", 0, "CONTEXT")
            .unwrap());

        let id = store.write_evaluation(&record("oll_llama3_instruct", 0)).unwrap();
        assert!(id > 0);

        assert!(store
            .record_exists("oll_llama3_instruct", "wiki_movie_plots_1024_100_mxbai", 0, "CONTEXT")
            .unwrap());
        assert!(!store
            .record_exists("oll_llama3_instruct", "wiki_movie_plots_1024_100_mxbai", 0, "CONDENSE_PLUS_CONTEXT")
            .unwrap());
        assert!(!store
            .record_exists("oll_gemma_instruct", "wiki_movie_plots_1024_100_mxbai", 0, "CONTEXT")
            .unwrap());
    }

    #[test]
    fn test_records_by_question_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvaluationStore::open(&dir.path().join("evaluation.db")).unwrap();
        store.create_tables().unwrap();
        // Creating twice is harmless.
        store.create_tables().unwrap();

        for id in 0..4 {
            store.write_evaluation(&record("oll_llama3_instruct", id)).unwrap();
        }

        let records = store.get_records_by_question_ids(&[1, 3]).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].question, "Question 1");
        assert_eq!(records[1].question_id, 3);
        assert!(records[0].id.is_some());

        assert!(store.get_records_by_question_ids(&[]).unwrap().is_empty());
        assert_eq!(store.count().unwrap(), 4);
    }
}
