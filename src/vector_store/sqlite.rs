//! SQLite-based vector store, the `local` backend.
//!
//! Cosine similarity is computed in Rust over every node of the collection.
//! Several collections share one database file, keyed by a collection column.

use super::{
    collection_not_found, cosine_similarity, ensure_embedded, rank, SearchResult, VectorStore,
};
use crate::chunking::Node;
use crate::error::{PlotlineError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, Row, Transaction};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS nodes (
        id TEXT PRIMARY KEY,
        collection TEXT NOT NULL,
        document_id TEXT NOT NULL,
        content TEXT NOT NULL,
        metadata_json TEXT NOT NULL,
        start_char INTEGER NOT NULL,
        end_char INTEGER NOT NULL,
        node_order INTEGER NOT NULL,
        embedding BLOB NOT NULL,
        indexed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_nodes_collection ON nodes(collection);
"#;

/// SQLite-based vector store bound to one collection.
pub struct SqliteVectorStore {
    collection: String,
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Open (or create) the database at `path`.
    #[instrument(skip_all, fields(collection = %collection))]
    pub fn new(path: &Path, collection: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite vector store at {:?}", path);

        Ok(Self {
            collection: collection.to_string(),
            conn: Mutex::new(conn),
        })
    }

    /// Open a collection that was already ingested into the database at `path`.
    ///
    /// Nothing is created: a missing file or a collection without nodes is an
    /// error.
    #[instrument(skip_all, fields(collection = %collection))]
    pub fn open_existing(path: &Path, collection: &str) -> Result<Self> {
        if !path.exists() {
            return Err(collection_not_found(collection));
        }

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE collection = ?1)",
            params![collection],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(collection_not_found(collection));
        }

        debug!("Opened SQLite vector store at {:?}", path);
        Ok(Self {
            collection: collection.to_string(),
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite vector store (useful for testing).
    pub fn in_memory(collection: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            collection: collection.to_string(),
            conn: Mutex::new(conn),
        })
    }

    /// Collections in the database with their node counts.
    pub fn collections(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT collection, COUNT(*) FROM nodes GROUP BY collection ORDER BY collection",
        )?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(1)?;
            Ok((row.get::<_, String>(0)?, count as usize))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PlotlineError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    fn insert_nodes(&self, tx: &Transaction<'_>, nodes: &[Node]) -> Result<()> {
        let indexed_at = Utc::now().to_rfc3339();
        for node in nodes {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO nodes
                (id, collection, document_id, content, metadata_json, start_char, end_char,
                 node_order, embedding, indexed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    node.id.to_string(),
                    self.collection,
                    node.document_id.to_string(),
                    node.text,
                    serde_json::to_string(&node.metadata)?,
                    node.start_char as i64,
                    node.end_char as i64,
                    node.order as i64,
                    Self::embedding_to_bytes(&node.embedding),
                    indexed_at,
                ],
            )?;
        }
        Ok(())
    }

    /// Decode one `nodes` row; corrupt ids or metadata are errors.
    fn node_from_row(row: &Row<'_>) -> Result<Node> {
        let id: String = row.get(0)?;
        let document_id: String = row.get(1)?;
        let metadata_json: String = row.get(3)?;
        let start_char: i64 = row.get(4)?;
        let end_char: i64 = row.get(5)?;
        let order: i64 = row.get(6)?;
        let embedding_bytes: Vec<u8> = row.get(7)?;

        let parse_id = |value: &str| {
            Uuid::parse_str(value).map_err(|e| {
                PlotlineError::VectorStore(format!("Corrupt node id {:?}: {}", value, e))
            })
        };

        Ok(Node {
            id: parse_id(&id)?,
            document_id: parse_id(&document_id)?,
            text: row.get(2)?,
            start_char: start_char as usize,
            end_char: end_char as usize,
            order: order as usize,
            metadata: serde_json::from_str::<Map<String, Value>>(&metadata_json)?,
            embedding: Self::bytes_to_embedding(&embedding_bytes),
        })
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    #[instrument(skip(self, nodes), fields(collection = %self.collection))]
    async fn add(&self, nodes: &[Node]) -> Result<usize> {
        ensure_embedded(nodes)?;
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        self.insert_nodes(&tx, nodes)?;
        tx.commit()?;

        info!("Added {} nodes", nodes.len());
        Ok(nodes.len())
    }

    #[instrument(skip(self, query_embedding), fields(collection = %self.collection))]
    async fn search_with_threshold(
        &self,
        query_embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, document_id, content, metadata_json, start_char, end_char,
                   node_order, embedding
            FROM nodes
            WHERE collection = ?1
            "#,
        )?;

        let mut rows = stmt.query(params![self.collection])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let node = Self::node_from_row(row)?;
            results.push(SearchResult {
                score: cosine_similarity(query_embedding, &node.embedding),
                node,
            });
        }

        let results = rank(results, limit, min_score);
        debug!("Found {} matching nodes", results.len());
        Ok(results)
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn reset(&self) -> Result<()> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM nodes WHERE collection = ?1",
            params![self.collection],
        )?;
        info!("Deleted {} nodes", deleted);
        Ok(())
    }

    /// Delete and insert in one transaction, so readers never see a
    /// half-written collection.
    #[instrument(skip(self, nodes), fields(collection = %self.collection))]
    async fn replace(&self, nodes: &[Node]) -> Result<usize> {
        ensure_embedded(nodes)?;
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM nodes WHERE collection = ?1",
            params![self.collection],
        )?;
        self.insert_nodes(&tx, nodes)?;
        tx.commit()?;

        info!("Replaced collection with {} nodes", nodes.len());
        Ok(nodes.len())
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE collection = ?1",
            params![self.collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::test_node;

    #[tokio::test]
    async fn test_sqlite_vector_store() {
        let store = SqliteVectorStore::in_memory("movies").unwrap();

        let node = test_node("Heat", "A heist in LA.", vec![1.0, 0.0, 0.0]);
        store.add(&[node.clone()]).await.unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < 0.001);
        assert_eq!(results[0].node.id, node.id);
        assert_eq!(results[0].node.title().as_deref(), Some("Heat"));
        assert_eq!(results[0].node.embedding, node.embedding);

        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.db");

        let small = SqliteVectorStore::new(&path, "movies_512_50_mxbai").unwrap();
        let large = SqliteVectorStore::new(&path, "movies_1024_100_mxbai").unwrap();

        small
            .add(&[test_node("Heat", "A heist.", vec![1.0, 0.0])])
            .await
            .unwrap();
        large
            .add(&[
                test_node("Alien", "A creature.", vec![0.0, 1.0]),
                test_node("Jaws", "A shark.", vec![0.5, 0.5]),
            ])
            .await
            .unwrap();

        assert_eq!(small.count().await.unwrap(), 1);
        assert_eq!(large.count().await.unwrap(), 2);

        large
            .replace(&[test_node("Up", "A house flies.", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(large.count().await.unwrap(), 1);
        assert_eq!(small.count().await.unwrap(), 1);

        let collections = small.collections().unwrap();
        assert_eq!(
            collections,
            vec![
                ("movies_1024_100_mxbai".to_string(), 1),
                ("movies_512_50_mxbai".to_string(), 1)
            ]
        );
    }

    #[tokio::test]
    async fn test_open_existing_requires_ingested_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage").join("local.db");

        let err = SqliteVectorStore::open_existing(&path, "movies").err();
        assert!(matches!(err, Some(PlotlineError::VectorStore(_))));
        assert!(!path.exists());

        let writer = SqliteVectorStore::new(&path, "movies").unwrap();
        writer
            .add(&[test_node("Heat", "A heist.", vec![1.0, 0.0])])
            .await
            .unwrap();

        let err = SqliteVectorStore::open_existing(&path, "movie").err();
        assert!(matches!(err, Some(PlotlineError::VectorStore(msg)) if msg.contains("movie")));

        let reader = SqliteVectorStore::open_existing(&path, "movies").unwrap();
        assert_eq!(reader.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_rows_are_errors() {
        let store = SqliteVectorStore::in_memory("movies").unwrap();
        store
            .add(&[test_node("Heat", "A heist.", vec![1.0, 0.0])])
            .await
            .unwrap();

        store
            .lock()
            .unwrap()
            .execute("UPDATE nodes SET metadata_json = 'not json'", [])
            .unwrap();
        let err = store.search(&[1.0, 0.0], 5).await.unwrap_err();
        assert!(matches!(err, PlotlineError::Json(_)));

        store
            .lock()
            .unwrap()
            .execute("UPDATE nodes SET metadata_json = '{}', id = 'bad-id'", [])
            .unwrap();
        let err = store.search(&[1.0, 0.0], 5).await.unwrap_err();
        assert!(matches!(err, PlotlineError::VectorStore(msg) if msg.contains("bad-id")));
    }
}
