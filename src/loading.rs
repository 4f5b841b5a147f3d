//! Loading movie records from JSON into documents.
//!
//! The input is a JSON array of flat objects. Every record becomes one
//! [`MovieDocument`]; a fixed allow-list of fields is kept as metadata while
//! all fields end up in the document text.

use crate::error::{PlotlineError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Record fields copied into document metadata.
pub const METADATA_KEYS: [&str; 4] = ["release_year", "origin_ethnicity", "plot_length", "title"];

/// Template used to render a document for embedding and for the LLM.
pub const TEXT_TEMPLATE: &str = "Metadata:\n{metadata_str}\n-----------\nContent:\n{content}";

/// Share of records that go to the training split.
const TRAIN_RATIO: f64 = 0.8;

/// A movie record converted into a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieDocument {
    /// Unique document ID.
    pub id: Uuid,
    /// Body text (formatted fields or raw JSON).
    pub text: String,
    /// Allow-listed metadata, in record order.
    pub metadata: Map<String, Value>,
    /// File the record came from. Not shown to the LLM.
    pub source_file: String,
}

impl MovieDocument {
    /// Create a new document.
    pub fn new(text: String, metadata: Map<String, Value>, source_file: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            metadata,
            source_file,
        }
    }

    /// Movie title, if the record had one.
    pub fn title(&self) -> Option<String> {
        self.metadata.get("title").map(display_value)
    }

    /// Render the document through [`TEXT_TEMPLATE`].
    pub fn render(&self) -> String {
        render_with_metadata(&self.metadata, &self.text)
    }
}

/// Render `content` with a metadata header, the way documents and their
/// chunks are presented to the embedder and the LLM.
pub fn render_with_metadata(metadata: &Map<String, Value>, content: &str) -> String {
    let metadata_str = metadata
        .iter()
        .map(|(key, value)| format!("{}: {}", key, display_value(value)))
        .collect::<Vec<_>>()
        .join("\n");

    TEXT_TEMPLATE
        .replace("{metadata_str}", &metadata_str)
        .replace("{content}", content)
}

/// Render a JSON value for humans: strings without quotes, everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Loads movie records from a JSON file.
#[derive(Debug)]
pub struct Loader {
    path: PathBuf,
    records: Vec<Map<String, Value>>,
    formatted: bool,
}

impl Loader {
    /// Read and validate the input file.
    ///
    /// Fails with [`PlotlineError::FileNotFound`] if the path does not exist
    /// and with [`PlotlineError::ValueData`] if the file is empty or its
    /// top-level value is not a non-empty array of objects.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_path(path: impl AsRef<Path>, formatted: bool) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PlotlineError::FileNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let records = parse_records(&content)
            .map_err(|e| PlotlineError::ValueData(format!("{} in {}", e, path.display())))?;

        info!("Loaded {} records from {:?}", records.len(), path);

        Ok(Self {
            path: path.to_path_buf(),
            records,
            formatted,
        })
    }

    /// The raw records, in their current order.
    pub fn records(&self) -> &[Map<String, Value>] {
        &self.records
    }

    /// Create one document per record.
    pub fn documents(&self) -> Vec<MovieDocument> {
        self.records.iter().map(|r| self.create_document(r)).collect()
    }

    /// Shuffle the records in place and split them 80/20 into training and
    /// test documents.
    ///
    /// Without a seed the shuffle differs on every call. The shuffle is
    /// applied to the loader's own records, so later calls to
    /// [`Loader::documents`] see the shuffled order.
    pub fn train_test_split(
        &mut self,
        seed: Option<u64>,
    ) -> (Vec<MovieDocument>, Vec<MovieDocument>) {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.records.shuffle(&mut rng);

        let split = (TRAIN_RATIO * self.records.len() as f64) as usize;
        debug!("Splitting {} records at {}", self.records.len(), split);

        let mut documents = self.documents();
        let test = documents.split_off(split);
        (documents, test)
    }

    fn create_document(&self, record: &Map<String, Value>) -> MovieDocument {
        let text = if self.formatted {
            format_record(record)
        } else {
            Value::Object(record.clone()).to_string()
        };

        let metadata: Map<String, Value> = record
            .iter()
            .filter(|(key, _)| METADATA_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let source_file = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        MovieDocument::new(text, metadata, source_file)
    }
}

fn parse_records(content: &str) -> std::result::Result<Vec<Map<String, Value>>, String> {
    if content.trim().is_empty() {
        return Err("No data found".to_string());
    }

    let value: Value = serde_json::from_str(content).map_err(|e| format!("Malformed JSON ({})", e))?;

    let items = match value {
        Value::Array(items) if items.is_empty() => return Err("No data found".to_string()),
        Value::Array(items) => items,
        Value::Null => return Err("No data found".to_string()),
        Value::Object(ref map) if map.is_empty() => return Err("No data found".to_string()),
        _ => return Err("Data must be a list".to_string()),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            _ => Err(format!("Record {} is not an object", i)),
        })
        .collect()
}

/// One `key: value` line per field, in record order.
fn format_record(record: &Map<String, Value>) -> String {
    record
        .iter()
        .map(|(key, value)| format!("{}: {}\n", key, display_value(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const RECORDS: &str = r#"[
        {"release_year": 1984, "title": "The Karate Kid", "origin_ethnicity": "American",
         "director": "John G. Avildsen", "plot": "Daniel trains with Mr. Miyagi.", "plot_length": 30},
        {"release_year": 1986, "title": "Top Gun", "director": "Tony Scott", "plot": "Maverick flies jets."},
        {"title": "Alien", "plot": "A crew meets a creature."}
    ]"#;

    #[test]
    fn test_loads_one_document_per_record() {
        let file = write_file(RECORDS);
        let loader = Loader::from_path(file.path(), true).unwrap();
        let docs = loader.documents();
        assert_eq!(docs.len(), 3);
    }

    #[test]
    fn test_metadata_is_allow_listed_subset() {
        let file = write_file(RECORDS);
        let docs = Loader::from_path(file.path(), true).unwrap().documents();

        let keys: Vec<&str> = docs[0].metadata.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["release_year", "title", "origin_ethnicity", "plot_length"]);

        let keys: Vec<&str> = docs[1].metadata.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["release_year", "title"]);

        for doc in &docs {
            assert!(!doc.metadata.contains_key("director"));
            assert!(!doc.metadata.contains_key("plot"));
        }
    }

    #[test]
    fn test_formatted_text_keeps_every_field() {
        let file = write_file(RECORDS);
        let docs = Loader::from_path(file.path(), true).unwrap().documents();
        assert_eq!(
            docs[1].text,
            "release_year: 1986\ntitle: Top Gun\ndirector: Tony Scott\nplot: Maverick flies jets.\n"
        );
    }

    #[test]
    fn test_raw_text_is_json() {
        let file = write_file(RECORDS);
        let docs = Loader::from_path(file.path(), false).unwrap().documents();
        let parsed: Value = serde_json::from_str(&docs[2].text).unwrap();
        assert_eq!(parsed["title"], "Alien");
    }

    #[test]
    fn test_render_uses_template() {
        let file = write_file(RECORDS);
        let docs = Loader::from_path(file.path(), true).unwrap().documents();
        let rendered = docs[2].render();
        assert!(rendered.starts_with("Metadata:\ntitle: Alien\n-----------\nContent:\n"));
        assert!(rendered.ends_with("plot: A crew meets a creature.\n"));
    }

    #[test]
    fn test_missing_file() {
        let err = Loader::from_path("/definitely/not/here.json", true).unwrap_err();
        assert!(matches!(err, PlotlineError::FileNotFound(_)));
    }

    #[test]
    fn test_empty_and_non_array_inputs() {
        for content in ["", "   ", "[]", "{}", "null", "{\"title\": \"Alien\"}", "[1, 2]", "not json"] {
            let file = write_file(content);
            let err = Loader::from_path(file.path(), true).err();
            assert!(
                matches!(err, Some(PlotlineError::ValueData(_))),
                "expected ValueData for {:?}",
                content
            );
        }
    }

    #[test]
    fn test_seeded_split_is_reproducible() {
        let records: Vec<Value> = (0..10)
            .map(|i| serde_json::json!({ "title": format!("Movie {}", i) }))
            .collect();
        let file = write_file(&Value::Array(records).to_string());

        let mut a = Loader::from_path(file.path(), true).unwrap();
        let mut b = Loader::from_path(file.path(), true).unwrap();

        let (train_a, test_a) = a.train_test_split(Some(7));
        let (train_b, test_b) = b.train_test_split(Some(7));

        assert_eq!(train_a.len(), 8);
        assert_eq!(test_a.len(), 2);

        let titles = |docs: &[MovieDocument]| docs.iter().map(|d| d.title()).collect::<Vec<_>>();
        assert_eq!(titles(&train_a), titles(&train_b));
        assert_eq!(titles(&test_a), titles(&test_b));

        // The shuffle is applied to the loader's records.
        assert_eq!(titles(&a.documents()[..8]), titles(&train_a));
    }
}
