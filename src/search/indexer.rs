use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tantivy::{Index, IndexWriter, TantivyDocument};
use tracing::{debug, info, warn};

use crate::search::config::{
    DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE, RECORD_FILE_EXTENSION,
};
use crate::search::record::MofRecord;
use crate::search::schema::{FieldKind, MofField, MofSchema};

/// Options controlling how records are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerOptions {
    /// Write `0` for numeric fields missing from the source.
    ///
    /// With this on, "no value" and "zero" cannot be told apart in the index.
    /// Turning it off leaves the field out so it is reported as missing.
    pub zero_fill_numeric: bool,
    /// Memory budget of the index writer in bytes
    pub writer_buffer_bytes: usize,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            zero_fill_numeric: true,
            writer_buffer_bytes: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Outcome of one ingestion pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// JSON files found in the records directory
    pub files: usize,
    /// Files that could not be read or were not a refcode mapping
    pub files_failed: Vec<String>,
    /// Documents written
    pub documents: usize,
    /// Records skipped because their value was unusable
    pub skipped: usize,
}

/// Writes MOF records from a directory of JSON files into a fresh index
pub struct MofIndexer {
    index: Index,
    schema: MofSchema,
    options: IndexerOptions,
}

impl MofIndexer {
    /// Create a new, empty index in `index_dir`
    ///
    /// The directory is created when absent. Fails when the directory already
    /// holds an index: indexes are never merged, clearing the directory is up
    /// to the caller.
    pub fn create_in(index_dir: &Path, options: IndexerOptions) -> Result<Self> {
        fs::create_dir_all(index_dir).with_context(|| {
            format!(
                "Failed to create search index directory: {}",
                index_dir.display()
            )
        })?;

        let schema = MofSchema::new();
        let index = Index::create_in_dir(index_dir, schema.schema().clone()).with_context(
            || format!("Failed to create search index at: {}", index_dir.display()),
        )?;

        Ok(Self {
            index,
            schema,
            options,
        })
    }

    /// Index every `*.json` file of `records_dir` in a single commit
    pub fn index_directory(self, records_dir: &Path) -> Result<IndexReport> {
        let files = list_record_files(records_dir)?;
        info!(
            "Indexing {} record files from {}",
            files.len(),
            records_dir.display()
        );

        let buffer_size = self
            .options
            .writer_buffer_bytes
            .clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE);
        let mut writer: IndexWriter = self
            .index
            .writer(buffer_size)
            .context("Failed to create index writer")?;

        let mut report = IndexReport {
            files: files.len(),
            ..Default::default()
        };

        for path in &files {
            let records = match load_record_file(path) {
                Ok(records) => records,
                Err(e) => {
                    warn!("Skipping {}: {:#}", path.display(), e);
                    report.files_failed.push(path.display().to_string());
                    continue;
                }
            };

            for (refcode, value) in &records {
                if !value.is_object() {
                    warn!("Skipping {refcode} because it is not a mapping");
                    report.skipped += 1;
                    continue;
                }

                match MofRecord::from_source(refcode, value) {
                    Ok(record) => {
                        writer.add_document(self.document_for(&record))?;
                        report.documents += 1;
                        debug!("Indexed {refcode}");
                    }
                    Err(e) => {
                        warn!("Skipping {refcode}: {:#}", e);
                        report.skipped += 1;
                    }
                }
            }
        }

        writer.commit().context("Failed to commit search index")?;
        writer
            .wait_merging_threads()
            .context("Failed to finish index merges")?;

        info!(
            "Indexed {} documents ({} skipped, {} files failed)",
            report.documents,
            report.skipped,
            report.files_failed.len()
        );
        Ok(report)
    }

    /// Create a Tantivy document from a record
    fn document_for(&self, record: &MofRecord) -> TantivyDocument {
        let mut doc = TantivyDocument::default();

        for field in MofField::ALL {
            let handle = self.schema.field(field);
            match field.kind() {
                FieldKind::Text => {
                    if let Some(text) = record.text(field) {
                        doc.add_text(handle, text);
                    }
                }
                FieldKind::Numeric => {
                    let value = match record.numeric(field) {
                        Some(value) => Some(value),
                        None if self.options.zero_fill_numeric => Some(0.0),
                        None => None,
                    };
                    if let Some(value) = value {
                        doc.add_f64(handle, value);
                    }
                }
            }
        }

        doc
    }

    /// Get the underlying Tantivy index
    pub fn index(&self) -> &Index {
        &self.index
    }
}

/// List the ingestion files of a directory, sorted by name
pub fn list_record_files(records_dir: &Path) -> Result<Vec<PathBuf>> {
    if !records_dir.is_dir() {
        bail!(
            "Records directory does not exist: {}",
            records_dir.display()
        );
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(records_dir)
        .with_context(|| format!("Failed to read records directory: {}", records_dir.display()))?
    {
        let path = entry?.path();
        let is_record_file = path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext == RECORD_FILE_EXTENSION);
        if is_record_file {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Read one ingestion file as a refcode mapping
fn load_record_file(path: &Path) -> Result<Map<String, Value>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    match parsed {
        Value::Object(records) => Ok(records),
        _ => bail!("Top level of {} is not a refcode mapping", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::collector::Count;
    use tantivy::query::AllQuery;
    use tempfile::TempDir;

    fn write_json(dir: &Path, name: &str, value: serde_json::Value) {
        fs::write(dir.join(name), serde_json::to_string(&value).unwrap()).unwrap();
    }

    fn doc_count(index: &Index) -> usize {
        let reader = index.reader().unwrap();
        reader.searcher().search(&AllQuery, &Count).unwrap()
    }

    #[test]
    fn test_create_indexer() {
        let temp_dir = TempDir::new().unwrap();
        let index_dir = temp_dir.path().join("index");
        let indexer = MofIndexer::create_in(&index_dir, IndexerOptions::default()).unwrap();
        assert!(index_dir.join("meta.json").exists());
        assert!(indexer.index().searchable_segment_ids().unwrap().is_empty());
    }

    #[test]
    fn test_create_into_existing_index_fails() {
        let temp_dir = TempDir::new().unwrap();
        MofIndexer::create_in(temp_dir.path(), IndexerOptions::default()).unwrap();
        assert!(MofIndexer::create_in(temp_dir.path(), IndexerOptions::default()).is_err());
    }

    #[test]
    fn test_one_document_per_mapping() {
        let temp_dir = TempDir::new().unwrap();
        let records = temp_dir.path().join("records");
        fs::create_dir_all(&records).unwrap();
        write_json(
            &records,
            "a.json",
            serde_json::json!({
                "ABAFUH": {"PLD": 10.5, "metals": ["Zn"]},
                "BIBCOM": {"PLD": 4.0},
                "BROKEN": "not a mapping",
                "LISTED": [1, 2]
            }),
        );
        write_json(&records, "b.json", serde_json::json!({"CUBTC": {"metals": ["Cu"]}}));
        fs::write(records.join("notes.txt"), "ignored").unwrap();

        let indexer =
            MofIndexer::create_in(&temp_dir.path().join("index"), IndexerOptions::default())
                .unwrap();
        let index = indexer.index().clone();
        let report = indexer.index_directory(&records).unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(report.documents, 3);
        assert_eq!(report.skipped, 2);
        assert!(report.files_failed.is_empty());
        assert_eq!(doc_count(&index), 3);
    }

    #[test]
    fn test_bad_file_does_not_stop_ingestion() {
        let temp_dir = TempDir::new().unwrap();
        let records = temp_dir.path().join("records");
        fs::create_dir_all(&records).unwrap();
        fs::write(records.join("a.json"), "{ not json").unwrap();
        write_json(&records, "b.json", serde_json::json!(["not", "a", "mapping"]));
        write_json(&records, "c.json", serde_json::json!({"ZIF8": {"metals": "Zn"}}));

        let indexer =
            MofIndexer::create_in(&temp_dir.path().join("index"), IndexerOptions::default())
                .unwrap();
        let report = indexer.index_directory(&records).unwrap();

        assert_eq!(report.files, 3);
        assert_eq!(report.files_failed.len(), 2);
        assert_eq!(report.documents, 1);
    }

    #[test]
    fn test_missing_records_dir_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let indexer =
            MofIndexer::create_in(&temp_dir.path().join("index"), IndexerOptions::default())
                .unwrap();
        assert!(indexer.index_directory(&temp_dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_zero_fill_numeric() {
        let temp_dir = TempDir::new().unwrap();
        let record = MofRecord::from_source("A", &serde_json::json!({"PLD": 3})).unwrap();

        let filled = MofIndexer::create_in(&temp_dir.path().join("filled"), IndexerOptions::default())
            .unwrap();
        let doc = filled.document_for(&record);
        assert!(doc.get_first(filled.schema.field(MofField::Lcd)).is_some());

        let options = IndexerOptions {
            zero_fill_numeric: false,
            ..Default::default()
        };
        let sparse = MofIndexer::create_in(&temp_dir.path().join("sparse"), options).unwrap();
        let doc = sparse.document_for(&record);
        assert!(doc.get_first(sparse.schema.field(MofField::Lcd)).is_none());
        assert!(doc.get_first(sparse.schema.field(MofField::Pld)).is_some());
    }
}
