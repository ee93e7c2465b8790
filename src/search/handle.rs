//! Caller-owned handle on the on-disk index
//!
//! The handle is constructed once and passed to whatever needs to search or
//! rebuild. It never fails because the index is missing: a handle without an
//! index answers every query with an empty result. After the index is
//! rebuilt by another process, call [`IndexHandle::reopen`].

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tantivy::{Index, IndexReader, ReloadPolicy};
use tracing::{info, warn};

use crate::search::indexer::{IndexReport, IndexerOptions, MofIndexer};
use crate::search::query::{NormalizedQuery, normalize_query};
use crate::search::schema::MofSchema;
use crate::search::searcher::{MatchedRecord, MofSearcher};
use crate::search::shaper::{ShapeOptions, ShapedResults, shape_results};
use crate::storage::{IndexMetadata, IndexStorage};
use crate::transaction::RebuildTransaction;

/// Statistics about the index behind a handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub path: String,
    pub exists: bool,
    pub documents: u64,
    pub segments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<IndexMetadata>,
}

struct OpenIndex {
    index: Index,
    reader: IndexReader,
    schema: MofSchema,
}

impl OpenIndex {
    fn searcher(&self) -> MofSearcher {
        MofSearcher::new(
            self.index.clone(),
            self.reader.clone(),
            self.schema.clone(),
        )
    }
}

/// Explicit handle on an index directory
pub struct IndexHandle {
    storage: IndexStorage,
    opened: Option<OpenIndex>,
}

impl IndexHandle {
    /// Whether `path` holds an index
    pub fn exists_in(path: &Path) -> bool {
        IndexStorage::exists_in(path)
    }

    /// Open the index at `path`, or an empty handle when there is none
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let storage = IndexStorage::new(path);
        let opened = open_index(&storage)?;
        if opened.is_none() {
            info!(
                "No search index at {}, searches return nothing until it is built",
                storage.index_dir().display()
            );
        }
        Ok(Self { storage, opened })
    }

    pub fn path(&self) -> &Path {
        self.storage.index_dir()
    }

    /// Whether an index was found when the handle was last (re)opened
    pub fn is_open(&self) -> bool {
        self.opened.is_some()
    }

    /// Re-read the index directory
    pub fn reopen(&mut self) -> Result<()> {
        self.opened = None;
        self.opened = open_index(&self.storage)?;
        Ok(())
    }

    /// Replace the index with a fresh build from `records_dir`
    ///
    /// Any previous index is moved aside first and restored when the build
    /// fails. Holds the exclusive rebuild lock for the whole build.
    pub fn rebuild(&mut self, records_dir: &Path, options: &IndexerOptions) -> Result<IndexReport> {
        if !records_dir.is_dir() {
            bail!(
                "Records directory does not exist: {}",
                records_dir.display()
            );
        }

        // Readers keep segment files mapped; let go of them before moving the directory
        self.opened = None;

        let result = {
            let _lock = self.storage.lock_exclusive()?;
            rebuild_locked(&self.storage, records_dir, options)
        };

        // Reopen whatever is in place now, the new index or the restored one
        let reopened = self.reopen();
        let report = result?;
        reopened?;
        Ok(report)
    }

    fn searcher(&self) -> Option<MofSearcher> {
        self.opened.as_ref().map(OpenIndex::searcher)
    }

    /// Normalize, execute and shape a user query
    pub fn search(&self, raw_query: &str, options: &ShapeOptions) -> Result<ShapedResults> {
        let query = normalize_query(raw_query);
        self.search_normalized(&query, options)
    }

    /// Execute and shape an already normalized query
    pub fn search_normalized(
        &self,
        query: &NormalizedQuery,
        options: &ShapeOptions,
    ) -> Result<ShapedResults> {
        let matches = self.matches(query)?;
        Ok(shape_results(&matches, Some(query), options))
    }

    /// Raw matches of a normalized query
    pub fn matches(&self, query: &NormalizedQuery) -> Result<Vec<MatchedRecord>> {
        match self.searcher() {
            Some(searcher) => searcher.search(query),
            None => Ok(Vec::new()),
        }
    }

    /// Look up one record by its exact refcode
    pub fn get_record(&self, refcode: &str) -> Result<Option<MatchedRecord>> {
        match self.searcher() {
            Some(searcher) => searcher.find_refcode(refcode),
            None => Ok(None),
        }
    }

    /// Get statistics about the index
    pub fn stats(&self) -> Result<IndexStats> {
        let (documents, segments) = match &self.opened {
            Some(opened) => {
                let searcher = opened.reader.searcher();
                (searcher.num_docs(), searcher.segment_readers().len())
            }
            None => (0, 0),
        };

        Ok(IndexStats {
            path: self.storage.index_dir().display().to_string(),
            exists: self.storage.exists(),
            documents,
            segments,
            metadata: self.metadata(),
        })
    }

    /// Metadata of the last build, when it was recorded
    pub fn metadata(&self) -> Option<IndexMetadata> {
        self.storage.load_metadata().ok()
    }
}

fn open_index(storage: &IndexStorage) -> Result<Option<OpenIndex>> {
    if !storage.exists() {
        return Ok(None);
    }

    let _lock = storage.lock_shared()?;
    let index_dir = storage.index_dir();

    let index = Index::open_in_dir(index_dir)
        .with_context(|| format!("Failed to open search index at: {}", index_dir.display()))?;
    let schema = MofSchema::from_schema(index.schema())?;
    let reader = index
        .reader_builder()
        .reload_policy(ReloadPolicy::Manual)
        .try_into()
        .context("Failed to create index reader")?;

    Ok(Some(OpenIndex {
        index,
        reader,
        schema,
    }))
}

fn rebuild_locked(
    storage: &IndexStorage,
    records_dir: &Path,
    options: &IndexerOptions,
) -> Result<IndexReport> {
    let mut transaction = RebuildTransaction::new(storage);
    transaction.begin()?;

    let built = MofIndexer::create_in(storage.index_dir(), options.clone())
        .and_then(|indexer| indexer.index_directory(records_dir));

    match built {
        Ok(report) => {
            transaction.commit()?;
            storage.save_metadata(records_dir, &report)?;
            info!(
                "Rebuilt search index at {} with {} documents",
                storage.index_dir().display(),
                report.documents
            );
            Ok(report)
        }
        Err(e) => {
            warn!("Index rebuild failed, restoring previous index: {:#}", e);
            transaction.rollback()?;
            Err(e)
        }
    }
}
