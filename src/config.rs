//! Application configuration
//!
//! Paths come from, in order of precedence: command line flags (or their
//! environment variables), the optional `config.toml` in the data directory,
//! and the defaults below the data directory:
//!
//! ```text
//! <data_dir>/records           JSON record files
//! <data_dir>/index             search index
//! <data_dir>/similarity.json   similarity mapping
//! <data_dir>/config.toml       this file
//! ```
//!
//! The data directory defaults to `~/.fairmof`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::search::config::{DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
use crate::search::indexer::IndexerOptions;
use crate::search::shaper::ShapeOptions;
use crate::search::tools::SearchSettings;
use crate::util::expand_path;

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Paths given on the command line; `None` means "not given"
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub data_dir: Option<PathBuf>,
    pub index_dir: Option<PathBuf>,
    pub records_dir: Option<PathBuf>,
    pub similarity_file: Option<PathBuf>,
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// `[paths]` section; relative paths are resolved against the data directory
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    pub index_dir: Option<String>,
    pub records_dir: Option<String>,
    pub similarity_file: Option<String>,
}

/// `[index]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    #[serde(default = "default_zero_fill_numeric")]
    pub zero_fill_numeric: bool,
    #[serde(default = "default_writer_buffer_bytes")]
    pub writer_buffer_bytes: usize,
}

fn default_zero_fill_numeric() -> bool {
    true
}

fn default_writer_buffer_bytes() -> usize {
    DEFAULT_BUFFER_SIZE
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            zero_fill_numeric: default_zero_fill_numeric(),
            writer_buffer_bytes: default_writer_buffer_bytes(),
        }
    }
}

/// `[search]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    #[serde(default = "default_drop_unreferenced_columns")]
    pub drop_unreferenced_columns: bool,
}

fn default_drop_unreferenced_columns() -> bool {
    true
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            drop_unreferenced_columns: default_drop_unreferenced_columns(),
        }
    }
}

impl FileConfig {
    /// Read `path`, or the defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub index_dir: PathBuf,
    pub records_dir: PathBuf,
    pub similarity_file: PathBuf,
    pub indexer: IndexerOptions,
    pub shape: ShapeOptions,
}

impl AppConfig {
    /// Resolve the configuration for the given command line paths
    pub fn load(overrides: &PathOverrides) -> Result<Self> {
        let data_dir = match &overrides.data_dir {
            Some(dir) => expand_path_buf(dir)?,
            None => default_data_dir()?,
        };
        let file = FileConfig::load(&data_dir.join(CONFIG_FILE_NAME))?;
        Self::resolve(data_dir, file, overrides)
    }

    /// Combine a data directory, file settings and command line paths
    pub fn resolve(data_dir: PathBuf, file: FileConfig, overrides: &PathOverrides) -> Result<Self> {
        let pick = |flag: &Option<PathBuf>, configured: &Option<String>, default: &str| {
            match (flag, configured) {
                (Some(path), _) => expand_path_buf(path),
                (None, Some(path)) => Ok(data_dir.join(expand_path(path)?)),
                (None, None) => Ok(data_dir.join(default)),
            }
        };

        let index_dir = pick(&overrides.index_dir, &file.paths.index_dir, "index")?;
        let records_dir = pick(&overrides.records_dir, &file.paths.records_dir, "records")?;
        let similarity_file = pick(
            &overrides.similarity_file,
            &file.paths.similarity_file,
            "similarity.json",
        )?;

        let indexer = IndexerOptions {
            zero_fill_numeric: file.index.zero_fill_numeric,
            writer_buffer_bytes: file
                .index
                .writer_buffer_bytes
                .clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE),
        };
        let shape = ShapeOptions {
            drop_unreferenced: file.search.drop_unreferenced_columns,
        };

        Ok(Self {
            data_dir,
            index_dir,
            records_dir,
            similarity_file,
            indexer,
            shape,
        })
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            records_dir: self.records_dir.clone(),
            indexer: self.indexer.clone(),
            shape: self.shape,
        }
    }
}

/// `~/.fairmof`
pub fn default_data_dir() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to get home directory")?
        .join(".fairmof"))
}

fn expand_path_buf(path: &Path) -> Result<PathBuf> {
    expand_path(&path.to_string_lossy())
}
