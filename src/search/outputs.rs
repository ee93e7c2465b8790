//! Output types for search tools
//!
//! These types are the return values of the search tool methods. They are
//! serialized to JSON strings for the MCP protocol, and can be deserialized
//! in tests for type-safe validation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::search::handle::IndexStats;
use crate::search::indexer::IndexReport;
use crate::storage::IndexMetadata;

/// Output from search_mofs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchMofsOutput {
    pub query: String,
    pub normalized_query: String,
    pub total_results: usize,
    /// Display labels, in column order
    pub columns: Vec<String>,
    /// One object per matched record, keyed by display label
    pub results: Vec<Map<String, Value>>,
    /// Refcodes of the matched records, in result order
    pub refcodes: Vec<String>,
}

impl SearchMofsOutput {
    /// Convert to JSON string for MCP response
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"Failed to serialize response"}"#.to_string())
    }
}

/// Output from get_mof
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetMofOutput {
    pub refcode: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Map<String, Value>>,
}

impl GetMofOutput {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"Failed to serialize response"}"#.to_string())
    }
}

/// Output from build_index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildIndexOutput {
    pub status: String,
    pub records_dir: String,
    pub files: usize,
    pub files_failed: Vec<String>,
    pub documents: usize,
    pub skipped: usize,
}

impl BuildIndexOutput {
    pub fn from_report(records_dir: &str, report: &IndexReport) -> Self {
        Self {
            status: "success".to_string(),
            records_dir: records_dir.to_string(),
            files: report.files,
            files_failed: report.files_failed.clone(),
            documents: report.documents,
            skipped: report.skipped,
        }
    }

    /// Convert to JSON string for MCP response
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"Failed to serialize response"}"#.to_string())
    }
}

/// Output from index_status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexStatusOutput {
    pub index_dir: String,
    pub exists: bool,
    pub documents: u64,
    pub segments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_build: Option<IndexMetadata>,
}

impl From<IndexStats> for IndexStatusOutput {
    fn from(stats: IndexStats) -> Self {
        Self {
            index_dir: stats.path,
            exists: stats.exists,
            documents: stats.documents,
            segments: stats.segments,
            last_build: stats.metadata,
        }
    }
}

impl IndexStatusOutput {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"Failed to serialize response"}"#.to_string())
    }
}

/// Error output for search tools
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SearchErrorOutput {
    pub error: String,
}

impl SearchErrorOutput {
    /// Create a new error output
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }

    /// Convert to JSON string for MCP response
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"Failed to serialize error"}"#.to_string())
    }
}
