//! Output types for similarity tools

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One similar MOF, optionally with its indexed properties
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarMof {
    pub refcode: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Map<String, Value>>,
}

/// Output from find_similar_mofs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FindSimilarOutput {
    pub refcode: String,
    pub top_n: usize,
    pub total_results: usize,
    pub similar: Vec<SimilarMof>,
}

impl FindSimilarOutput {
    /// Convert to JSON string for MCP response
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"Failed to serialize response"}"#.to_string())
    }
}
