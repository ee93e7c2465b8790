//! # Search Configuration Module
//!
//! Provides configuration constants for indexing and querying.

/// Default buffer size for the Tantivy index writer (50MB)
pub const DEFAULT_BUFFER_SIZE: usize = 50_000_000;

/// Minimum buffer size accepted by the Tantivy index writer (15MB)
pub const MIN_BUFFER_SIZE: usize = 15_000_000;

/// Maximum buffer size for the Tantivy index writer (200MB)
pub const MAX_BUFFER_SIZE: usize = 200_000_000;

/// Maximum allowed query length in characters
pub const MAX_QUERY_LENGTH: usize = 1000;

/// Value reported for a stored field that a matched document does not carry
pub const MISSING_VALUE_PLACEHOLDER: &str = "N/A";

/// File extension of ingestion files
pub const RECORD_FILE_EXTENSION: &str = "json";

