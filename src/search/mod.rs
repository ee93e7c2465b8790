//! # Search Module
//!
//! Full-text and numeric search over MOF property records, built on Tantivy
//! 0.24.1.
//!
//! ## Key Components
//!
//! - [`schema`] - the fixed field set with display labels
//! - [`record`] - source record model and value flattening
//! - [`indexer`] - builds an index from a directory of JSON record files
//! - [`query`] - rewrites the shorthand query grammar for the parser
//! - [`searcher`] - executes normalized queries
//! - [`shaper`] - turns matches into display rows and refcode lists
//! - [`handle`] - caller-owned handle that ties the pieces together
//! - [`tools`] - MCP tool implementations for search operations
//! - [`config`] - configuration constants for search functionality

pub mod config;
pub mod handle;
pub mod indexer;
pub mod outputs;
pub mod query;
pub mod record;
pub mod schema;
pub mod searcher;
pub mod shaper;
pub mod tools;

pub use handle::{IndexHandle, IndexStats};
pub use indexer::{IndexReport, IndexerOptions, MofIndexer};
pub use query::{NormalizedQuery, normalize_query};
pub use schema::{MofField, MofSchema};
pub use searcher::{MatchedRecord, MofSearcher, StoredValue};
pub use shaper::{ShapeOptions, ShapedResults, shape_results};
pub use tools::SearchTools;
