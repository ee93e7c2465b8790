//! Lookup of structurally similar MOFs from a precomputed similarity mapping

pub mod graph;
pub mod outputs;
pub mod tools;

pub use graph::{Neighbor, SimilarityGraph};
pub use tools::SimilarityTools;

/// Number of similar MOFs returned when none is requested
pub const DEFAULT_SIMILAR_LIMIT: usize = 5;

/// Upper bound on the number of similar MOFs per request
pub const MAX_SIMILAR_LIMIT: usize = 100;
