pub mod config;
pub mod search;
pub mod service;
pub mod similarity;
pub mod storage;
pub mod transaction;
pub mod util;

pub use config::AppConfig;
pub use search::{IndexHandle, normalize_query};
pub use service::MofSearchService;
pub use similarity::SimilarityGraph;
