use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use rmcp::schemars;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::search::handle::IndexHandle;
use crate::search::outputs::SearchErrorOutput;
use crate::search::shaper::{ShapeOptions, shape_results};
use crate::similarity::graph::SimilarityGraph;
use crate::similarity::outputs::{FindSimilarOutput, SimilarMof};
use crate::similarity::{DEFAULT_SIMILAR_LIMIT, MAX_SIMILAR_LIMIT};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FindSimilarMofsParams {
    #[schemars(description = "The CSD refcode of the MOF to compare against (e.g. 'ABAFUH')")]
    pub refcode: String,
    #[schemars(description = "How many similar MOFs to return (1-100, default 5)")]
    pub top_n: Option<usize>,
    #[schemars(description = "Attach the indexed properties of each similar MOF")]
    pub include_records: Option<bool>,
}

#[derive(Clone)]
pub struct SimilarityTools {
    graph: Option<Arc<SimilarityGraph>>,
    handle: Arc<RwLock<IndexHandle>>,
}

impl SimilarityTools {
    pub fn new(graph: Option<Arc<SimilarityGraph>>, handle: Arc<RwLock<IndexHandle>>) -> Self {
        Self { graph, handle }
    }

    /// Find the MOFs most similar to a given one
    pub async fn find_similar_mofs(&self, params: FindSimilarMofsParams) -> String {
        let result = self.find_similar(&params).await;

        match result {
            Ok(output) => output.to_json(),
            Err(e) => {
                SearchErrorOutput::new(format!("Failed to find similar MOFs: {e:#}")).to_json()
            }
        }
    }

    async fn find_similar(&self, params: &FindSimilarMofsParams) -> Result<FindSimilarOutput> {
        let graph = self
            .graph
            .as_ref()
            .ok_or_else(|| anyhow!("No similarity data is loaded"))?;

        let top_n = params.top_n.unwrap_or(DEFAULT_SIMILAR_LIMIT);
        if !(1..=MAX_SIMILAR_LIMIT).contains(&top_n) {
            bail!("top_n must be between 1 and {MAX_SIMILAR_LIMIT}");
        }

        let refcode = params.refcode.trim();
        let neighbors = graph
            .similar(refcode, top_n)
            .ok_or_else(|| anyhow!("Refcode {refcode} is not in the similarity data"))?;

        let mut similar = Vec::with_capacity(neighbors.len());
        if params.include_records.unwrap_or(false) {
            let handle = self.handle.read().await;
            let all_columns = ShapeOptions {
                drop_unreferenced: false,
            };
            for neighbor in neighbors {
                let record = handle.get_record(&neighbor.refcode)?.and_then(|record| {
                    shape_results(&[record], None, &all_columns)
                        .rows
                        .into_iter()
                        .next()
                });
                similar.push(SimilarMof {
                    refcode: neighbor.refcode,
                    score: neighbor.score,
                    record,
                });
            }
        } else {
            similar.extend(neighbors.into_iter().map(|neighbor| SimilarMof {
                refcode: neighbor.refcode,
                score: neighbor.score,
                record: None,
            }));
        }

        Ok(FindSimilarOutput {
            refcode: refcode.to_string(),
            top_n,
            total_results: similar.len(),
            similar,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::indexer::IndexerOptions;
    use std::fs;
    use tempfile::TempDir;

    fn tools_in(temp_dir: &TempDir, with_graph: bool) -> SimilarityTools {
        let graph = with_graph.then(|| {
            Arc::new(SimilarityGraph::from_adjacency(
                serde_json::from_value(serde_json::json!({
                    "ABAFUH": {"BIBCOM": 0.8, "CUBTCX": 0.3}
                }))
                .unwrap(),
            ))
        });
        let handle = IndexHandle::open(temp_dir.path().join("index")).unwrap();
        SimilarityTools::new(graph, Arc::new(RwLock::new(handle)))
    }

    fn params(refcode: &str, top_n: Option<usize>) -> FindSimilarMofsParams {
        FindSimilarMofsParams {
            refcode: refcode.to_string(),
            top_n,
            include_records: None,
        }
    }

    #[tokio::test]
    async fn test_find_similar() {
        let temp_dir = TempDir::new().unwrap();
        let tools = tools_in(&temp_dir, true);

        let json = tools.find_similar_mofs(params("ABAFUH", None)).await;
        let output: FindSimilarOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(output.top_n, 5);
        assert_eq!(output.similar[0].refcode, "BIBCOM");
        assert_eq!(output.similar[1].refcode, "CUBTCX");
    }

    #[tokio::test]
    async fn test_top_n_is_validated() {
        let temp_dir = TempDir::new().unwrap();
        let tools = tools_in(&temp_dir, true);

        for top_n in [0, 101] {
            let json = tools.find_similar_mofs(params("ABAFUH", Some(top_n))).await;
            let error: SearchErrorOutput = serde_json::from_str(&json).unwrap();
            assert!(error.error.contains("between 1 and 100"));
        }
    }

    #[tokio::test]
    async fn test_unknown_refcode_and_missing_graph() {
        let temp_dir = TempDir::new().unwrap();

        let json = tools_in(&temp_dir, true)
            .find_similar_mofs(params("NOPE", None))
            .await;
        let error: SearchErrorOutput = serde_json::from_str(&json).unwrap();
        assert!(error.error.contains("not in the similarity data"));

        let json = tools_in(&temp_dir, false)
            .find_similar_mofs(params("ABAFUH", None))
            .await;
        let error: SearchErrorOutput = serde_json::from_str(&json).unwrap();
        assert!(error.error.contains("No similarity data"));
    }

    #[tokio::test]
    async fn test_include_records_joins_index() {
        let temp_dir = TempDir::new().unwrap();
        let records_dir = temp_dir.path().join("records");
        fs::create_dir_all(&records_dir).unwrap();
        fs::write(
            records_dir.join("mofs.json"),
            r#"{"BIBCOM": {"PLD": 4.5, "metals": "Cu"}}"#,
        )
        .unwrap();

        let tools = tools_in(&temp_dir, true);
        tools
            .handle
            .write()
            .await
            .rebuild(&records_dir, &IndexerOptions::default())
            .unwrap();

        let json = tools
            .find_similar_mofs(FindSimilarMofsParams {
                refcode: "ABAFUH".to_string(),
                top_n: Some(2),
                include_records: Some(true),
            })
            .await;
        let output: FindSimilarOutput = serde_json::from_str(&json).unwrap();
        let bibcom = output.similar[0].record.as_ref().unwrap();
        assert_eq!(bibcom["Metal"], "Cu");
        assert_eq!(bibcom["PLD (Å)"], 4.5);
        assert!(output.similar[1].record.is_none());
    }
}
