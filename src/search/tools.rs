use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use rmcp::schemars;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::search::config::MAX_QUERY_LENGTH;
use crate::search::handle::IndexHandle;
use crate::search::indexer::IndexerOptions;
use crate::search::outputs::{
    BuildIndexOutput, GetMofOutput, IndexStatusOutput, SearchErrorOutput, SearchMofsOutput,
};
use crate::search::query::normalize_query;
use crate::search::shaper::{ShapeOptions, shape_results};
use crate::util::expand_path;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchMofsParams {
    #[schemars(
        description = "Search query. Bare words match names, metals, topology and ligands; use field=value for a specific property (e.g. 'metal=Zn & PLD=[5 TO 10]'); '&' joins clauses with AND"
    )]
    pub query: String,
    #[schemars(
        description = "Include the ligand InChIKey and SMILES columns even when the query does not mention them"
    )]
    pub include_all_columns: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetMofParams {
    #[schemars(description = "The CSD refcode of the MOF (e.g. 'ABAFUH')")]
    pub refcode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BuildIndexParams {
    #[schemars(
        description = "Directory of JSON record files to index. Defaults to the configured records directory. Supports ~ expansion."
    )]
    pub records_dir: Option<String>,
}

/// Settings the search tools need beyond the index handle
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub records_dir: PathBuf,
    pub indexer: IndexerOptions,
    pub shape: ShapeOptions,
}

#[derive(Clone)]
pub struct SearchTools {
    handle: Arc<RwLock<IndexHandle>>,
    settings: SearchSettings,
}

impl SearchTools {
    pub fn new(handle: Arc<RwLock<IndexHandle>>, settings: SearchSettings) -> Self {
        Self { handle, settings }
    }

    /// Search the MOF index with the shorthand query grammar
    pub async fn search_mofs(&self, params: SearchMofsParams) -> String {
        let result = async {
            if params.query.chars().count() > MAX_QUERY_LENGTH {
                bail!("Query must not exceed {MAX_QUERY_LENGTH} characters");
            }

            let query = normalize_query(&params.query);
            let options = if params.include_all_columns.unwrap_or(false) {
                ShapeOptions {
                    drop_unreferenced: false,
                }
            } else {
                self.settings.shape
            };

            let handle = self.handle.read().await;
            let shaped = handle.search_normalized(&query, &options)?;

            Ok::<_, anyhow::Error>(SearchMofsOutput {
                query: params.query.clone(),
                normalized_query: query.to_string(),
                total_results: shaped.len(),
                columns: shaped.columns,
                results: shaped.rows,
                refcodes: shaped.refcodes,
            })
        }
        .await;

        match result {
            Ok(output) => output.to_json(),
            Err(e) => SearchErrorOutput::new(format!("Search failed: {e:#}")).to_json(),
        }
    }

    /// Fetch one MOF record with every column
    pub async fn get_mof(&self, params: GetMofParams) -> String {
        let result = async {
            let refcode = params.refcode.trim();
            if refcode.is_empty() {
                bail!("Refcode must not be empty");
            }

            let handle = self.handle.read().await;
            let record = handle.get_record(refcode)?;
            let shaped = record.map(|record| {
                shape_results(
                    &[record],
                    None,
                    &ShapeOptions {
                        drop_unreferenced: false,
                    },
                )
            });

            Ok::<_, anyhow::Error>(GetMofOutput {
                refcode: refcode.to_string(),
                found: shaped.is_some(),
                record: shaped.and_then(|s| s.rows.into_iter().next()),
            })
        }
        .await;

        match result {
            Ok(output) => output.to_json(),
            Err(e) => SearchErrorOutput::new(format!("Failed to get MOF: {e:#}")).to_json(),
        }
    }

    /// Rebuild the index from a records directory
    pub async fn build_index(&self, params: BuildIndexParams) -> String {
        let result = async {
            let records_dir = match params.records_dir.as_deref() {
                Some(dir) => expand_path(dir)?,
                None => self.settings.records_dir.clone(),
            };

            // Searches wait on the write guard until the new index is open
            let mut handle = self.handle.clone().write_owned().await;
            info!("Building index from {}", records_dir.display());

            // Run the build synchronously in a blocking task
            let dir = records_dir.clone();
            let options = self.settings.indexer.clone();
            let report = tokio::task::spawn_blocking(move || handle.rebuild(&dir, &options))
                .await
                .context("Index build task failed")??;

            Ok::<_, anyhow::Error>(BuildIndexOutput::from_report(
                &records_dir.display().to_string(),
                &report,
            ))
        }
        .await;

        match result {
            Ok(output) => output.to_json(),
            Err(e) => SearchErrorOutput::new(format!("Failed to build index: {e:#}")).to_json(),
        }
    }

    /// Report whether the index exists and what it holds
    pub async fn index_status(&self) -> String {
        let result = async {
            let handle = self.handle.read().await;
            let stats = handle.stats()?;
            Ok::<_, anyhow::Error>(IndexStatusOutput::from(stats))
        }
        .await;

        match result {
            Ok(output) => output.to_json(),
            Err(e) => SearchErrorOutput::new(format!("Failed to get index status: {e:#}")).to_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tools_in(temp_dir: &TempDir) -> SearchTools {
        let records_dir = temp_dir.path().join("records");
        fs::create_dir_all(&records_dir).unwrap();
        fs::write(
            records_dir.join("mofs.json"),
            serde_json::json!({
                "ABAFUH": {"PLD": 10.5, "metals": ["Zn"], "ligand inchikey": "KKEYFWRCBNTPAC"},
                "BIBCOM": {"PLD": 4.0, "metals": ["Cu"]}
            })
            .to_string(),
        )
        .unwrap();

        let handle = IndexHandle::open(temp_dir.path().join("index")).unwrap();
        SearchTools::new(
            Arc::new(RwLock::new(handle)),
            SearchSettings {
                records_dir,
                indexer: IndexerOptions::default(),
                shape: ShapeOptions::default(),
            },
        )
    }

    #[tokio::test]
    async fn test_search_before_build_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let tools = tools_in(&temp_dir);

        let json = tools
            .search_mofs(SearchMofsParams {
                query: "metal=Zn".to_string(),
                include_all_columns: None,
            })
            .await;
        let output: SearchMofsOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(output.total_results, 0);
        assert!(output.refcodes.is_empty());
    }

    #[tokio::test]
    async fn test_build_then_search() {
        let temp_dir = TempDir::new().unwrap();
        let tools = tools_in(&temp_dir);

        let json = tools.build_index(BuildIndexParams { records_dir: None }).await;
        let built: BuildIndexOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(built.documents, 2);

        let json = tools
            .search_mofs(SearchMofsParams {
                query: "metal=Zn".to_string(),
                include_all_columns: None,
            })
            .await;
        let output: SearchMofsOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(output.normalized_query, "metal:Zn");
        assert_eq!(output.refcodes, vec!["ABAFUH"]);
        assert!(!output.columns.contains(&"Ligand InChIKey".to_string()));

        let json = tools
            .search_mofs(SearchMofsParams {
                query: "metal=Zn".to_string(),
                include_all_columns: Some(true),
            })
            .await;
        let output: SearchMofsOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(output.results[0]["Ligand InChIKey"], "KKEYFWRCBNTPAC");
    }

    #[tokio::test]
    async fn test_parse_error_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let tools = tools_in(&temp_dir);
        tools.build_index(BuildIndexParams { records_dir: None }).await;

        let json = tools
            .search_mofs(SearchMofsParams {
                query: "PLD=[1 TO".to_string(),
                include_all_columns: None,
            })
            .await;
        let error: SearchErrorOutput = serde_json::from_str(&json).unwrap();
        assert!(error.error.starts_with("Search failed"));
    }

    #[tokio::test]
    async fn test_overlong_query_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let tools = tools_in(&temp_dir);

        let json = tools
            .search_mofs(SearchMofsParams {
                query: "Zn ".repeat(MAX_QUERY_LENGTH),
                include_all_columns: None,
            })
            .await;
        let error: SearchErrorOutput = serde_json::from_str(&json).unwrap();
        assert!(error.error.contains("must not exceed"));
    }

    #[tokio::test]
    async fn test_query_length_counts_characters() {
        let temp_dir = TempDir::new().unwrap();
        let tools = tools_in(&temp_dir);
        tools.build_index(BuildIndexParams { records_dir: None }).await;

        // 600 characters, 1200 bytes
        let query = "é".repeat(600);
        assert!(query.len() > MAX_QUERY_LENGTH);

        let json = tools
            .search_mofs(SearchMofsParams {
                query: query.clone(),
                include_all_columns: None,
            })
            .await;
        let output: SearchMofsOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(output.query, query);
        assert_eq!(output.total_results, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_build_runs_off_the_async_workers() {
        let temp_dir = TempDir::new().unwrap();
        let tools = tools_in(&temp_dir);

        let (built, searched) = tokio::join!(
            tools.build_index(BuildIndexParams { records_dir: None }),
            tools.search_mofs(SearchMofsParams {
                query: "metal=Cu".to_string(),
                include_all_columns: None,
            })
        );
        let built: BuildIndexOutput = serde_json::from_str(&built).unwrap();
        assert_eq!(built.documents, 2);
        // Either before the build (empty) or after it (BIBCOM), never an error
        let searched: SearchMofsOutput = serde_json::from_str(&searched).unwrap();
        assert!(searched.total_results <= 1);

        let json = tools
            .search_mofs(SearchMofsParams {
                query: "metal=Cu".to_string(),
                include_all_columns: None,
            })
            .await;
        let output: SearchMofsOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(output.refcodes, vec!["BIBCOM"]);

        let status: IndexStatusOutput = serde_json::from_str(&tools.index_status().await).unwrap();
        assert_eq!(status.documents, 2);
    }

    #[tokio::test]
    async fn test_get_mof_and_status() {
        let temp_dir = TempDir::new().unwrap();
        let tools = tools_in(&temp_dir);
        tools.build_index(BuildIndexParams { records_dir: None }).await;

        let json = tools
            .get_mof(GetMofParams {
                refcode: "BIBCOM".to_string(),
            })
            .await;
        let output: GetMofOutput = serde_json::from_str(&json).unwrap();
        assert!(output.found);
        let record = output.record.unwrap();
        assert_eq!(record["Refcode"], "BIBCOM");
        assert_eq!(record["PLD (Å)"], 4);
        assert_eq!(record["Ligand InChIKey"], "N/A");

        let json = tools.index_status().await;
        let status: IndexStatusOutput = serde_json::from_str(&json).unwrap();
        assert!(status.exists);
        assert_eq!(status.documents, 2);
        assert_eq!(status.last_build.unwrap().documents, 2);
    }

    #[tokio::test]
    async fn test_build_from_missing_dir_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let tools = tools_in(&temp_dir);

        let missing = temp_dir.path().join("missing");
        let json = tools
            .build_index(BuildIndexParams {
                records_dir: Some(missing.display().to_string()),
            })
            .await;
        let error: SearchErrorOutput = serde_json::from_str(&json).unwrap();
        assert!(error.error.contains("does not exist"));
    }
}
