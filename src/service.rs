use std::sync::Arc;
use tokio::sync::RwLock;

use anyhow::Result;
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use tracing::info;

use crate::config::AppConfig;
use crate::search::handle::IndexHandle;
use crate::search::tools::{BuildIndexParams, GetMofParams, SearchMofsParams, SearchTools};
use crate::similarity::graph::SimilarityGraph;
use crate::similarity::tools::{FindSimilarMofsParams, SimilarityTools};

#[derive(Clone)]
pub struct MofSearchService {
    search_tools: SearchTools,
    similarity_tools: SimilarityTools,
    tool_router: ToolRouter<Self>,
}

impl MofSearchService {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let handle = Arc::new(RwLock::new(IndexHandle::open(&config.index_dir)?));

        let graph = if config.similarity_file.exists() {
            Some(Arc::new(SimilarityGraph::load(&config.similarity_file)?))
        } else {
            info!(
                "No similarity file at {}, find_similar_mofs is unavailable",
                config.similarity_file.display()
            );
            None
        };

        Ok(Self::with_parts(handle, graph, config))
    }

    /// Build a service around an existing handle and similarity graph
    pub fn with_parts(
        handle: Arc<RwLock<IndexHandle>>,
        graph: Option<Arc<SimilarityGraph>>,
        config: &AppConfig,
    ) -> Self {
        Self {
            search_tools: SearchTools::new(handle.clone(), config.search_settings()),
            similarity_tools: SimilarityTools::new(graph, handle),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl MofSearchService {
    #[tool(
        description = "Search the MOF database. Bare words match refcodes, metals, names, SBU types, topology, color and ligands; numbers match the numeric properties. Target one property with field=value (fields: refcode, PLD, LCD, ASA, AV, n_channel, void_fraction, id, metal, metal_symbols, ligand_inchi, ligand_smile, chemical_name, sbu_type, color, topology, iupac_name, doi). Use ranges like PLD=[5 TO 10], OR between terms, and '&' to require several clauses. Returns every match with its properties and the list of matched refcodes."
    )]
    pub async fn search_mofs(&self, params: Parameters<SearchMofsParams>) -> String {
        self.search_tools.search_mofs(params.0).await
    }

    #[tool(
        description = "Get every indexed property of one MOF by its exact CSD refcode. Returns found=false when the refcode is not in the index."
    )]
    pub async fn get_mof(&self, params: Parameters<GetMofParams>) -> String {
        self.search_tools.get_mof(params.0).await
    }

    #[tool(
        description = "Rebuild the search index from a directory of JSON record files (each mapping refcode to its properties). Replaces the current index; the previous index is kept if the build fails. Files and records that cannot be read are skipped and reported."
    )]
    pub async fn build_index(&self, params: Parameters<BuildIndexParams>) -> String {
        self.search_tools.build_index(params.0).await
    }

    #[tool(
        description = "Show whether the search index exists, how many MOFs it holds, and when and from where it was last built."
    )]
    pub async fn index_status(&self) -> String {
        self.search_tools.index_status().await
    }

    #[tool(
        description = "Find the MOFs most structurally similar to a given refcode, ranked by similarity score. Optionally attaches each similar MOF's indexed properties."
    )]
    pub async fn find_similar_mofs(&self, params: Parameters<FindSimilarMofsParams>) -> String {
        self.similarity_tools.find_similar_mofs(params.0).await
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for MofSearchService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "MCP server for searching a database of Metal-Organic Frameworks by their properties. Use search_mofs with the shorthand query grammar (e.g. 'metal=Zn & PLD=[5 TO 10]') to find MOFs, get_mof to fetch one MOF by refcode, and find_similar_mofs to explore structurally similar MOFs. If searches return nothing, check index_status and run build_index.".to_string(),
            ),
            ..Default::default()
        }
    }
}
