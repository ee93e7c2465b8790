use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use rmcp::{ServiceExt, transport::stdio};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use fairmof_search::config::{AppConfig, PathOverrides};
use fairmof_search::search::tools::{SearchMofsParams, SearchTools};
use fairmof_search::search::IndexHandle;
use fairmof_search::similarity::tools::{FindSimilarMofsParams, SimilarityTools};
use fairmof_search::similarity::{DEFAULT_SIMILAR_LIMIT, SimilarityGraph};
use fairmof_search::MofSearchService;

/// Search Metal-Organic Framework property records over MCP or from the command line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory holding records, index and config.toml (defaults to ~/.fairmof)
    #[arg(long, env = "FAIRMOF_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Search index directory (defaults to <data-dir>/index)
    #[arg(long, env = "FAIRMOF_INDEX_DIR")]
    index_dir: Option<PathBuf>,

    /// Directory of JSON record files (defaults to <data-dir>/records)
    #[arg(long, env = "FAIRMOF_RECORDS_DIR")]
    records_dir: Option<PathBuf>,

    /// Similarity mapping file (defaults to <data-dir>/similarity.json)
    #[arg(long, env = "FAIRMOF_SIMILARITY_FILE")]
    similarity_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server on stdio (the default)
    Serve,
    /// Rebuild the search index from the records directory
    Index {
        /// Directory of JSON record files, overriding the configured one
        #[arg(long)]
        records_dir: Option<PathBuf>,
    },
    /// Run one query and print the results as JSON
    Search {
        query: String,
        /// Keep the ligand columns even when the query does not mention them
        #[arg(long)]
        all_columns: bool,
    },
    /// Print the MOFs most similar to a refcode as JSON
    Similar {
        refcode: String,
        #[arg(long, default_value_t = DEFAULT_SIMILAR_LIMIT)]
        top_n: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing to stderr to avoid conflicts with stdio transport
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = AppConfig::load(&PathOverrides {
        data_dir: args.data_dir,
        index_dir: args.index_dir,
        records_dir: args.records_dir,
        similarity_file: args.similarity_file,
    })?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&config).await,
        Commands::Index { records_dir } => build_index(&config, records_dir),
        Commands::Search { query, all_columns } => search(&config, query, all_columns).await,
        Commands::Similar { refcode, top_n } => similar(&config, refcode, top_n).await,
    }
}

async fn serve(config: &AppConfig) -> Result<()> {
    tracing::info!("Starting MOF search server on stdio...");
    tracing::info!("Using index directory: {}", config.index_dir.display());

    let mof_service = MofSearchService::new(config)?;

    // Serve using stdio transport
    let service = mof_service.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("serving error: {:?}", e);
    })?;

    // Wait for the service to complete
    service.waiting().await?;
    Ok(())
}

fn build_index(config: &AppConfig, records_dir: Option<PathBuf>) -> Result<()> {
    let records_dir = records_dir.unwrap_or_else(|| config.records_dir.clone());

    let mut handle = IndexHandle::open(&config.index_dir)?;
    let report = handle.rebuild(&records_dir, &config.indexer)?;

    println!(
        "Indexed {} MOFs from {} files into {} ({} records skipped)",
        report.documents,
        report.files,
        config.index_dir.display(),
        report.skipped
    );
    for file in &report.files_failed {
        println!("  failed: {file}");
    }
    Ok(())
}

async fn search(config: &AppConfig, query: String, all_columns: bool) -> Result<()> {
    let handle = IndexHandle::open(&config.index_dir)?;
    let tools = SearchTools::new(Arc::new(RwLock::new(handle)), config.search_settings());

    let json = tools
        .search_mofs(SearchMofsParams {
            query,
            include_all_columns: Some(all_columns),
        })
        .await;
    println!("{json}");
    Ok(())
}

async fn similar(config: &AppConfig, refcode: String, top_n: usize) -> Result<()> {
    if !config.similarity_file.exists() {
        bail!(
            "Similarity file not found: {}",
            config.similarity_file.display()
        );
    }
    let graph = SimilarityGraph::load(&config.similarity_file)?;
    let handle = IndexHandle::open(&config.index_dir)?;
    let tools = SimilarityTools::new(Some(Arc::new(graph)), Arc::new(RwLock::new(handle)));

    let json = tools
        .find_similar_mofs(FindSimilarMofsParams {
            refcode,
            top_n: Some(top_n),
            include_records: Some(false),
        })
        .await;
    println!("{json}");
    Ok(())
}
