mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docvault")]
#[command(about = "Per-owner semantic index and hybrid search for document vaults", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Config file (default: ./docvault.yaml if present)")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage documents in the bundled database
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },
    /// Rebuild an owner's semantic index
    Index {
        #[arg(long, help = "Owner id")]
        owner: i64,
        #[arg(long, help = "Show index status only")]
        status: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Search an owner's documents by meaning
    #[command(name = "semantic-search", alias = "ss")]
    SemanticSearch {
        query: String,
        #[arg(long, help = "Owner id")]
        owner: i64,
        #[arg(short, long, help = "Number of results")]
        k: Option<usize>,
        #[arg(long, help = "Minimum similarity score")]
        threshold: Option<f32>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Combine semantic and keyword search
    #[command(name = "hybrid-search", alias = "hs")]
    HybridSearch {
        query: String,
        #[arg(long, help = "Owner id")]
        owner: i64,
        #[arg(long, help = "Weight of semantic similarity")]
        semantic_weight: Option<f32>,
        #[arg(long, help = "Weight of a keyword match")]
        keyword_weight: Option<f32>,
        #[arg(long, short, help = "Number of results")]
        limit: Option<usize>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Documents similar to a given document
    Similar {
        document: i64,
        #[arg(long, help = "Owner id")]
        owner: i64,
        #[arg(short, long, help = "Number of results")]
        k: Option<usize>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DocsAction {
    Add {
        #[arg(long, help = "Owner id")]
        owner: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    Remove {
        id: i64,
        #[arg(long, help = "Owner id")]
        owner: i64,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    List {
        #[arg(long, help = "Owner id")]
        owner: i64,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("DOCVAULT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Docs { action } => match action {
            DocsAction::Add {
                owner,
                title,
                content,
                json,
            } => commands::docs::add(config, owner, &title, content.as_deref(), json),
            DocsAction::Remove { id, owner, json } => commands::docs::remove(config, owner, id, json),
            DocsAction::List { owner, json } => commands::docs::list(config, owner, json),
        },
        Commands::Index {
            owner,
            status,
            json,
        } => commands::index::run(config, owner, status, json),
        Commands::SemanticSearch {
            query,
            owner,
            k,
            threshold,
            json,
        } => commands::semantic_search::run(config, owner, &query, k, threshold, json),
        Commands::HybridSearch {
            query,
            owner,
            semantic_weight,
            keyword_weight,
            limit,
            json,
        } => commands::hybrid_search::run(
            config,
            owner,
            &query,
            semantic_weight,
            keyword_weight,
            limit,
            json,
        ),
        Commands::Similar {
            document,
            owner,
            k,
            json,
        } => commands::similar::run(config, owner, document, k, json),
    }
}
