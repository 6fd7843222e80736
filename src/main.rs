//! # ChainLens CLI (`chainlens`)
//!
//! Registers documentation sources, runs indexing jobs and serves the
//! MCP endpoints.
//!
//! ## Usage
//!
//! ```bash
//! chainlens --config ./config/chainlens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chainlens init` | Create the SQLite database and schema |
//! | `chainlens section add <name>` | Create a section (`sec-` endpoint) |
//! | `chainlens subsection add <section-id> <name>` | Create a subsection (`sub-` endpoint) |
//! | `chainlens source add <name> --kind <kind> --url <url>` | Register a source (`src-` endpoint) |
//! | `chainlens source list` | List sources with status and chunk counts |
//! | `chainlens source remove <id>` | Delete a source and its chunks |
//! | `chainlens index <id>...` | Index sources now |
//! | `chainlens refresh` | Re-index every source whose refresh interval elapsed |
//! | `chainlens search "<query>" --endpoint <token>` | Hybrid search within an endpoint |
//! | `chainlens serve` | Start the MCP HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! chainlens init
//! chainlens section add "Uniswap"
//! chainlens source add "Uniswap V3 Core" --kind repository \
//!     --url https://github.com/Uniswap/v3-core --version v3 --section <section-id>
//! chainlens index <source-id>
//! chainlens search "slot0 function" --endpoint sec-uniswap
//! chainlens serve
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chainlens::config;
use chainlens::ingest::{IndexError, Indexer};
use chainlens::migrate;
use chainlens::search;
use chainlens::server;
use chainlens::sources::{self, NewSource, DEFAULT_CRAWL_DEPTH};
use chainlens::sqlite_store::SqliteStore;
use chainlens_core::models::{IndexOptions, RefreshInterval, SourceKind};
use chainlens_core::store::Store;

/// ChainLens: documentation ingestion and hybrid retrieval for AI
/// coding assistants.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/chainlens.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "chainlens",
    about = "ChainLens: documentation ingestion and hybrid retrieval served over MCP",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/chainlens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage sections.
    Section {
        #[command(subcommand)]
        action: SectionAction,
    },

    /// Manage subsections.
    Subsection {
        #[command(subcommand)]
        action: SubsectionAction,
    },

    /// Manage documentation sources.
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },

    /// Index the given sources now, concurrently.
    Index {
        /// Source ids.
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Refresh every READY source whose refresh interval has elapsed.
    Refresh,

    /// Search within an endpoint's scope.
    Search {
        query: String,

        /// Endpoint token (`src-…`, `sub-…` or `sec-…`).
        #[arg(long)]
        endpoint: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        /// Only search sources with this exact version.
        #[arg(long)]
        version: Option<String>,

        /// Print the raw JSON response.
        #[arg(long)]
        json: bool,
    },

    /// Start the MCP HTTP server.
    Serve,
}

#[derive(Subcommand)]
enum SectionAction {
    Add { name: String },
    List,
}

#[derive(Subcommand)]
enum SubsectionAction {
    Add { section_id: String, name: String },
}

#[derive(Subcommand)]
enum SourceAction {
    Add(SourceAddArgs),
    List,
    Remove { id: String },
}

#[derive(Args)]
struct SourceAddArgs {
    name: String,

    /// `web`, `repository` or `document`.
    #[arg(long)]
    kind: SourceKind,

    #[arg(long)]
    url: String,

    #[arg(long)]
    version: Option<String>,

    /// Link depth for web crawls (0 = start page only).
    #[arg(long, default_value_t = DEFAULT_CRAWL_DEPTH)]
    depth: u32,

    /// Repository branch (default `main`).
    #[arg(long)]
    branch: Option<String>,

    /// Path filter (substring for web, glob for repositories). Repeatable.
    #[arg(long = "include")]
    include: Vec<String>,

    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// `none`, `daily`, `weekly` or `monthly`.
    #[arg(long, default_value = "none")]
    refresh: RefreshInterval,

    #[arg(long)]
    section: Option<String>,

    #[arg(long)]
    subsection: Option<String>,

    #[arg(long)]
    no_readme: bool,
    #[arg(long)]
    no_docs: bool,
    #[arg(long)]
    no_sol: bool,
    #[arg(long)]
    no_md: bool,
    /// Include files under test directories.
    #[arg(long)]
    tests: bool,
    /// Include files under example directories.
    #[arg(long)]
    examples: bool,
}

impl SourceAddArgs {
    fn into_new_source(self) -> NewSource {
        NewSource {
            index_options: IndexOptions {
                index_readme: !self.no_readme,
                index_docs: !self.no_docs,
                index_solidity: !self.no_sol,
                index_markdown: !self.no_md,
                index_tests: self.tests,
                index_examples: self.examples,
            },
            name: self.name,
            kind: self.kind,
            url: self.url,
            version: self.version,
            crawl_depth: self.depth,
            branch: self.branch,
            include_patterns: self.include,
            exclude_patterns: self.exclude,
            refresh: self.refresh,
            section_id: self.section,
            subsection_id: self.subsection,
        }
    }
}

fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chainlens=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Section { action } => {
            let store = SqliteStore::open(&cfg).await?;
            match action {
                SectionAction::Add { name } => {
                    let section = sources::add_section(&store, &name).await?;
                    println!("Created section {} ({})", section.id, section.endpoint);
                }
                SectionAction::List => {
                    let sections = store.list_sections().await?;
                    if sections.is_empty() {
                        println!("No sections.");
                    }
                    sources::print_sections(&sections);
                }
            }
            store.pool().close().await;
        }
        Commands::Subsection {
            action: SubsectionAction::Add { section_id, name },
        } => {
            let store = SqliteStore::open(&cfg).await?;
            let sub = sources::add_subsection(&store, &section_id, &name).await?;
            println!("Created subsection {} ({})", sub.id, sub.endpoint);
            store.pool().close().await;
        }
        Commands::Source { action } => {
            let store = SqliteStore::open(&cfg).await?;
            match action {
                SourceAction::Add(args) => {
                    let source =
                        sources::add_source(&store, args.into_new_source(), chrono::Utc::now())
                            .await?;
                    println!("Created source {} ({})", source.id, source.endpoint);
                    println!("Status: {}", source.status);
                }
                SourceAction::List => {
                    sources::print_sources(&store.list_sources().await?);
                }
                SourceAction::Remove { id } => {
                    sources::remove_source(&store, &id).await?;
                    println!("Removed source {}", id);
                }
            }
            store.pool().close().await;
        }
        Commands::Index { ids } => {
            let store = Arc::new(SqliteStore::open(&cfg).await?);
            let indexer = Arc::new(Indexer::from_config(&cfg, store.clone())?);

            let handles: Vec<_> = ids
                .iter()
                .map(|id| (id.clone(), indexer.spawn(id.clone())))
                .collect();

            let mut failed = 0;
            for (id, handle) in handles {
                match handle.await? {
                    Ok(report) if report.is_ready() => {
                        println!("{}: READY ({} chunks)", id, report.chunk_count);
                    }
                    Ok(report) => {
                        failed += 1;
                        println!(
                            "{}: {} ({})",
                            id,
                            report.status,
                            report.error.unwrap_or_default()
                        );
                    }
                    Err(e @ (IndexError::Conflict { .. } | IndexError::NotFound(_))) => {
                        failed += 1;
                        println!("{}: rejected: {}", id, e);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            store.pool().close().await;
            if failed > 0 {
                bail!("{} of {} sources failed to index", failed, ids.len());
            }
        }
        Commands::Refresh => {
            let store = Arc::new(SqliteStore::open(&cfg).await?);
            let indexer = Indexer::from_config(&cfg, store.clone())?;
            let refreshed = indexer.refresh_due_sources(chrono::Utc::now()).await?;
            println!("Refreshed {} sources.", refreshed);
            store.pool().close().await;
        }
        Commands::Search {
            query,
            endpoint,
            limit,
            version,
            json,
        } => {
            search::run_search(&cfg, &query, &endpoint, limit, version.as_deref(), json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
