//! # Sentinel CLI (`sentinel`)
//!
//! ## Usage
//!
//! ```bash
//! sentinel --config ./config/sentinel.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sentinel init` | Create the SQLite database and record the embedding dimension |
//! | `sentinel sources` | List configured feeds |
//! | `sentinel ingest` | Run one ingestion cycle over every source |
//! | `sentinel ask "<question>"` | Retrieve context and answer with the configured model |
//! | `sentinel search "<query>"` | Show ranked matches with similarity scores |
//! | `sentinel get <id>` | Print one stored document |
//! | `sentinel stats` | Document counts and freshness |
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info` level);
//! stdout carries command output only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sentinel::{config, get, ingest, migrate, query, sources, stats};

/// Sentinel: financial news retrieval and grounded question answering.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sentinel.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "sentinel",
    about = "Financial news ingestion and retrieval-augmented question answering",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sentinel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database and records the configured embedding
    /// dimension. Safe to run repeatedly; fails if the database was
    /// created with a different dimension.
    Init,

    /// List configured sources.
    Sources,

    /// Run one ingestion cycle.
    ///
    /// Fetches every configured source for the recency window, normalizes
    /// and deduplicates items, embeds new or changed documents, and
    /// upserts them. Individual item failures are reported, not fatal.
    Ingest {
        /// Fetch and normalize only; embed and write nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a question from stored news.
    Ask {
        /// The question, e.g. "Why did NVDA drop today?".
        question: String,

        /// Restrict context to one ticker symbol.
        #[arg(long)]
        ticker: Option<String>,

        /// Minimum similarity (exclusive), overriding `retrieval.match_threshold`.
        #[arg(long)]
        threshold: Option<f32>,

        /// Maximum context documents, overriding `retrieval.match_count`.
        #[arg(long)]
        count: Option<usize>,

        /// Print the assembled prompt instead of calling the model.
        #[arg(long)]
        prompt_only: bool,
    },

    /// Search stored documents by semantic similarity.
    Search {
        query: String,

        #[arg(long)]
        ticker: Option<String>,

        #[arg(long)]
        threshold: Option<f32>,

        #[arg(long)]
        count: Option<usize>,
    },

    /// Print a stored document by id.
    Get { id: String },

    /// Show store statistics.
    Stats,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Ingest { dry_run } => {
            ingest::run_ingest(&cfg, dry_run).await?;
        }
        Commands::Ask {
            question,
            ticker,
            threshold,
            count,
            prompt_only,
        } => {
            query::run_ask(
                &cfg,
                &question,
                ticker.as_deref(),
                threshold,
                count,
                prompt_only,
            )
            .await?;
        }
        Commands::Search {
            query,
            ticker,
            threshold,
            count,
        } => {
            query::run_search(&cfg, &query, ticker.as_deref(), threshold, count).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
