//! Guidance-Indexer main entry point
//!
//! This is the command-line interface for building and querying the
//! guidance search index.

use anyhow::{bail, Context};
use chrono::Local;
use clap::{Parser, Subcommand};
use guidance_indexer::channel::run_worker;
use guidance_indexer::config::{load_config, load_config_with_hash, Config};
use guidance_indexer::crawler::{Coordinator, StartOutcome};
use guidance_indexer::index::{QueryEngine, SearchOutcome};
use guidance_indexer::state::StatusUpdate;
use guidance_indexer::storage::{load_index, open_store};
use guidance_indexer::IndexError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Guidance-Indexer: offline full-text search over a guidance collection
///
/// Crawls the guidance listing page, extracts every linked document in an
/// isolated parsing context, and persists a searchable index.
#[derive(Parser, Debug)]
#[command(name = "guidance-indexer")]
#[command(version = "1.0.0")]
#[command(about = "Crawl and search a guidance collection offline", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the index from the listing page
    Crawl {
        /// Path to TOML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Search the persisted index
    Search {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Query text; multiple words are matched as a phrase first
        #[arg(value_name = "QUERY", num_args = 1.., required = true)]
        query: Vec<String>,
    },

    /// Show what is currently persisted
    Status {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Validate config and show what would be crawled without crawling
    Check {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Serve parse requests on stdin/stdout
    #[command(hide = true)]
    ExtractWorker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Crawl { config } => handle_crawl(&config).await,
        Command::Search { config, query } => handle_search(&config, &query.join(" ")),
        Command::Status { config } => handle_status(&config),
        Command::Check { config } => handle_check(&config),
        Command::ExtractWorker => handle_worker(),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr; stdout belongs to command output and, in the worker,
/// to the response stream.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("guidance_indexer=info,warn"),
            1 => EnvFilter::new("guidance_indexer=debug,info"),
            2 => EnvFilter::new("guidance_indexer=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn load(path: &Path) -> anyhow::Result<(Config, String)> {
    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);
    Ok((config, hash))
}

/// Handles the crawl command: full rebuild with live progress
async fn handle_crawl(path: &Path) -> anyhow::Result<()> {
    let (config, hash) = load(path)?;

    let (updates, mut receiver) = broadcast::channel::<StatusUpdate>(64);
    let coordinator = Coordinator::from_config(config, Some(hash), Arc::new(updates))?;

    let printer = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(update) => {
                    println!("{}", update.text);
                    if update.done {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!("Status printer skipped {} updates", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    match coordinator.begin() {
        StartOutcome::Started => {}
        StartOutcome::AlreadyRunning => bail!("A crawl is already running"),
        StartOutcome::Unavailable(reason) => bail!("Cannot start crawl: {}", reason),
    }

    let result = coordinator.run().await;
    drop(coordinator);
    printer.await.context("Status printer failed")?;

    let count = result?;
    tracing::info!("Indexed {} documents", count);
    Ok(())
}

/// Handles the search command
fn handle_search(path: &Path, query: &str) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let store = open_store(Path::new(&config.output.database_path))?;

    let engine = match QueryEngine::load(&store) {
        Ok(engine) => engine,
        Err(IndexError::Unavailable(reason)) => {
            println!("Search index unavailable: {}", reason);
            println!("Run `guidance-indexer crawl {}` first.", path.display());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match engine.search(query)? {
        SearchOutcome::Cleared => println!(
            "Query too short: type at least {} characters.",
            guidance_indexer::index::MIN_QUERY_CHARS
        ),
        SearchOutcome::NoMatches => println!("No matches for \"{}\".", query.trim()),
        SearchOutcome::Matches(hits) => {
            println!("Results for \"{}\" ({}):\n", query.trim(), hits.len());
            for (rank, hit) in hits.iter().enumerate() {
                println!("{:>2}. {} [{:.3}]", rank + 1, hit.title, hit.score);
                println!("    {}", hit.id);
            }
        }
    }

    Ok(())
}

/// Handles the status command: shows the persisted index, if any
fn handle_status(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let store = open_store(Path::new(&config.output.database_path))?;

    println!("Database: {}\n", config.output.database_path);

    let Some(record) = load_index(&store)? else {
        println!("Index not built yet.");
        return Ok(());
    };

    let engine = QueryEngine::load(&store)?;
    println!("Index loaded from storage. Ready.");
    println!("  Documents: {}", engine.document_count());
    println!(
        "  Created: {}",
        record.created_at.with_timezone(&Local).format("%d/%m/%y")
    );
    match record.config_hash {
        Some(hash) => println!("  Config hash: {}", hash),
        None => println!("  Config hash: (not recorded)"),
    }

    Ok(())
}

/// Handles the check command: validates config and shows what would be crawled
fn handle_check(path: &Path) -> anyhow::Result<()> {
    let (config, hash) = load(path)?;

    println!("=== Guidance-Indexer Check ===\n");

    println!("Site:");
    println!("  Listing page: {}", config.site.listing_url);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nFetch:");
    println!("  Request timeout: {}s", config.fetch.request_timeout_secs);

    println!("\nParsing worker:");
    println!("  Mode: {:?}", config.worker.mode);
    println!("  Response timeout: {}s", config.worker.parse_timeout_secs);
    if let Some(program) = &config.worker.program {
        println!("  Program: {}", program);
    }
    println!("  Args: {:?}", config.worker.args);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Config hash: {}", hash);

    if let Err(reason) = guidance_indexer::crawler::preflight() {
        bail!("Library check failed: {}", reason);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would rebuild the index from {}", config.site.listing_url);

    Ok(())
}

/// Handles the hidden extract-worker command
fn handle_worker() -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let handled = run_worker(stdin.lock(), stdout.lock()).context("Extraction worker failed")?;
    tracing::debug!("Extraction worker answered {} requests", handled);
    Ok(())
}
