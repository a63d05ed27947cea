//! State-Harvest main entry point
//!
//! This is the command-line interface for the State-Harvest crawler.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use state_harvest::config::{default_config, load_config_with_hash, Config};
use state_harvest::crawler::{parse_target, Pipeline};
use state_harvest::output::{describe_record, export_record, load_statistics, print_statistics};
use state_harvest::state::{select, summarize, StatePath};
use state_harvest::storage::{open_storage, CrawlRecord, RecordStore, SqliteStorage};
use tracing_subscriber::EnvFilter;

/// State-Harvest: embedded application state crawler
///
/// State-Harvest fetches server-rendered pages, recovers the initial state
/// the page embeds for its client-side application (such as
/// `window.__NUXT__`), and stores it so that pages are not fetched twice.
#[derive(Parser, Debug)]
#[command(name = "state-harvest")]
#[command(version)]
#[command(about = "Crawl pages and harvest their embedded application state", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

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
    /// Crawl one or more pages, skipping pages already recorded
    Crawl {
        /// Target URLs, crawled in order
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,

        /// Write the state of the last successful page to this JSON file
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,
    },

    /// List the most recent records
    Recent {
        #[arg(default_value_t = 10)]
        limit: usize,
    },

    /// Show the latest record for a URL
    Find {
        url: String,
    },

    /// Print the value at a path inside a URL's latest extracted state
    Select {
        url: String,

        /// Path such as `data[1].standingData.content.rounds[0]`
        path: String,
    },

    /// Show record counts by status
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load_configuration(cli.config.as_deref())?;

    match cli.command {
        Command::Crawl { urls, export } => handle_crawl(&config, &urls, export.as_deref()).await,
        Command::Recent { limit } => handle_recent(&config, limit),
        Command::Find { url } => handle_find(&config, &url),
        Command::Select { url, path } => handle_select(&config, &url, &path),
        Command::Stats => handle_stats(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("state_harvest=info,warn"),
            1 => EnvFilter::new("state_harvest=debug,info"),
            2 => EnvFilter::new("state_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_configuration(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            Ok(config)
        }
        None => {
            tracing::debug!("No configuration file given, using defaults");
            Ok(default_config()?)
        }
    }
}

fn open_store(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = &config.output.database_path;
    open_storage(Path::new(path)).with_context(|| format!("Failed to open database {}", path))
}

fn latest_record(config: &Config, url: &str) -> anyhow::Result<Option<CrawlRecord>> {
    let key = parse_target(url)?;
    Ok(open_store(config)?.latest(key.as_str())?)
}

/// Handles the crawl command: crawls targets in order and prints one line each
async fn handle_crawl(config: &Config, urls: &[String], export: Option<&Path>) -> anyhow::Result<()> {
    tracing::info!(
        "Crawling {} target(s) with up to {} concurrent requests",
        urls.len(),
        config.pipeline.max_concurrent_requests
    );

    let pipeline = Pipeline::from_config(config)?;
    let results = pipeline.crawl_many(urls).await;

    for (url, result) in urls.iter().zip(&results) {
        match result {
            Some(record) => println!("{}", describe_record(record)),
            None => println!("[error] {}", url),
        }
    }

    if let Some(path) = export {
        let last_success = results.iter().flatten().filter(|r| r.is_success()).last();
        match last_success {
            Some(record) => {
                export_record(record, pipeline.extractor().global_name(), path)?;
                println!("✓ State exported to: {}", path.display());
            }
            None => tracing::warn!("No successful crawl to export"),
        }
    }

    if results.iter().all(Option::is_none) {
        bail!("All {} target(s) failed", urls.len());
    }
    Ok(())
}

/// Handles the recent command: lists the newest records
fn handle_recent(config: &Config, limit: usize) -> anyhow::Result<()> {
    let records = open_store(config)?.recent(limit)?;
    if records.is_empty() {
        println!("No records in {}", config.output.database_path);
    }
    for record in &records {
        println!("{}", describe_record(record));
    }
    Ok(())
}

/// Handles the find command: shows the latest record with a state summary
fn handle_find(config: &Config, url: &str) -> anyhow::Result<()> {
    let Some(record) = latest_record(config, url)? else {
        bail!("No record for {}", url);
    };

    println!("URL:        {}", record.source_url);
    println!("Status:     {}", record.status);
    println!("Scraped at: {}", record.scraped_at.to_rfc3339());
    if let Some(title) = &record.title {
        println!("Title:      {}", title);
    }
    if let Some(message) = &record.error_message {
        println!("Error:      {}", message);
    }
    if let Some(data) = &record.extracted_data {
        println!("State:      {}", summarize(data));
    }
    Ok(())
}

/// Handles the select command: prints the JSON value at a path
fn handle_select(config: &Config, url: &str, path: &str) -> anyhow::Result<()> {
    let path: StatePath = path.parse()?;
    let Some(record) = latest_record(config, url)? else {
        bail!("No record for {}", url);
    };
    let Some(data) = &record.extracted_data else {
        bail!("Latest record for {} has no extracted state", url);
    };

    let value = select(data, &path)?;
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Handles the stats command: shows record counts by status
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);
    let storage = open_store(config)?;
    print_statistics(&load_statistics(&storage)?);
    Ok(())
}
