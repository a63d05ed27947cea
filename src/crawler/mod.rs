//! Crawler module for page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic
//! - Target validation and page title parsing
//! - Concurrency limiting
//! - The per-target crawl pipeline

mod fetcher;
mod limiter;
mod parser;
mod pipeline;

pub use fetcher::{
    build_http_client, random_user_agent, resolve_user_agent, FetchResult, HttpFetcher,
    PageSource, BROWSER_USER_AGENTS, DEFAULT_USER_AGENT,
};
pub use limiter::{ConcurrencyLimiter, Slot};
pub use parser::{parse_target, parse_title};
pub use pipeline::{Pipeline, SharedStore, NO_STATE_MESSAGE};

use crate::config::Config;
use crate::storage::CrawlRecord;
use crate::HarvestError;

/// Runs a complete crawl over `urls`
///
/// This is the main entry point for a batch crawl. It will:
/// 1. Open the record store
/// 2. Build the HTTP client and extractor
/// 3. Crawl every target in order, skipping ones already recorded
///
/// # Returns
///
/// * `Ok(Vec<Option<CrawlRecord>>)` - One entry per target, `None` for failures
/// * `Err(HarvestError)` - The pipeline could not be set up
pub async fn crawl(config: &Config, urls: &[String]) -> Result<Vec<Option<CrawlRecord>>, HarvestError> {
    let pipeline = Pipeline::from_config(config)?;
    Ok(pipeline.crawl_many(urls).await)
}
