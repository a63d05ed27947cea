//! State-Harvest: embedded application state crawler
//!
//! This crate fetches server-rendered pages, recovers the initial client-side
//! state that the rendering framework embedded in an inline script (for example
//! `window.__NUXT__ = {...}`), and records the result in a local store so that
//! a page is not fetched twice.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for State-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport, timeout, redirect-limit or non-2xx failure after all retries
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    /// The page was fetched but held no recoverable embedded state
    #[error("Extraction failed for {url}: {reason}")]
    Extraction { url: String, reason: String },

    #[error("Invalid target URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Concurrency limiter closed")]
    LimiterClosed(#[from] tokio::sync::AcquireError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true for failures that come from the network layer
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Returns true when the page was fetched but no state could be recovered
    pub fn is_extraction(&self) -> bool {
        matches!(self, Self::Extraction { .. })
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid environment override {key}='{value}': {reason}")]
    EnvOverride {
        key: String,
        value: String,
        reason: String,
    },
}

/// Result type alias for State-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{ConcurrencyLimiter, HttpFetcher, PageSource, Pipeline};
pub use extract::{ExtractionOutcome, Extractor, Strategy};
pub use storage::{CrawlRecord, RecordStatus, RecordStore, SqliteStorage};
