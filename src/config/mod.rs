//! Configuration module for State-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, plus `STATE_HARVEST_*` environment overrides.
//!
//! # Example
//!
//! ```no_run
//! use state_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("At most {} fetches in flight", config.pipeline.max_concurrent_requests);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, ExtractorConfig, OutputConfig, PipelineConfig, UserAgentConfig,
    DEFAULT_DATABASE_PATH, DEFAULT_GLOBAL_NAME,
};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, default_config, load_config,
    load_config_with_hash, parse_config,
};
