use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_REQUEST_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: u32 = 5;
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;
pub const DEFAULT_GLOBAL_NAME: &str = "__NUXT__";
pub const DEFAULT_HEURISTIC_CANDIDATES: usize = 3;
pub const DEFAULT_DATABASE_PATH: &str = "./state-harvest.db";

/// Main configuration structure for State-Harvest
///
/// Every section is optional in the TOML file; missing sections take their
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub extractor: ExtractorConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawl pipeline behavior, fixed for the lifetime of a pipeline instance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pause after each fetching crawl, and the base of the retry backoff (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Total number of fetch attempts per target
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Abort threshold for a single fetch attempt (milliseconds)
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Maximum number of fetches in flight at once
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: u32,

    /// Maximum redirect hops followed per fetch
    #[serde(rename = "max-redirects")]
    pub max_redirects: u32,
}

impl PipelineConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

/// State extractor configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Name of the global the page assigns its state to (e.g. `__NUXT__`)
    #[serde(rename = "global-name")]
    pub global_name: String,

    /// Whether function-wrapped payloads go through the restricted evaluator
    #[serde(rename = "evaluate-functions")]
    pub evaluate_functions: bool,

    /// How many JSON-shaped candidates the heuristic scan parses
    #[serde(rename = "heuristic-candidates")]
    pub heuristic_candidates: usize,
}

impl ExtractorConfig {
    /// The global name without a leading `window.` qualifier
    pub fn bare_global_name(&self) -> &str {
        let name = self.global_name.trim();
        name.strip_prefix("window.").unwrap_or(name)
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            global_name: DEFAULT_GLOBAL_NAME.to_string(),
            evaluate_functions: true,
            heuristic_candidates: DEFAULT_HEURISTIC_CANDIDATES,
        }
    }
}

/// Browser identity presented to crawled sites
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Rotate through real browser user agents instead of the fixed default
    pub impersonate: bool,

    /// Explicit user agent string; wins over `impersonate`
    pub custom: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}
