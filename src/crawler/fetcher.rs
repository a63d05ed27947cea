//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients that present a realistic browser identity
//! - GET requests with timeout and redirect limits
//! - Retry with linearly increasing delay
//! - Error classification

use crate::config::{Config, PipelineConfig, UserAgentConfig};
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS};
use reqwest::{redirect::Policy, Client};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Browser identity used when no custom agent is configured
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Real browser agents rotated through when impersonating
pub const BROWSER_USER_AGENTS: &[&str] = &[
    DEFAULT_USER_AGENT,
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGES: &str = "en-US,en;q=0.9,zh-CN;q=0.8,zh;q=0.7";

/// A successfully fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// URL after redirects
    pub final_url: String,
    pub status_code: u16,
    pub body: String,
}

/// Source of page bodies for the crawl pipeline
///
/// Implementations own their retry policy: an `Err` is final.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResult, HarvestError>;
}

/// Picks a browser agent from the built-in list
pub fn random_user_agent() -> &'static str {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as usize)
        .unwrap_or(0);
    BROWSER_USER_AGENTS[nanos % BROWSER_USER_AGENTS.len()]
}

/// Resolves the User-Agent header value
///
/// A custom agent wins; otherwise a rotating browser agent when impersonating,
/// else the default browser agent.
pub fn resolve_user_agent(config: &UserAgentConfig) -> String {
    match (&config.custom, config.impersonate) {
        (Some(custom), _) => custom.clone(),
        (None, true) => random_user_agent().to_string(),
        (None, false) => DEFAULT_USER_AGENT.to_string(),
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `pipeline` - Timeout and redirect limit
/// * `user_agent` - Which browser identity to present
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    pipeline: &PipelineConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGES));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

    Client::builder()
        .user_agent(resolve_user_agent(user_agent))
        .default_headers(headers)
        .timeout(pipeline.timeout())
        .redirect(Policy::limited(pipeline.max_redirects as usize))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Retrying HTTP page source
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | 2xx | Return body |
/// | Any other status | Retry |
/// | Timeout | Retry |
/// | Connection failure | Retry |
/// | Redirect chain > limit | Retry |
///
/// Attempt `n` (0-based) that fails is followed by a sleep of
/// `request_delay * (n + 1)` unless it was the last of `max_retries` attempts.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(client: Client, pipeline: &PipelineConfig) -> Self {
        Self {
            client,
            max_retries: pipeline.max_retries.max(1),
            retry_delay: pipeline.request_delay(),
        }
    }

    /// Builds the client and fetcher from a full configuration
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        let client = build_http_client(&config.pipeline, &config.user_agent)?;
        Ok(Self::new(client, &config.pipeline))
    }

    /// Fetches `url`, retrying from `attempt` until the retry budget is spent
    pub async fn fetch_from(&self, url: &str, attempt: u32) -> Result<FetchResult, HarvestError> {
        let result = retry_linear(url, attempt, self.max_retries, self.retry_delay, || {
            self.fetch_once(url)
        })
        .await
        .map_err(|message| HarvestError::Network {
            url: url.to_string(),
            message,
        })?;

        debug!(
            "Fetched {} ({} bytes, HTTP {})",
            result.final_url,
            result.body.len(),
            result.status_code
        );
        Ok(result)
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchResult, String> {
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let body = response.text().await.map_err(classify)?;

        Ok(FetchResult {
            final_url,
            status_code: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResult, HarvestError> {
        self.fetch_from(url, 0).await
    }
}

/// Runs `operation` for attempts `attempt..max_retries` until one succeeds
///
/// A failed attempt `n` is followed by a sleep of `delay * (n + 1)`, except
/// after the last one.
async fn retry_linear<T, F, Fut>(
    url: &str,
    mut attempt: u32,
    max_retries: u32,
    delay: Duration,
    mut operation: F,
) -> Result<T, String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(message) => {
                warn!(
                    "Fetch attempt {}/{} for {} failed: {}",
                    attempt + 1,
                    max_retries,
                    url,
                    message
                );

                if attempt + 1 >= max_retries {
                    return Err(message);
                }

                tokio::time::sleep(delay * (attempt + 1)).await;
                attempt += 1;
            }
        }
    }
}

fn classify(e: reqwest::Error) -> String {
    if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_redirect() {
        "Too many redirects".to_string()
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        e.to_string()
    }
}
