//! Target URL and HTML page parsing
//!
//! This module handles:
//! - Validating crawl targets as absolute http(s) URLs
//! - Reading the page title from fetched HTML

use crate::HarvestError;
use scraper::{Html, Selector};
use url::Url;

/// Parses a crawl target into an absolute http(s) URL
///
/// The parsed URL's string form is the key records are stored under, so
/// `https://Example.com` and `https://example.com/` share records.
///
/// # Example
///
/// ```
/// use state_harvest::crawler::parse_target;
///
/// let url = parse_target("https://Example.com").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/");
/// assert!(parse_target("ftp://example.com/").is_err());
/// ```
pub fn parse_target(target: &str) -> Result<Url, HarvestError> {
    let url = Url::parse(target.trim()).map_err(|e| HarvestError::InvalidUrl {
        url: target.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(HarvestError::InvalidUrl {
            url: target.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Extracts the trimmed text of the first non-empty `<title>` element
pub fn parse_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}
