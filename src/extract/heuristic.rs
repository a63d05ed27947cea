//! Last-resort scan for JSON objects anywhere in a page

use crate::state::parse_state_json;
use regex::Regex;
use serde_json::Value;
use tracing::trace;

/// Top-level key fragments that mark an object as application state
const STATE_KEY_HINTS: [&str; 2] = ["data", "state"];

/// Finds balanced `{ ... }` regions that look like JSON objects
pub struct HeuristicScanner {
    quoted_key: Regex,
    max_candidates: usize,
}

impl HeuristicScanner {
    pub fn new(max_candidates: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            quoted_key: Regex::new(r#""[^"\\]*"\s*:"#)?,
            max_candidates,
        })
    }

    /// Returns the first candidate that parses to an object with a state-like
    /// top-level key
    ///
    /// Only the first `max_candidates` regions containing a quoted key are
    /// parsed. Parse failures are skipped.
    pub fn scan(&self, page: &str) -> Option<Value> {
        self.candidates(page)
            .take(self.max_candidates)
            .enumerate()
            .find_map(|(index, candidate)| {
                let value = match parse_state_json(candidate) {
                    Ok(value) => value,
                    Err(e) => {
                        trace!("Candidate {} is not JSON: {}", index + 1, e);
                        return None;
                    }
                };

                if has_state_key(&value) {
                    Some(value)
                } else {
                    trace!("Candidate {} has no state-like key", index + 1);
                    None
                }
            })
    }

    /// Non-overlapping balanced regions, left to right, that contain a quoted key
    fn candidates<'a>(&'a self, page: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let mut cursor = 0;
        balanced_regions(page)
            .into_iter()
            .filter_map(move |(start, end)| {
                if start < cursor {
                    return None;
                }
                cursor = end;
                Some(&page[start..end])
            })
            .filter(|region| self.quoted_key.is_match(region))
    }
}

/// Every matched `{ ... }` pair in one pass, ordered by start offset
///
/// Quotes only open strings inside an open brace, so stray quotes in page
/// text do not hide later objects. Braces left unclosed at the end are
/// dropped while the pairs inside them are kept.
fn balanced_regions(page: &str) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut regions = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in page.bytes().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push(offset),
            b'}' => {
                if let Some(start) = open.pop() {
                    regions.push((start, offset + 1));
                }
            }
            _ => {}
        }
    }

    regions.sort_unstable();
    regions
}

fn has_state_key(value: &Value) -> bool {
    value.as_object().is_some_and(|map| {
        map.keys().any(|key| {
            let key = key.to_lowercase();
            STATE_KEY_HINTS.iter().any(|hint| key.contains(hint))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn scanner() -> HeuristicScanner {
        HeuristicScanner::new(3).unwrap()
    }

    #[test]
    fn test_accepts_object_with_state_key() {
        let page = r#"<script>var cfg = {"pageData": {"id": 4}};</script>"#;
        assert_eq!(scanner().scan(page), Some(json!({"pageData": {"id": 4}})));
    }

    #[test]
    fn test_key_match_is_case_insensitive() {
        let page = r#"<script>x({"AppState": 1})</script>"#;
        assert_eq!(scanner().scan(page), Some(json!({"AppState": 1})));
    }

    #[test]
    fn test_rejects_objects_without_state_key() {
        let page = r#"<script>var a = {"theme": "dark"};</script>"#;
        assert_eq!(scanner().scan(page), None);
    }

    #[test]
    fn test_skips_unparseable_candidates() {
        let page = r#"<style>p {"x": oops}</style><script>{"data": [1]}</script>"#;
        assert_eq!(scanner().scan(page), Some(json!({"data": [1]})));
    }

    #[test]
    fn test_ignores_regions_without_quoted_keys() {
        let page = r#"body { color: red } a { margin: 0 } {"state": true}"#;
        assert_eq!(scanner().scan(page), Some(json!({"state": true})));
    }

    #[test]
    fn test_candidate_limit() {
        let page = r#"{"a":1} {"b":2} {"c":3} {"data":4}"#;
        assert_eq!(scanner().scan(page), None);
        assert_eq!(
            HeuristicScanner::new(4).unwrap().scan(page),
            Some(json!({"data": 4}))
        );
    }

    #[test]
    fn test_object_after_unclosed_brace() {
        let page = r#"<p>a { b</p><script>{"data": [1]}</script>"#;
        assert_eq!(scanner().scan(page), Some(json!({"data": [1]})));
    }

    #[test]
    fn test_stray_quote_outside_objects() {
        let page = r#"<p>He is 5'11" tall</p><script>{"state": 2}</script>"#;
        assert_eq!(scanner().scan(page), Some(json!({"state": 2})));
    }

    #[test]
    fn test_unbalanced_page_scans_in_linear_time() {
        let mut page = String::from("<p>\"</p>");
        page.push_str(&"<i>{</i>".repeat(40_000));
        page.push_str(r#"<script>{"data": true}</script>"#);

        let started = Instant::now();
        let found = scanner().scan(&page);
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "scan took {:?}",
            started.elapsed()
        );
        assert_eq!(found, Some(json!({"data": true})));
    }

    #[test]
    fn test_balanced_regions_nested_and_ordered() {
        let page = r#"{"a":{"b":"}"}} x {"c":1}"#;
        assert_eq!(balanced_regions(page), vec![(0, 15), (5, 14), (18, 25)]);
    }

    #[test]
    fn test_non_object_values_rejected() {
        assert!(!has_state_key(&json!(["data"])));
        assert!(has_state_key(&json!({"initialState": {}})));
    }
}
