//! Embedded state extraction
//!
//! Server-rendering frameworks serialize the initial application state into an
//! inline script, e.g. `<script>window.__NUXT__={...}</script>`. The
//! [`Extractor`] recovers that state with a cascade of strategies of
//! decreasing specificity:
//!
//! 1. the assignment followed by a `</script>` boundary
//! 2. the assignment terminated by the next `;`
//! 3. a heuristic scan for JSON objects with state-like keys
//!
//! The first strategy that yields data wins. Payloads may be plain JSON or a
//! function-wrapped expression, see [`payload`] and [`evaluator`].

pub mod evaluator;
pub mod heuristic;
pub mod payload;

use crate::config::ExtractorConfig;
use heuristic::HeuristicScanner;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::fmt;
use tracing::debug;

pub use evaluator::{evaluate_function_call, EvalError};

/// Which step of the cascade produced the data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Primary,
    Relaxed,
    Heuristic,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Relaxed => write!(f, "relaxed"),
            Self::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Result of running the cascade over one page
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Extracted { data: Value, strategy: Strategy },
    /// No state assignment and no state-like JSON object in the page
    NotFound,
    /// A state assignment was located but none of its payloads could be decoded
    Malformed { reason: String },
}

impl ExtractionOutcome {
    pub fn is_extracted(&self) -> bool {
        matches!(self, Self::Extracted { .. })
    }

    /// Consumes the outcome, returning the data if any
    pub fn into_data(self) -> Option<Value> {
        match self {
            Self::Extracted { data, .. } => Some(data),
            _ => None,
        }
    }
}

/// Compiled extraction cascade for one global variable name
pub struct Extractor {
    global_name: String,
    primary: Regex,
    relaxed: Regex,
    heuristic: HeuristicScanner,
    evaluate_functions: bool,
}

impl Extractor {
    /// Compiles the patterns for `config.global_name`
    ///
    /// A leading `window.` in the configured name is ignored; the patterns
    /// accept the assignment with or without it. The name must not be the
    /// tail of a longer identifier or a member of another object.
    pub fn new(config: &ExtractorConfig) -> Result<Self, regex::Error> {
        let target = format!(
            r"(?:^|[^\w$.])(?:window\.)?{}\s*=\s*",
            regex::escape(config.bare_global_name())
        );

        let primary = RegexBuilder::new(&format!(r"{}(.*?);?\s*</script>", target))
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()?;

        let relaxed = RegexBuilder::new(&format!(r"{}(.*?);", target))
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()?;

        Ok(Self {
            global_name: config.bare_global_name().to_string(),
            primary,
            relaxed,
            heuristic: HeuristicScanner::new(config.heuristic_candidates)?,
            evaluate_functions: config.evaluate_functions,
        })
    }

    pub fn global_name(&self) -> &str {
        &self.global_name
    }

    /// Runs the cascade over `page`
    pub fn extract(&self, page: &str) -> ExtractionOutcome {
        let mut failure = None;

        for (strategy, pattern) in [
            (Strategy::Primary, &self.primary),
            (Strategy::Relaxed, &self.relaxed),
        ] {
            let Some(captures) = pattern.captures(page) else {
                debug!("{} pattern did not match {}", strategy, self.global_name);
                continue;
            };
            let raw = captures.get(1).map_or("", |m| m.as_str());

            match payload::decode(payload::normalize(raw), self.evaluate_functions) {
                Ok(data) => {
                    debug!("Extracted {} with {} pattern", self.global_name, strategy);
                    return ExtractionOutcome::Extracted { data, strategy };
                }
                Err(reason) => {
                    debug!("{} pattern matched but payload failed: {}", strategy, reason);
                    failure = Some(reason);
                }
            }
        }

        if let Some(data) = self.heuristic.scan(page) {
            debug!("Extracted state-like object with heuristic scan");
            return ExtractionOutcome::Extracted {
                data,
                strategy: Strategy::Heuristic,
            };
        }

        match failure {
            Some(reason) => ExtractionOutcome::Malformed { reason },
            None => ExtractionOutcome::NotFound,
        }
    }
}
