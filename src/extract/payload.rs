//! Payload normalization and decoding
//!
//! A payload is the right-hand side of a state assignment as captured by one
//! of the assignment patterns. It is either a JSON document or a
//! function-wrapped expression that must be evaluated or unwrapped first.

use super::evaluator::evaluate_function_call;
use crate::state::parse_state_json;
use serde_json::Value;
use tracing::{debug, warn};

/// Trims whitespace and strips one trailing `;`
pub fn normalize(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_suffix(';')
        .map(str::trim_end)
        .unwrap_or(trimmed)
}

/// Returns true when the payload is a function expression, optionally wrapped
/// in parentheses
pub fn is_function_wrapped(payload: &str) -> bool {
    let rest = payload.trim_start_matches(|c: char| c == '(' || c.is_whitespace());
    rest.strip_prefix("function")
        .map(|after| after.trim_start().starts_with('(') || starts_with_name(after))
        .unwrap_or(false)
}

fn starts_with_name(after: &str) -> bool {
    // `function name(` but not `functionName(`
    after.starts_with(char::is_whitespace)
        && after
            .trim_start()
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$')
            .trim_start()
            .starts_with('(')
}

/// Decodes a normalized payload into a JSON value
///
/// Function-wrapped payloads go through the restricted evaluator (when
/// `evaluate` is set), then the `return { ... }` fallback, then a direct JSON
/// parse. Plain payloads are parsed as JSON directly. The error string
/// describes the last failure.
pub fn decode(payload: &str, evaluate: bool) -> Result<Value, String> {
    if is_function_wrapped(payload) {
        if evaluate {
            match evaluate_function_call(payload) {
                Ok(value) => return Ok(value),
                Err(e) => warn!("Function-wrapped state could not be evaluated: {}", e),
            }
        }

        if let Some(value) = return_clause_object(payload) {
            debug!("Recovered state from return clause");
            return Ok(value);
        }
    }

    parse_state_json(payload).map_err(|e| format!("invalid JSON payload: {}", e))
}

/// Finds the first `return { ... }` in the payload whose object literal is
/// valid JSON
fn return_clause_object(payload: &str) -> Option<Value> {
    for (index, keyword) in payload.match_indices("return") {
        let after = &payload[index + keyword.len()..];
        let rest = after.trim_start();
        if !rest.starts_with('{') {
            continue;
        }

        let start = payload.len() - rest.len();
        let Some(end) = balanced_object_end(payload, start) else {
            continue;
        };

        match parse_state_json(&payload[start..end]) {
            Ok(value) => return Some(value),
            Err(e) => debug!("Return clause at {} is not strict JSON: {}", start, e),
        }
    }
    None
}

/// Returns the byte offset just past the `}` matching the `{` at `start`
///
/// Braces inside double-quoted strings are ignored.
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}
