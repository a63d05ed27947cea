//! State module for working with extracted application state
//!
//! # Components
//!
//! - `StatePath` / `select`: typed access into the extracted tree, reporting
//!   `SchemaMismatch` when the tree does not have the expected shape
//! - `StateSummary`: shape overview used in logs and CLI output
//! - `parse_state_json`: the one JSON reader for state, shared by extraction
//!   and storage so that everything extracted can be read back

mod accessor;
mod summary;

// Re-export main types
pub use accessor::{select, select_as, PathSegment, SchemaMismatch, StatePath};
pub use summary::{summarize, StateSummary, MAX_LISTED_KEYS};

use serde::de::Error as _;
use serde::Deserialize;
use serde_json::Value;

/// Deepest container nesting accepted in extracted state
pub const MAX_STATE_DEPTH: usize = 512;

/// Parses JSON text nested up to [`MAX_STATE_DEPTH`] levels
///
/// serde_json's own limit of 128 is lifted; the stack grows on demand while
/// deserializing.
pub fn parse_state_json(text: &str) -> serde_json::Result<Value> {
    let depth = nesting_depth(text);
    if depth > MAX_STATE_DEPTH {
        return Err(serde_json::Error::custom(format!(
            "nesting depth {} exceeds {}",
            depth, MAX_STATE_DEPTH
        )));
    }

    let mut json = serde_json::Deserializer::from_str(text);
    json.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut json))?;
    json.end()?;
    Ok(value)
}

/// Rejects values nested deeper than [`MAX_STATE_DEPTH`]
pub fn check_state_depth(value: &Value) -> serde_json::Result<()> {
    let depth = value_depth(value);
    if depth > MAX_STATE_DEPTH {
        return Err(serde_json::Error::custom(format!(
            "nesting depth {} exceeds {}",
            depth, MAX_STATE_DEPTH
        )));
    }
    Ok(())
}

/// Container nesting of `value`; scalars are 0
pub fn value_depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(value_depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(value_depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Deepest `[`/`{` nesting in JSON text, ignoring brackets inside strings
fn nesting_depth(text: &str) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0;
    let mut in_string = false;
    let mut escaped = false;

    for byte in text.bytes() {
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
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

/// Name of the JSON kind of `value`
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
