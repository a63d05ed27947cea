//! Shape summary of extracted state

use super::value_kind;
use serde_json::Value;
use std::fmt;

/// Maximum number of top-level keys listed in a summary
pub const MAX_LISTED_KEYS: usize = 10;

/// Overview of an extracted JSON tree, for logs and CLI output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSummary {
    /// Kind of the root value
    pub root_kind: &'static str,
    /// First top-level keys with the kind of each value
    pub top_keys: Vec<(String, &'static str)>,
    /// Number of top-level keys (objects) or items (arrays)
    pub top_level_len: usize,
    pub total_nodes: usize,
    pub max_depth: usize,
}

/// Walks `value` and summarizes its shape
pub fn summarize(value: &Value) -> StateSummary {
    let (total_nodes, max_depth) = walk(value, 0);

    let top_keys = match value {
        Value::Object(map) => map
            .iter()
            .take(MAX_LISTED_KEYS)
            .map(|(key, v)| (key.clone(), value_kind(v)))
            .collect(),
        _ => Vec::new(),
    };

    let top_level_len = match value {
        Value::Object(map) => map.len(),
        Value::Array(items) => items.len(),
        _ => 0,
    };

    StateSummary {
        root_kind: value_kind(value),
        top_keys,
        top_level_len,
        total_nodes,
        max_depth,
    }
}

fn walk(value: &Value, depth: usize) -> (usize, usize) {
    let children: Box<dyn Iterator<Item = &Value> + '_> = match value {
        Value::Object(map) => Box::new(map.values()),
        Value::Array(items) => Box::new(items.iter()),
        _ => return (1, depth),
    };

    children.fold((1, depth), |(nodes, deepest), child| {
        let (child_nodes, child_depth) = walk(child, depth + 1);
        (nodes + child_nodes, deepest.max(child_depth))
    })
}

impl fmt::Display for StateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} with {} entries, {} nodes, depth {}",
            self.root_kind, self.top_level_len, self.total_nodes, self.max_depth
        )?;

        if !self.top_keys.is_empty() {
            let keys: Vec<String> = self
                .top_keys
                .iter()
                .map(|(key, kind)| format!("{}: {}", key, kind))
                .collect();
            write!(f, " [{}", keys.join(", "))?;
            if self.top_level_len > self.top_keys.len() {
                write!(f, ", ...")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}
