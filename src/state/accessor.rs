//! Typed access into extracted state
//!
//! Extracted state is an arbitrary JSON tree whose shape belongs to the site
//! that produced it. Instead of indexing into it blindly, callers describe the
//! location with a [`StatePath`] such as `data[1].standingData.content.rounds[0]`
//! and get back either the value or a [`SchemaMismatch`] that says where the
//! tree diverged from the expected shape.

use super::value_kind;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One step of a [`StatePath`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) if is_plain_key(key) => write!(f, ".{}", key),
            Self::Key(key) => write!(f, "[{:?}]", key),
            Self::Index(index) => write!(f, "[{}]", index),
        }
    }
}

fn is_plain_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '-')
}

/// Location inside a JSON tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePath {
    segments: Vec<PathSegment>,
}

impl StatePath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the path made of the first `len` segments
    fn prefix(&self, len: usize) -> StatePath {
        StatePath {
            segments: self.segments[..len].to_vec(),
        }
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("$");
        }
        let mut rendered = String::new();
        for segment in &self.segments {
            rendered.push_str(&segment.to_string());
        }
        f.write_str(rendered.strip_prefix('.').unwrap_or(&rendered))
    }
}

impl FromStr for StatePath {
    type Err = SchemaMismatch;

    /// Parses `a.b[0]["key with spaces"].c`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| SchemaMismatch::InvalidPath {
            path: s.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut chars = s.trim().chars().peekable();
        let mut expect_key = true;

        while let Some(&c) = chars.peek() {
            match c {
                '.' => {
                    chars.next();
                    if expect_key && !segments.is_empty() {
                        return Err(invalid("empty key"));
                    }
                    expect_key = true;
                }
                '[' => {
                    chars.next();
                    let mut inner = String::new();
                    let mut closed = false;
                    if matches!(chars.peek(), Some('"') | Some('\'')) {
                        let quote = chars.next().unwrap_or('"');
                        let mut escaped = false;
                        for c in chars.by_ref() {
                            if escaped {
                                inner.push(c);
                                escaped = false;
                            } else if c == '\\' {
                                escaped = true;
                            } else if c == quote {
                                closed = true;
                                break;
                            } else {
                                inner.push(c);
                            }
                        }
                        if !closed || chars.next() != Some(']') {
                            return Err(invalid("unterminated quoted key"));
                        }
                        segments.push(PathSegment::Key(inner));
                    } else {
                        for c in chars.by_ref() {
                            if c == ']' {
                                closed = true;
                                break;
                            }
                            inner.push(c);
                        }
                        if !closed {
                            return Err(invalid("missing ']'"));
                        }
                        let index = inner
                            .trim()
                            .parse()
                            .map_err(|_| invalid("index must be a non-negative integer"))?;
                        segments.push(PathSegment::Index(index));
                    }
                    expect_key = false;
                }
                _ => {
                    if !expect_key {
                        return Err(invalid("expected '.' or '['"));
                    }
                    let mut key = String::new();
                    while let Some(&c) = chars.peek() {
                        if c == '.' || c == '[' {
                            break;
                        }
                        key.push(c);
                        chars.next();
                    }
                    segments.push(PathSegment::Key(key));
                    expect_key = false;
                }
            }
        }

        if expect_key && !segments.is_empty() {
            return Err(invalid("trailing '.'"));
        }

        Ok(Self { segments })
    }
}

/// Extracted state did not have the expected shape
#[derive(Debug, Error)]
pub enum SchemaMismatch {
    #[error("missing key '{key}' at {at}")]
    MissingKey { at: String, key: String },

    #[error("index {index} out of bounds at {at} (length {len})")]
    IndexOutOfBounds { at: String, index: usize, len: usize },

    #[error("expected {expected} at {at}, found {found}")]
    WrongType {
        at: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("value at {at} does not match the requested type: {source}")]
    Deserialize {
        at: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

/// Returns the value at `path`
pub fn select<'v>(root: &'v Value, path: &StatePath) -> Result<&'v Value, SchemaMismatch> {
    let mut current = root;

    for (depth, segment) in path.segments.iter().enumerate() {
        let at = path.prefix(depth).to_string();
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => {
                map.get(key).ok_or_else(|| SchemaMismatch::MissingKey {
                    at,
                    key: key.clone(),
                })?
            }
            (PathSegment::Index(index), Value::Array(items)) => {
                items
                    .get(*index)
                    .ok_or_else(|| SchemaMismatch::IndexOutOfBounds {
                        at,
                        index: *index,
                        len: items.len(),
                    })?
            }
            (PathSegment::Key(_), other) => {
                return Err(SchemaMismatch::WrongType {
                    at,
                    expected: "object",
                    found: value_kind(other),
                })
            }
            (PathSegment::Index(_), other) => {
                return Err(SchemaMismatch::WrongType {
                    at,
                    expected: "array",
                    found: value_kind(other),
                })
            }
        };
    }

    Ok(current)
}

/// Returns the value at `path` deserialized as `T`
pub fn select_as<T: DeserializeOwned>(root: &Value, path: &StatePath) -> Result<T, SchemaMismatch> {
    let value = select(root, path)?;
    T::deserialize(value).map_err(|source| SchemaMismatch::Deserialize {
        at: path.to_string(),
        source,
    })
}
