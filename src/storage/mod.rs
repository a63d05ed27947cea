//! Storage module for persisting crawl records
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Appending one record per crawl attempt
//! - Most-recent-first lookups used for deduplication and reporting

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{RecordStore, StorageError, StorageResult};

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Outcome status of a crawl attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Failed,
    Partial,
}

impl RecordStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// One crawl attempt for a source URL
///
/// Records are created once and never updated; a URL may have several
/// historical records, and lookups return the most recent one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlRecord {
    /// Row id assigned by the store; `None` until the record is persisted
    pub id: Option<i64>,
    pub source_url: String,
    /// Text of the page `<title>`, when a page was fetched
    pub title: Option<String>,
    pub extracted_data: Option<Value>,
    pub status: RecordStatus,
    pub scraped_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl CrawlRecord {
    /// A successful crawl carrying the extracted state
    pub fn success(source_url: &str, title: Option<String>, data: Value) -> Self {
        Self {
            id: None,
            source_url: source_url.to_string(),
            title,
            extracted_data: Some(data),
            status: RecordStatus::Success,
            scraped_at: now(),
            error_message: None,
        }
    }

    /// A failed crawl with the reason it failed
    pub fn failed(source_url: &str, title: Option<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            source_url: source_url.to_string(),
            title,
            extracted_data: None,
            status: RecordStatus::Failed,
            scraped_at: now(),
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }
}

// Stored as fixed-width microsecond RFC 3339, so keep the in-memory value at the same precision.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
