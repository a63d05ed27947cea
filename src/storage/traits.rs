//! Storage traits and error types
//!
//! This module defines the trait interface for record store backends and
//! associated error types.

use crate::storage::{CrawlRecord, RecordStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: i64, reason: String },

    #[error("Record store lock poisoned")]
    Poisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable store of crawl records keyed by source URL
///
/// Writes are appends; a record is never updated in place. Implementations
/// are used behind a mutex by the pipeline, so they need not be `Sync`.
pub trait RecordStore {
    /// Returns the most recent record for `source_url`, if any
    fn latest(&self, source_url: &str) -> StorageResult<Option<CrawlRecord>>;

    /// Appends a record and returns its assigned id
    ///
    /// Any `id` already set on `record` is ignored.
    fn append(&mut self, record: &CrawlRecord) -> StorageResult<i64>;

    /// Returns up to `limit` records, most recent first
    fn recent(&self, limit: usize) -> StorageResult<Vec<CrawlRecord>>;

    /// Counts records with the given status
    fn count_by_status(&self, status: RecordStatus) -> StorageResult<u64>;
}
