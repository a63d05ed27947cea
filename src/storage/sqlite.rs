//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the RecordStore trait.

use crate::state::{check_state_depth, parse_state_json};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordStore, StorageError, StorageResult};
use crate::storage::{CrawlRecord, RecordStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const SELECT_COLUMNS: &str =
    "SELECT id, source_url, title, extracted_data, status, scraped_at, error_message FROM crawl_records";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database or create the schema
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (tests and dry runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl RecordStore for SqliteStorage {
    fn latest(&self, source_url: &str) -> StorageResult<Option<CrawlRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE source_url = ?1 ORDER BY scraped_at DESC, id DESC LIMIT 1"
        ))?;

        let raw = stmt
            .query_row(params![source_url], RawRecord::from_row)
            .optional()?;

        raw.map(RawRecord::into_record).transpose()
    }

    fn append(&mut self, record: &CrawlRecord) -> StorageResult<i64> {
        let data = match &record.extracted_data {
            Some(value) => {
                check_state_depth(value)?;
                Some(serde_json::to_string(value)?)
            }
            None => None,
        };

        self.conn.execute(
            "INSERT INTO crawl_records (source_url, title, extracted_data, status, scraped_at, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.source_url,
                record.title,
                data,
                record.status.to_db_string(),
                record.scraped_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                record.error_message,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn recent(&self, limit: usize) -> StorageResult<Vec<CrawlRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} ORDER BY scraped_at DESC, id DESC LIMIT ?1"
        ))?;

        let rows = stmt
            .query_map(params![limit as i64], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawRecord::into_record).collect()
    }

    fn count_by_status(&self, status: RecordStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawl_records WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Row as stored, before the status, timestamp and JSON columns are decoded
struct RawRecord {
    id: i64,
    source_url: String,
    title: Option<String>,
    extracted_data: Option<String>,
    status: String,
    scraped_at: String,
    error_message: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_url: row.get(1)?,
            title: row.get(2)?,
            extracted_data: row.get(3)?,
            status: row.get(4)?,
            scraped_at: row.get(5)?,
            error_message: row.get(6)?,
        })
    }

    fn into_record(self) -> StorageResult<CrawlRecord> {
        let status =
            RecordStatus::from_db_string(&self.status).ok_or_else(|| StorageError::CorruptRecord {
                id: self.id,
                reason: format!("unknown status '{}'", self.status),
            })?;

        let scraped_at = DateTime::parse_from_rfc3339(&self.scraped_at)
            .map_err(|e| StorageError::CorruptRecord {
                id: self.id,
                reason: format!("bad timestamp '{}': {}", self.scraped_at, e),
            })?
            .with_timezone(&Utc);

        let extracted_data = self
            .extracted_data
            .as_deref()
            .map(parse_state_json)
            .transpose()?;

        Ok(CrawlRecord {
            id: Some(self.id),
            source_url: self.source_url,
            title: self.title,
            extracted_data,
            status,
            scraped_at,
            error_message: self.error_message,
        })
    }
}
