//! JSON export of extracted state

use crate::storage::CrawlRecord;
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Extracted state together with where and when it was captured
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateExport {
    pub extracted_at: DateTime<Utc>,
    pub source_url: String,
    /// Global the state was read from, e.g. `window.__NUXT__`
    pub data_type: String,
    pub data: Value,
}

impl StateExport {
    /// Builds an export from a record; `None` if the record carries no data
    pub fn from_record(record: &CrawlRecord, global_name: &str) -> Option<Self> {
        let data = record.extracted_data.clone()?;
        Some(Self {
            extracted_at: record.scraped_at,
            source_url: record.source_url.clone(),
            data_type: format!("window.{}", global_name),
            data,
        })
    }
}

/// Writes the record's extracted state as pretty-printed JSON to `path`
///
/// # Returns
///
/// * `Ok(true)` - File written
/// * `Ok(false)` - Record has no extracted data; nothing written
/// * `Err(HarvestError)` - Serialization or file write failed
pub fn export_record(record: &CrawlRecord, global_name: &str, path: &Path) -> Result<bool, HarvestError> {
    let Some(export) = StateExport::from_record(record, global_name) else {
        return Ok(false);
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(&export)?;
    fs::write(path, json)?;

    tracing::info!("Exported state of {} to {}", record.source_url, path.display());
    Ok(true)
}
