//! Output module for reporting crawl results
//!
//! This module handles:
//! - Exporting extracted state as JSON with capture metadata
//! - Record statistics from the store
//! - One-line record descriptions for the CLI

mod export;
pub mod stats;

pub use export::{export_record, StateExport};
pub use stats::{load_statistics, print_statistics, RecordStatistics};

use crate::state::summarize;
use crate::storage::CrawlRecord;

/// Formats a record as a single line: status, URL, title and outcome detail
pub fn describe_record(record: &CrawlRecord) -> String {
    let mut line = format!(
        "[{}] {} {}",
        record.status,
        record.scraped_at.format("%Y-%m-%d %H:%M:%S"),
        record.source_url
    );

    if let Some(title) = &record.title {
        line.push_str(&format!(" \"{}\"", title));
    }

    match (&record.extracted_data, &record.error_message) {
        (Some(data), _) => line.push_str(&format!(" - {}", summarize(data))),
        (None, Some(message)) => line.push_str(&format!(" - {}", message)),
        (None, None) => {}
    }

    line
}
