//! Record statistics from the crawl database

use crate::storage::{RecordStatus, RecordStore, StorageResult};

/// Counts of stored crawl records by outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordStatistics {
    pub succeeded: u64,
    pub failed: u64,
    pub partial: u64,
}

impl RecordStatistics {
    pub fn total(&self) -> u64 {
        self.succeeded + self.failed + self.partial
    }

    /// Share of records that succeeded, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            (self.succeeded as f64 / self.total() as f64) * 100.0
        }
    }
}

/// Loads statistics from a record store
pub fn load_statistics(store: &dyn RecordStore) -> StorageResult<RecordStatistics> {
    Ok(RecordStatistics {
        succeeded: store.count_by_status(RecordStatus::Success)?,
        failed: store.count_by_status(RecordStatus::Failed)?,
        partial: store.count_by_status(RecordStatus::Partial)?,
    })
}

/// Prints statistics to stdout in a human-readable format
pub fn print_statistics(stats: &RecordStatistics) {
    println!("Records: {}", stats.total());
    println!("  success: {}", stats.succeeded);
    println!("  failed: {}", stats.failed);
    if stats.partial > 0 {
        println!("  partial: {}", stats.partial);
    }
    println!(
        "Success Rate: {:.1}% ({} / {} records)",
        stats.success_rate(),
        stats.succeeded,
        stats.total()
    );
}
