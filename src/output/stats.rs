//! Statistics generation from the frontier database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::state::UrlStatus;
use crate::storage::FrontierStore;
use crate::CrawlError;
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlStatistics {
    /// Total number of URLs discovered
    pub total_urls: u64,

    /// Count of URLs by status
    pub urls_by_status: HashMap<UrlStatus, u64>,

    /// Failed URLs that reached the retry ceiling and will not be claimed again
    pub exhausted: u64,

    /// The retry ceiling the counts were taken against
    pub retry_ceiling: u32,
}

impl CrawlStatistics {
    pub fn count(&self, status: UrlStatus) -> u64 {
        self.urls_by_status.get(&status).copied().unwrap_or(0)
    }

    /// URLs the next run would claim
    pub fn pending(&self) -> u64 {
        self.total_urls
            .saturating_sub(self.count(UrlStatus::Success))
            .saturating_sub(self.exhausted)
    }

    /// Share of known URLs fetched successfully, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total_urls == 0 {
            0.0
        } else {
            self.count(UrlStatus::Success) as f64 / self.total_urls as f64 * 100.0
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The frontier to query
/// * `retry_ceiling` - Attempts after which a failed URL counts as exhausted
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(CrawlError)` - Failed to query statistics
pub fn load_statistics(
    store: &dyn FrontierStore,
    retry_ceiling: u32,
) -> Result<CrawlStatistics, CrawlError> {
    let urls_by_status = store.count_by_status()?;
    let total_urls: u64 = urls_by_status.values().sum();
    let exhausted = store.count_exhausted(retry_ceiling)?;

    Ok(CrawlStatistics {
        total_urls,
        urls_by_status,
        exhausted,
        retry_ceiling,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Total URLs discovered: {}", stats.total_urls);
    println!("  Pending (claimable): {}", stats.pending());
    println!(
        "  Exhausted (>= {} attempts): {}",
        stats.retry_ceiling, stats.exhausted
    );
    println!();

    println!("URLs by Status:");
    for status in UrlStatus::all() {
        let count = stats.count(status);
        let percentage = if stats.total_urls > 0 {
            (count as f64 / stats.total_urls as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    println!(
        "Success Rate: {:.1}% ({} / {} URLs fetched)",
        stats.success_rate(),
        stats.count(UrlStatus::Success),
        stats.total_urls
    );
}
