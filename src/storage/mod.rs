//! Storage module for the durable crawl frontier
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and additive schema migration
//! - Idempotent URL discovery (insert-or-ignore)
//! - Claiming pending work in insertion (breadth-first) order
//! - Recording outcomes and extracted content
//! - An out-of-band maintenance pass that merges duplicate URLs

mod schema;
mod sqlite;
mod traits;

pub use schema::{get_schema_version, SCHEMA_VERSION};
pub use sqlite::SqliteStore;
pub use traits::{FrontierStore, StorageError, StorageResult};

use crate::state::UrlStatus;
use chrono::{DateTime, Utc};

/// Represents a URL record in the frontier
#[derive(Debug, Clone, PartialEq)]
pub struct UrlRecord {
    pub url: String,
    pub status: UrlStatus,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub content_ref: Option<String>,
    pub scraped_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Progress counters read from the frontier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierCounts {
    /// Every URL ever discovered
    pub total: u64,

    /// URLs fetched successfully
    pub success: u64,
}

/// Result of a duplicate-merging maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Rows examined
    pub scanned: u64,

    /// Rows folded into another row with the same canonical form
    pub merged: u64,

    /// Rows rewritten to their canonical form
    pub rewritten: u64,

    /// Rows removed because they fall outside the crawl scope
    pub removed_out_of_scope: u64,
}
