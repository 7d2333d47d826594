//! Storage traits and error types
//!
//! This module defines the interface of the durable frontier and the
//! associated error types.

use crate::state::{FailureKind, UrlStatus};
use crate::storage::{FrontierCounts, UrlRecord};
use crate::url::CanonicalUrl;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("URL not found in frontier: {0}")]
    UrlNotFound(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// The durable frontier: every known URL keyed by its canonical form
///
/// Mutating methods are only ever called from the persistence writer; the
/// read methods may run on a second connection at the same time.
pub trait FrontierStore {
    // ===== Discovery =====

    /// Inserts the URL with status `new` unless it is already known
    ///
    /// Returns true if a row was inserted. Calling it again for a known URL
    /// never touches its status or attempts.
    fn ensure(&mut self, url: &CanonicalUrl) -> StorageResult<bool>;

    /// Ensures a batch of URLs in one transaction
    ///
    /// Returns the URLs that were not known before, in input order.
    fn ensure_many(&mut self, urls: &[CanonicalUrl]) -> StorageResult<Vec<CanonicalUrl>>;

    // ===== Dispatch =====

    /// Returns up to `limit` URLs that still need work, oldest first
    ///
    /// A URL qualifies when it is not `success` and has fewer than
    /// `retry_ceiling` recorded attempts.
    fn claim_pending(&self, limit: u32, retry_ceiling: u32) -> StorageResult<Vec<CanonicalUrl>>;

    /// Marks a URL as handed to a worker
    fn mark_in_progress(&mut self, url: &CanonicalUrl, at: DateTime<Utc>) -> StorageResult<()>;

    // ===== Results =====

    /// Records a successful fetch with its extracted content
    fn record_success(
        &mut self,
        url: &CanonicalUrl,
        title: &str,
        content: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Records a failed dispatch
    ///
    /// A terminal failure raises the attempt counter to at least
    /// `retry_ceiling`, so the URL is never claimed again.
    fn record_failure(
        &mut self,
        url: &CanonicalUrl,
        kind: FailureKind,
        reason: &str,
        at: DateTime<Utc>,
        retry_ceiling: u32,
    ) -> StorageResult<()>;

    // ===== Queries =====

    /// Total known URLs and total successes
    fn counts(&self) -> StorageResult<FrontierCounts>;

    /// Gets a record by URL
    fn get(&self, url: &str) -> StorageResult<Option<UrlRecord>>;

    /// Number of records per status
    fn count_by_status(&self) -> StorageResult<HashMap<UrlStatus, u64>>;

    /// Number of failed records that reached the retry ceiling
    fn count_exhausted(&self, retry_ceiling: u32) -> StorageResult<u64>;
}
