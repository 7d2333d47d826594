//! SQLite frontier implementation
//!
//! This module provides a SQLite-based implementation of the FrontierStore trait.

use crate::state::{FailureKind, UrlStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{FrontierStore, StorageError, StorageResult};
use crate::storage::{FrontierCounts, MergeReport, UrlRecord};
use crate::url::{CanonicalUrl, Canonicalizer};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

const RECORD_COLUMNS: &str =
    "url, status, attempts, last_attempt_at, title, content_ref, scraped_at, last_error";

/// SQLite frontier backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (creating if needed) the frontier database at `path`
    ///
    /// The database runs in WAL mode so a reader connection can query while
    /// the persistence writer holds its own connection.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(10))?;

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

    /// Creates an in-memory database (for tests and dry runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Returns every record in insertion order
    pub fn all_records(&self) -> StorageResult<Vec<UrlRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM urls ORDER BY rowid", RECORD_COLUMNS))?;

        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Reads the stored content of a page, if any
    pub fn content(&self, url: &str) -> StorageResult<Option<String>> {
        let content = self
            .conn
            .query_row(
                "SELECT content FROM page_content WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content)
    }

    /// Re-canonicalizes every stored URL and folds duplicates together
    ///
    /// For each group of rows sharing a canonical form, the row to keep is a
    /// successful one if any (otherwise the one with the most attempts); it is
    /// stored under the canonical URL together with its content. Rows outside
    /// the crawl scope are removed. Runs in one transaction and is meant to be
    /// invoked between crawls, never during one.
    pub fn merge_duplicates(&mut self, canonicalizer: &Canonicalizer) -> StorageResult<MergeReport> {
        let records = self.all_records()?;
        let mut report = MergeReport {
            scanned: records.len() as u64,
            ..MergeReport::default()
        };

        let mut groups: BTreeMap<String, Vec<UrlRecord>> = BTreeMap::new();
        let mut out_of_scope = Vec::new();
        for record in records {
            match canonicalizer.canonicalize_absolute(&record.url) {
                Ok(canonical) => groups.entry(canonical.into_string()).or_default().push(record),
                Err(_) => out_of_scope.push(record.url),
            }
        }

        let tx = self.conn.transaction()?;

        for url in &out_of_scope {
            tx.execute("DELETE FROM urls WHERE url = ?1", params![url])?;
            tx.execute("DELETE FROM page_content WHERE url = ?1", params![url])?;
            report.removed_out_of_scope += 1;
        }

        for (canonical, members) in &groups {
            if members.len() == 1 && members[0].url == *canonical {
                continue;
            }

            let keeper = members
                .iter()
                .max_by_key(|r| (r.status == UrlStatus::Success, r.attempts))
                .ok_or_else(|| StorageError::UrlNotFound(canonical.clone()))?;

            for member in members {
                tx.execute("DELETE FROM urls WHERE url = ?1", params![member.url])?;
            }

            tx.execute(
                &format!(
                    "INSERT INTO urls ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    RECORD_COLUMNS
                ),
                params![
                    canonical,
                    keeper.status.to_db_string(),
                    keeper.attempts,
                    keeper.last_attempt_at.map(|t| t.to_rfc3339()),
                    keeper.title,
                    keeper.content_ref,
                    keeper.scraped_at.map(|t| t.to_rfc3339()),
                    keeper.last_error,
                ],
            )?;

            // content follows the surviving record
            if keeper.url != *canonical {
                tx.execute("DELETE FROM page_content WHERE url = ?1", params![canonical])?;
                tx.execute(
                    "UPDATE page_content SET url = ?1 WHERE url = ?2",
                    params![canonical, keeper.url],
                )?;
                report.rewritten += 1;
            }

            for member in members
                .iter()
                .filter(|m| m.url != keeper.url && m.url != *canonical)
            {
                tx.execute("DELETE FROM page_content WHERE url = ?1", params![member.url])?;
            }

            report.merged += members.len() as u64 - 1;
        }

        tx.commit()?;

        Ok(report)
    }
}

impl FrontierStore for SqliteStore {
    // ===== Discovery =====

    fn ensure(&mut self, url: &CanonicalUrl) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO urls (url) VALUES (?1)",
            params![url.as_str()],
        )?;
        Ok(inserted > 0)
    }

    fn ensure_many(&mut self, urls: &[CanonicalUrl]) -> StorageResult<Vec<CanonicalUrl>> {
        let tx = self.conn.transaction()?;
        let mut fresh = Vec::new();

        {
            let mut stmt = tx.prepare_cached("INSERT OR IGNORE INTO urls (url) VALUES (?1)")?;
            for url in urls {
                if stmt.execute(params![url.as_str()])? > 0 {
                    fresh.push(url.clone());
                }
            }
        }

        tx.commit()?;
        Ok(fresh)
    }

    // ===== Dispatch =====

    fn claim_pending(&self, limit: u32, retry_ceiling: u32) -> StorageResult<Vec<CanonicalUrl>> {
        let mut stmt = self.conn.prepare(
            "SELECT url FROM urls
             WHERE status != 'success' AND attempts < ?1
             ORDER BY rowid
             LIMIT ?2",
        )?;

        let urls = stmt
            .query_map(params![retry_ceiling, limit], |row| row.get::<_, String>(0))?
            .map(|r| r.map(CanonicalUrl::from_stored))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(urls)
    }

    fn mark_in_progress(&mut self, url: &CanonicalUrl, at: DateTime<Utc>) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE urls SET status = ?1, last_attempt_at = ?2 WHERE url = ?3",
            params![
                UrlStatus::InProgress.to_db_string(),
                at.to_rfc3339(),
                url.as_str()
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::UrlNotFound(url.to_string()));
        }
        Ok(())
    }

    // ===== Results =====

    fn record_success(
        &mut self,
        url: &CanonicalUrl,
        title: &str,
        content: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let content_ref = content_hash(content);
        let timestamp = at.to_rfc3339();

        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO page_content (url, content, content_hash, stored_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![url.as_str(), content, content_ref, timestamp],
        )?;

        let updated = tx.execute(
            "UPDATE urls SET status = ?1, attempts = attempts + 1, title = ?2, content_ref = ?3,
             scraped_at = ?4, last_attempt_at = ?4, last_error = NULL
             WHERE url = ?5",
            params![
                UrlStatus::Success.to_db_string(),
                title,
                content_ref,
                timestamp,
                url.as_str()
            ],
        )?;

        if updated == 0 {
            // dropping the transaction rolls back the content insert
            return Err(StorageError::UrlNotFound(url.to_string()));
        }

        tx.commit()?;
        Ok(())
    }

    fn record_failure(
        &mut self,
        url: &CanonicalUrl,
        kind: FailureKind,
        reason: &str,
        at: DateTime<Utc>,
        retry_ceiling: u32,
    ) -> StorageResult<()> {
        let terminal = kind == FailureKind::Terminal;

        let updated = self.conn.execute(
            "UPDATE urls SET status = ?1,
             attempts = CASE WHEN ?2 THEN MAX(attempts + 1, ?3) ELSE attempts + 1 END,
             last_attempt_at = ?4, last_error = ?5
             WHERE url = ?6",
            params![
                UrlStatus::Failed.to_db_string(),
                terminal,
                retry_ceiling,
                at.to_rfc3339(),
                reason,
                url.as_str()
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::UrlNotFound(url.to_string()));
        }
        Ok(())
    }

    // ===== Queries =====

    fn counts(&self) -> StorageResult<FrontierCounts> {
        let (total, success): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(status = 'success'), 0) FROM urls",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(FrontierCounts {
            total: total as u64,
            success: success as u64,
        })
    }

    fn get(&self, url: &str) -> StorageResult<Option<UrlRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {} FROM urls WHERE url = ?1", RECORD_COLUMNS),
                params![url],
                row_to_record,
            )
            .optional()?;

        Ok(record)
    }

    fn count_by_status(&self) -> StorageResult<HashMap<UrlStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM urls GROUP BY status")?;

        let mut summary = HashMap::new();
        let rows = stmt.query_map([], |row| {
            let status: Option<String> = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count))
        })?;

        for row in rows {
            let (status, count) = row?;
            *summary.entry(parse_status(status.as_deref())).or_insert(0) += count as u64;
        }

        Ok(summary)
    }

    fn count_exhausted(&self, retry_ceiling: u32) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM urls WHERE status != 'success' AND attempts >= ?1",
            params![retry_ceiling],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Maps a stored status label onto a status
///
/// Databases written by older crawler versions used labels such as
/// `failed_no_content`; those all count as failures.
fn parse_status(label: Option<&str>) -> UrlStatus {
    match label {
        None => UrlStatus::New,
        Some(s) => UrlStatus::from_db_string(s).unwrap_or(if s.starts_with("failed") {
            UrlStatus::Failed
        } else {
            UrlStatus::New
        }),
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<UrlRecord> {
    let status: Option<String> = row.get(1)?;
    let attempts: i64 = row.get::<_, Option<i64>>(2)?.unwrap_or(0);

    Ok(UrlRecord {
        url: row.get(0)?,
        status: parse_status(status.as_deref()),
        attempts: attempts.max(0) as u32,
        last_attempt_at: timestamp_at(row, 3)?,
        title: row.get(4)?,
        content_ref: row.get(5)?,
        scraped_at: timestamp_at(row, 6)?,
        last_error: row.get(7)?,
    })
}

/// Reads a timestamp column written either as RFC 3339 text or, by older
/// versions, as fractional unix seconds
fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let value = match row.get_ref(idx)? {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok().and_then(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(from_unix_secs))
        }),
        ValueRef::Real(secs) => from_unix_secs(secs),
        ValueRef::Integer(secs) => Utc.timestamp_opt(secs, 0).single(),
    };
    Ok(value)
}

fn from_unix_secs(secs: f64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs.trunc() as i64, (secs.fract() * 1e9) as u32)
        .single()
}

/// Content reference stored on the frontier row
fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
