//! Database schema definitions and migrations
//!
//! The frontier table only ever grows columns. Databases written by older
//! versions of the crawler (which lacked the content columns) are upgraded
//! in place with `ALTER TABLE ... ADD COLUMN`, leaving existing rows intact.

use rusqlite::Connection;

/// Current schema version, recorded in `schema_meta`
pub const SCHEMA_VERSION: u32 = 2;

/// Base schema; only the key column of `urls` is guaranteed here, the rest
/// comes from [`URL_COLUMNS`]
pub const SCHEMA_SQL: &str = r#"
-- Every known URL and its crawl status
CREATE TABLE IF NOT EXISTS urls (
    url TEXT PRIMARY KEY
);

-- Extracted page content, referenced from urls.content_ref
CREATE TABLE IF NOT EXISTS page_content (
    url TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    stored_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Columns of the `urls` table after the key, in order of introduction
pub const URL_COLUMNS: &[(&str, &str)] = &[
    ("status", "TEXT NOT NULL DEFAULT 'new'"),
    ("attempts", "INTEGER NOT NULL DEFAULT 0"),
    ("last_attempt_at", "TEXT"),
    ("title", "TEXT"),
    ("content_ref", "TEXT"),
    ("scraped_at", "TEXT"),
    ("last_error", "TEXT"),
];

const INDEX_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_urls_status ON urls(status, attempts);
"#;

/// Initializes the database schema and applies additive migrations
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    add_missing_columns(conn)?;
    conn.execute_batch(INDEX_SQL)?;
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Adds every column of [`URL_COLUMNS`] the `urls` table does not have yet
fn add_missing_columns(conn: &Connection) -> Result<(), rusqlite::Error> {
    let existing = existing_columns(conn, "urls")?;

    for (name, definition) in URL_COLUMNS {
        if !existing.iter().any(|c| c == name) {
            tracing::info!("Migrating urls table: adding column {}", name);
            conn.execute_batch(&format!(
                "ALTER TABLE urls ADD COLUMN {} {}",
                name, definition
            ))?;
        }
    }

    Ok(())
}

/// Lists the column names of a table
pub fn existing_columns(conn: &Connection, table: &str) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Reads the recorded schema version, if any
pub fn get_schema_version(conn: &Connection) -> Result<Option<u32>, rusqlite::Error> {
    use rusqlite::OptionalExtension;

    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(version.and_then(|v| v.parse().ok()))
}
