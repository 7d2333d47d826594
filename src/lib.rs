//! doc-crawler: a resumable, same-domain documentation crawler
//!
//! This crate walks a bounded web graph rooted at a start URL, keeps every
//! known URL in a durable SQLite frontier, and can be interrupted and resumed
//! without losing results or fetching a successful page twice.

pub mod config;
pub mod crawler;
pub mod output;
pub mod pool;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Could not create any fetch resources; cannot start")]
    NoResources,

    #[error("Persistence writer stopped unexpectedly")]
    WriterGone,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("URL is outside the crawl scope: {0}")]
    OutOfScope(String),
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOutcome, CrawlReport, Orchestrator, Outcome};
pub use state::UrlStatus;
pub use url::{CanonicalUrl, Canonicalizer};
