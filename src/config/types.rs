use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the crawler
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawl: CrawlConfig,
    pub pool: PoolConfig,
    pub retry: RetryConfig,
    pub fetch: FetchConfig,
    pub output: OutputConfig,
}

/// Crawl scope and run budget
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// URL the crawl is seeded with
    #[serde(rename = "start-url")]
    pub start_url: String,

    /// Only URLs on this host are followed
    #[serde(rename = "allowed-domain")]
    pub allowed_domain: String,

    /// Only URLs starting with this prefix are followed
    #[serde(rename = "path-prefix")]
    pub path_prefix: String,

    /// Maximum number of pages dispatched in one run (unbounded when absent)
    #[serde(rename = "max-pages")]
    pub max_pages: Option<u64>,

    /// Maximum number of URLs pulled from the store per claim
    #[serde(rename = "claim-batch")]
    pub claim_batch: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            start_url: "https://dev.epicgames.com/documentation/en-us/unreal-engine".to_string(),
            allowed_domain: "dev.epicgames.com".to_string(),
            path_prefix: "https://dev.epicgames.com/documentation/en-us/unreal-engine".to_string(),
            max_pages: None,
            claim_batch: 10_000,
        }
    }
}

/// Worker and fetch-resource pool sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of concurrent dispatches
    pub workers: u32,

    /// Number of fetch sessions created at startup
    #[serde(rename = "pool-size")]
    pub pool_size: u32,

    /// Sessions older than this are torn down and recreated on checkout (seconds)
    #[serde(rename = "recycle-interval-secs")]
    pub recycle_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            pool_size: 4,
            recycle_interval_secs: 3600,
        }
    }
}

impl PoolConfig {
    pub fn recycle_interval(&self) -> Duration {
        Duration::from_secs(self.recycle_interval_secs)
    }
}

/// Retry and backoff policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts a worker makes for one dispatch before giving up
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Recorded attempts after which a URL is never claimed again
    #[serde(rename = "retry-ceiling")]
    pub retry_ceiling: u32,

    /// First backoff delay (milliseconds)
    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,

    /// Largest backoff delay (milliseconds)
    #[serde(rename = "backoff-cap-ms")]
    pub backoff_cap_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_ceiling: 3,
            backoff_base_ms: 1000,
            backoff_cap_ms: 30_000,
        }
    }
}

/// Page loading behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// How long to wait for a page to load and become ready (seconds)
    #[serde(rename = "readiness-timeout-secs")]
    pub readiness_timeout_secs: u64,

    /// The page counts as ready once its title contains this token
    #[serde(rename = "ready-title-token")]
    pub ready_title_token: Option<String>,

    /// CSS selector of the element holding the primary content
    #[serde(rename = "content-selector")]
    pub content_selector: Option<String>,

    /// User agent sent by the HTTP fetcher
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            readiness_timeout_secs: 90,
            ready_title_token: None,
            content_selector: None,
            user_agent: concat!("doc-crawler/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "crawler_state.db".to_string(),
        }
    }
}
