//! Crawler module: fetching, parsing and orchestration
//!
//! This module contains the core crawling logic, including:
//! - The page fetcher seam and its default HTTP implementation
//! - HTML parsing into title, content and links
//! - The fetch worker with retry and backoff
//! - The persistence writer that serializes every frontier update
//! - The orchestrator that runs a crawl from start to stop

mod fetcher;
mod orchestrator;
mod parser;
mod progress;
mod worker;
mod writer;

pub use fetcher::{FetchError, HttpFetcher, HttpSession, LoadedPage, PageFetcher, Readiness};
pub use orchestrator::{CrawlOutcome, CrawlReport, Orchestrator, Phase};
pub use parser::{HtmlParser, PageParser, ParsedPage};
pub use progress::{spawn_reporter, Progress, ProgressSnapshot};
pub use worker::{Outcome, RetryPolicy, Worker};
pub use writer::{spawn_writer, DiscoveryReceiver, WriteJob, WriterHandle, WriterStats};

use crate::config::Config;
use crate::Result;
use tokio_util::sync::CancellationToken;

/// Runs a crawl with the default HTTP fetcher and HTML parser
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `cancel` - Cancelling it drains the run gracefully
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The run stopped (completed, interrupted or budget reached)
/// * `Err(CrawlError)` - The run could not start or the writer failed
pub async fn crawl(config: Config, cancel: CancellationToken) -> Result<CrawlReport> {
    let fetcher = HttpFetcher::new(&config.fetch);
    let parser = HtmlParser::new(config.fetch.content_selector.as_deref())?;

    Orchestrator::new(config, fetcher, parser).run(cancel).await
}
