//! Crawl orchestration
//!
//! The orchestrator owns one crawl run from start to finish:
//! - Starting: open the frontier, seed the start URL, claim pending work and
//!   build the resource pool
//! - Running: keep a bounded set of dispatches in flight, route each outcome
//!   and each batch of discovered links to the persistence writer, queue the
//!   URLs the writer reports as new
//! - Draining: stop dispatching, let in-flight work finish, flush the writer
//!   and close the pool
//! - Stopped: report the final counts
//!
//! Interrupting a run loses nothing: every URL not yet marked `success` is
//! claimed again by the next run.

use crate::config::Config;
use crate::crawler::progress::spawn_reporter;
use crate::crawler::writer::{spawn_writer, DiscoveryReceiver, WriteJob, WriterHandle};
use crate::crawler::{Outcome, PageFetcher, PageParser, Progress, Readiness, RetryPolicy, Worker};
use crate::pool::ResourcePool;
use crate::state::FailureKind;
use crate::storage::{FrontierStore, SqliteStore};
use crate::url::{CanonicalUrl, Canonicalizer};
use crate::{CrawlError, Result};
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Running,
    Draining,
    Stopped,
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// No pending work remains
    Completed,

    /// The frontier had nothing to claim at startup
    NothingToDo,

    /// The per-run page budget was used up
    PageLimitReached,

    /// Cancelled; the next run resumes where this one stopped
    Interrupted,
}

/// Summary of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlReport {
    pub outcome: CrawlOutcome,

    /// Successful pages in the frontier after the run
    pub done: u64,

    /// Known URLs in the frontier after the run
    pub total: u64,

    /// Dispatches of this run that succeeded
    pub succeeded: u64,

    /// Dispatches of this run that failed
    pub failed: u64,

    /// Persistence jobs that could not be applied
    pub write_errors: u64,
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: {}/{} pages done ({} succeeded, {} failed this run",
            self.outcome, self.done, self.total, self.succeeded, self.failed
        )?;
        if self.write_errors > 0 {
            write!(f, ", {} write errors", self.write_errors)?;
        }
        write!(f, ")")
    }
}

/// Drives a crawl over a fetcher and a parser
pub struct Orchestrator<F: PageFetcher, P: PageParser> {
    config: Config,
    fetcher: Arc<F>,
    parser: Arc<P>,
    phase: Phase,
}

/// In-memory state of the Running phase
struct RunState {
    /// Claimed or discovered, waiting for a free dispatch slot
    queue: VecDeque<CanonicalUrl>,

    /// Everything queued this run; never queued twice
    queued: HashSet<CanonicalUrl>,

    /// Everything already sent to the writer as a discovered link
    submitted: HashSet<CanonicalUrl>,

    /// Link batches whose new URLs have not come back yet
    outstanding_batches: usize,

    dispatched: u64,
    succeeded: u64,
    failed: u64,
}

impl RunState {
    fn new(pending: Vec<CanonicalUrl>) -> Self {
        let queued: HashSet<_> = pending.iter().cloned().collect();
        Self {
            submitted: queued.clone(),
            queued,
            queue: pending.into(),
            outstanding_batches: 0,
            dispatched: 0,
            succeeded: 0,
            failed: 0,
        }
    }

    fn enqueue(&mut self, urls: impl IntoIterator<Item = CanonicalUrl>) -> usize {
        let mut added = 0;
        for url in urls {
            if self.queued.insert(url.clone()) {
                self.queue.push_back(url);
                added += 1;
            }
        }
        added
    }
}

impl<F: PageFetcher, P: PageParser> Orchestrator<F, P> {
    pub fn new(config: Config, fetcher: F, parser: P) -> Self {
        Self {
            config,
            fetcher: Arc::new(fetcher),
            parser: Arc::new(parser),
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn transition(&mut self, next: Phase) {
        if self.phase != next {
            tracing::info!("Crawl phase: {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }

    /// Runs one crawl until the frontier is exhausted or `cancel` fires
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The run stopped normally (completed, budget
    ///   reached or interrupted)
    /// * `Err(CrawlError)` - The frontier could not be opened, no fetch
    ///   session could be created or the writer died
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<CrawlReport> {
        self.transition(Phase::Starting);

        let result = self.run_phases(cancel).await;
        self.transition(Phase::Stopped);

        match &result {
            Ok(report) => tracing::info!("Crawl stopped. {}", report),
            Err(e) => tracing::error!("Crawl failed: {}", e),
        }
        result
    }

    async fn run_phases(&mut self, cancel: CancellationToken) -> Result<CrawlReport> {
        let crawl = &self.config.crawl;
        let retry_ceiling = self.config.retry.retry_ceiling;

        // ===== Starting =====

        let canonicalizer = Arc::new(Canonicalizer::new(
            &crawl.allowed_domain,
            &crawl.path_prefix,
        )?);
        let start = canonicalizer.canonicalize_absolute(&crawl.start_url)?;

        let db_path = Path::new(&self.config.output.database_path);
        let mut writer_store = SqliteStore::open(db_path)?;
        let reader = SqliteStore::open(db_path)?;

        if writer_store.ensure(&start)? {
            tracing::info!("Seeded frontier with {}", start);
        }

        let counts = reader.counts()?;
        let pending = reader.claim_pending(crawl.claim_batch, retry_ceiling)?;
        tracing::info!(
            "Frontier: {} known, {} done, {} claimed for this run",
            counts.total,
            counts.success,
            pending.len()
        );

        if pending.is_empty() {
            return Ok(CrawlReport {
                outcome: CrawlOutcome::NothingToDo,
                done: counts.success,
                total: counts.total,
                succeeded: 0,
                failed: 0,
                write_errors: 0,
            });
        }

        let pool = Arc::new(
            ResourcePool::new(
                Arc::clone(&self.fetcher),
                self.config.pool.pool_size as usize,
                self.config.pool.recycle_interval(),
            )
            .await?,
        );

        let worker = Worker::new(
            Arc::clone(&pool),
            Arc::clone(&self.parser),
            canonicalizer,
            Readiness::from_config(&self.config.fetch),
            RetryPolicy::from_config(&self.config.retry),
        );

        let progress = Arc::new(Progress::new(counts.success, counts.total));
        let (writer, discovered) = spawn_writer(writer_store, Arc::clone(&progress), retry_ceiling)?;

        let stop_reporter = CancellationToken::new();
        let reporter = spawn_reporter(Arc::clone(&progress), PROGRESS_INTERVAL, stop_reporter.clone());

        // ===== Running =====

        self.transition(Phase::Running);
        let limit = (self.config.pool.workers as usize)
            .min(pool.capacity() * 2)
            .max(1);
        tracing::info!(
            "Dispatching up to {} pages at once over {} fetch sessions",
            limit,
            pool.capacity()
        );

        let mut state = RunState::new(pending);
        let loop_result = self
            .dispatch_loop(&worker, limit, &writer, discovered, &reader, &mut state, &cancel)
            .await;

        // ===== Draining =====

        self.transition(Phase::Draining);
        let stats = writer.shutdown().await;
        pool.shutdown().await;
        stop_reporter.cancel();
        let _ = reporter.await;

        let outcome = loop_result?;
        let stats = stats?;

        let counts = reader.counts()?;
        Ok(CrawlReport {
            outcome,
            done: counts.success,
            total: counts.total,
            succeeded: state.succeeded,
            failed: state.failed,
            write_errors: stats.failed,
        })
    }

    async fn dispatch_loop(
        &mut self,
        worker: &Worker<F, P>,
        limit: usize,
        writer: &WriterHandle,
        mut discovered: DiscoveryReceiver,
        reader: &SqliteStore,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome> {
        let claim_batch = self.config.crawl.claim_batch;
        let retry_ceiling = self.config.retry.retry_ceiling;
        let budget = self.config.crawl.max_pages;

        let mut in_flight: JoinSet<(CanonicalUrl, Option<Outcome>)> = JoinSet::new();

        loop {
            // Fill free dispatch slots
            while !cancel.is_cancelled()
                && in_flight.len() < limit
                && !budget.is_some_and(|max| state.dispatched >= max)
            {
                let Some(url) = state.queue.pop_front() else {
                    break;
                };

                tracing::debug!("Dispatching {}", url);
                writer.submit(WriteJob::MarkInProgress(url.clone()))?;

                let worker = worker.clone();
                let token = cancel.clone();
                in_flight.spawn(async move {
                    let outcome = worker.fetch_with_retries(&url, &token).await;
                    (url, outcome)
                });
                state.dispatched += 1;
            }

            if in_flight.is_empty() && state.outstanding_batches == 0 {
                if cancel.is_cancelled() {
                    return Ok(CrawlOutcome::Interrupted);
                }
                if budget.is_some_and(|max| state.dispatched >= max) {
                    tracing::info!("Page budget of {} reached", state.dispatched);
                    return Ok(CrawlOutcome::PageLimitReached);
                }
                if state.queue.is_empty() {
                    // Pick up anything the frontier still holds that this run
                    // has not attempted yet
                    writer.barrier().await?;
                    let limit = claim_batch.saturating_add(state.queued.len() as u32);
                    let pending = reader.claim_pending(limit, retry_ceiling)?;
                    let added = state.enqueue(pending);
                    if added == 0 {
                        return Ok(CrawlOutcome::Completed);
                    }
                    tracing::info!("Re-claimed {} pending URLs", added);
                }
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled(), if self.phase == Phase::Running => {
                    tracing::info!(
                        "Cancellation requested; waiting for {} in-flight pages",
                        in_flight.len()
                    );
                    self.transition(Phase::Draining);
                }
                Some(joined) = in_flight.join_next() => match joined {
                    Ok((url, outcome)) => route_outcome(writer, state, url, outcome)?,
                    Err(e) => tracing::error!("Dispatch task failed: {}", e),
                },
                Some(fresh) = discovered.recv(), if state.outstanding_batches > 0 => {
                    state.outstanding_batches -= 1;
                    if !cancel.is_cancelled() {
                        let added = state.enqueue(fresh);
                        if added > 0 {
                            tracing::debug!("Queued {} newly discovered URLs", added);
                        }
                    }
                }
                else => return Err(CrawlError::WriterGone),
            }
        }
    }
}

/// Sends one dispatch result to the writer
///
/// A page's links are queued ahead of its success record, so a page is never
/// committed as `success` while its links are still missing from the frontier.
fn route_outcome(
    writer: &WriterHandle,
    state: &mut RunState,
    url: CanonicalUrl,
    outcome: Option<Outcome>,
) -> Result<()> {
    match outcome {
        None => {
            tracing::debug!("Dispatch of {} cancelled before it started", url);
        }
        Some(Outcome::Success {
            title,
            content,
            links,
        }) => {
            state.succeeded += 1;
            tracing::debug!("Fetched {} ({} links)", url, links.len());

            let batch: Vec<_> = links
                .into_iter()
                .filter(|link| state.submitted.insert(link.clone()))
                .collect();
            if !batch.is_empty() {
                writer.submit(WriteJob::AddDiscoveredLinks { urls: batch })?;
                state.outstanding_batches += 1;
            }

            writer.submit(WriteJob::RecordSuccess {
                url,
                title,
                content,
                timestamp: Utc::now(),
            })?;
        }
        Some(Outcome::RetryableFailure { reason }) => {
            state.failed += 1;
            tracing::warn!("{} failed, will retry next run: {}", url, reason);
            writer.submit(WriteJob::UpdateStatus {
                url,
                kind: FailureKind::Retryable,
                reason,
            })?;
        }
        Some(Outcome::TerminalFailure { reason }) => {
            state.failed += 1;
            tracing::warn!("{} failed permanently: {}", url, reason);
            writer.submit(WriteJob::UpdateStatus {
                url,
                kind: FailureKind::Terminal,
                reason,
            })?;
        }
    }
    Ok(())
}
