//! Persistence writer
//!
//! Every change to the frontier goes through one dedicated OS thread that
//! owns the only writing connection. Jobs are applied strictly in the order
//! they were submitted. A job that fails is logged and counted; it is never
//! retried and never stops the writer.

use crate::crawler::Progress;
use crate::state::FailureKind;
use crate::storage::{FrontierStore, StorageResult};
use crate::url::CanonicalUrl;
use crate::CrawlError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

/// One unit of work for the writer
#[derive(Debug)]
pub enum WriteJob {
    /// The URL was handed to a worker
    MarkInProgress(CanonicalUrl),

    /// A dispatch failed
    UpdateStatus {
        url: CanonicalUrl,
        kind: FailureKind,
        reason: String,
    },

    /// A dispatch succeeded
    RecordSuccess {
        url: CanonicalUrl,
        title: String,
        content: String,
        timestamp: DateTime<Utc>,
    },

    /// Links found on a page; the genuinely new ones are sent back on the
    /// discovery channel (an empty batch is still sent)
    AddDiscoveredLinks { urls: Vec<CanonicalUrl> },

    /// Completes once every job submitted before it has been applied
    Barrier(oneshot::Sender<()>),
}

impl WriteJob {
    fn label(&self) -> &'static str {
        match self {
            Self::MarkInProgress(_) => "mark-in-progress",
            Self::UpdateStatus { .. } => "update-status",
            Self::RecordSuccess { .. } => "record-success",
            Self::AddDiscoveredLinks { .. } => "add-discovered-links",
            Self::Barrier(_) => "barrier",
        }
    }
}

/// Counters reported when the writer shuts down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Jobs applied successfully
    pub applied: u64,

    /// Jobs that failed and were dropped
    pub failed: u64,

    /// URLs that were new to the frontier
    pub discovered: u64,
}

/// Handle used to submit jobs and, finally, to stop the writer
pub struct WriterHandle {
    jobs: mpsc::UnboundedSender<WriteJob>,
    thread: JoinHandle<WriterStats>,
}

/// Receives the new URLs of each `AddDiscoveredLinks` batch, in submission order
pub type DiscoveryReceiver = mpsc::UnboundedReceiver<Vec<CanonicalUrl>>;

/// Spawns the writer thread around `store`
///
/// # Arguments
///
/// * `store` - Frontier connection owned by the writer from now on
/// * `progress` - Updated as successes and new URLs are committed
/// * `retry_ceiling` - Attempt count a terminal failure is raised to
pub fn spawn_writer<S>(
    store: S,
    progress: Arc<Progress>,
    retry_ceiling: u32,
) -> Result<(WriterHandle, DiscoveryReceiver), CrawlError>
where
    S: FrontierStore + Send + 'static,
{
    let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
    let (discovered_tx, discovered_rx) = mpsc::unbounded_channel();

    let writer = Writer {
        store,
        progress,
        retry_ceiling,
        discovered: discovered_tx,
        stats: WriterStats::default(),
    };

    let thread = std::thread::Builder::new()
        .name("frontier-writer".to_string())
        .spawn(move || writer.run(jobs_rx))?;

    Ok((
        WriterHandle {
            jobs: jobs_tx,
            thread,
        },
        discovered_rx,
    ))
}

impl WriterHandle {
    /// Queues a job; fails only if the writer thread is gone
    pub fn submit(&self, job: WriteJob) -> Result<(), CrawlError> {
        self.jobs.send(job).map_err(|_| CrawlError::WriterGone)
    }

    /// Waits until everything submitted so far has been applied
    pub async fn barrier(&self) -> Result<(), CrawlError> {
        let (tx, rx) = oneshot::channel();
        self.submit(WriteJob::Barrier(tx))?;
        rx.await.map_err(|_| CrawlError::WriterGone)
    }

    /// Closes the queue, waits for the writer to apply what is left and
    /// returns its counters
    pub async fn shutdown(self) -> Result<WriterStats, CrawlError> {
        let Self { jobs, thread } = self;
        drop(jobs);

        tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|_| CrawlError::WriterGone)?
            .map_err(|_| CrawlError::WriterGone)
    }
}

struct Writer<S> {
    store: S,
    progress: Arc<Progress>,
    retry_ceiling: u32,
    discovered: mpsc::UnboundedSender<Vec<CanonicalUrl>>,
    stats: WriterStats,
}

impl<S: FrontierStore> Writer<S> {
    fn run(mut self, mut jobs: mpsc::UnboundedReceiver<WriteJob>) -> WriterStats {
        tracing::debug!("Persistence writer started");

        while let Some(job) = jobs.blocking_recv() {
            let label = job.label();
            match self.apply(job) {
                Ok(()) => self.stats.applied += 1,
                Err(e) => {
                    self.stats.failed += 1;
                    tracing::error!("Persistence job {} failed: {}", label, e);
                }
            }
        }

        tracing::debug!(
            "Persistence writer drained: {} applied, {} failed",
            self.stats.applied,
            self.stats.failed
        );
        self.stats
    }

    fn apply(&mut self, job: WriteJob) -> StorageResult<()> {
        match job {
            WriteJob::MarkInProgress(url) => self.store.mark_in_progress(&url, Utc::now()),
            WriteJob::UpdateStatus { url, kind, reason } => {
                self.store
                    .record_failure(&url, kind, &reason, Utc::now(), self.retry_ceiling)
            }
            WriteJob::RecordSuccess {
                url,
                title,
                content,
                timestamp,
            } => {
                self.store.record_success(&url, &title, &content, timestamp)?;
                self.progress.record_done();
                Ok(())
            }
            WriteJob::AddDiscoveredLinks { urls } => {
                let result = self.store.ensure_many(&urls);
                let fresh = result.as_ref().map(Vec::clone).unwrap_or_default();

                self.stats.discovered += fresh.len() as u64;
                self.progress.add_total(fresh.len() as u64);
                // the orchestrator may already be gone during shutdown
                let _ = self.discovered.send(fresh);

                result.map(|_| ())
            }
            WriteJob::Barrier(done) => {
                let _ = done.send(());
                Ok(())
            }
        }
    }
}
