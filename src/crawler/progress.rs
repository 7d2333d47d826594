//! Crawl progress counters
//!
//! The writer bumps `done` as successes commit and `total` as new URLs land in
//! the frontier; a background task logs a snapshot at a fixed interval.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Crawl progress shared between the writer and the orchestrator
///
/// `done` counts successful pages, `total` every URL known to the frontier.
#[derive(Debug, Default)]
pub struct Progress {
    done: AtomicU64,
    total: AtomicU64,
}

/// Point-in-time copy of [`Progress`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub done: u64,
    pub total: u64,
}

impl Progress {
    pub fn new(done: u64, total: u64) -> Self {
        Self {
            done: AtomicU64::new(done),
            total: AtomicU64::new(total),
        }
    }

    pub fn record_done(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_total(&self, discovered: u64) {
        self.total.fetch_add(discovered, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            done: self.done.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        }
    }
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.done as f64 / self.total as f64 * 100.0
        }
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({:.1}%)", self.done, self.total, self.percent())
    }
}

/// Logs progress every `every` until `stop` is cancelled
pub fn spawn_reporter(
    progress: Arc<Progress>,
    every: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // the first tick completes immediately
        ticker.tick().await;

        let mut last = progress.snapshot();
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let now = progress.snapshot();
                    let rate = (now.done - last.done.min(now.done)) as f64 / every.as_secs_f64();
                    tracing::info!("Progress: {} pages, {:.2} pages/sec", now, rate);
                    last = now;
                }
            }
        }
    })
}
