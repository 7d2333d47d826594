//! Fetch worker: one dispatch of one URL
//!
//! A dispatch borrows a pooled session for each attempt, loads the page,
//! parses it and canonicalizes its links. Failures that may heal are retried
//! with exponential backoff. The worker never touches the store; it hands an
//! [`Outcome`] back to the orchestrator.

use crate::config::RetryConfig;
use crate::crawler::{FetchError, PageFetcher, PageParser, Readiness};
use crate::pool::{PoolGuard, ResourcePool};
use crate::url::{CanonicalUrl, Canonicalizer};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Page fetched and parsed
    Success {
        title: String,
        content: String,
        /// In-scope links, canonical and deduplicated, in page order
        links: Vec<CanonicalUrl>,
    },

    /// Interrupted before the retries ran out; the URL stays claimable
    RetryableFailure { reason: String },

    /// Retries exhausted or a non-retryable error; the URL is never claimed again
    TerminalFailure { reason: String },
}

/// Attempt budget and backoff schedule for one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_cap: Duration::from_millis(config.backoff_cap_ms),
        }
    }

    /// Delay after failed attempt `attempt` (0-based): `min(base * 2^attempt, cap)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.backoff_base.checked_mul(factor))
            .map_or(self.backoff_cap, |delay| delay.min(self.backoff_cap))
    }
}

/// Everything a dispatch needs, cheap to clone into a task
pub struct Worker<F: PageFetcher, P: PageParser> {
    pool: Arc<ResourcePool<F>>,
    parser: Arc<P>,
    canonicalizer: Arc<Canonicalizer>,
    readiness: Readiness,
    policy: RetryPolicy,
}

impl<F: PageFetcher, P: PageParser> Clone for Worker<F, P> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            parser: Arc::clone(&self.parser),
            canonicalizer: Arc::clone(&self.canonicalizer),
            readiness: self.readiness.clone(),
            policy: self.policy,
        }
    }
}

impl<F: PageFetcher, P: PageParser> Worker<F, P> {
    pub fn new(
        pool: Arc<ResourcePool<F>>,
        parser: Arc<P>,
        canonicalizer: Arc<Canonicalizer>,
        readiness: Readiness,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            pool,
            parser,
            canonicalizer,
            readiness,
            policy,
        }
    }

    /// Fetches `url`, retrying retryable failures with backoff
    ///
    /// # Returns
    ///
    /// * `None` - Cancelled before the first attempt started, including while
    ///   waiting for a free session (or the pool is gone); nothing should be
    ///   recorded
    /// * `Some(Outcome)` - The result to persist
    pub async fn fetch_with_retries(
        &self,
        url: &CanonicalUrl,
        cancel: &CancellationToken,
    ) -> Option<Outcome> {
        if cancel.is_cancelled() {
            return None;
        }

        let max_retries = self.policy.max_retries;
        let mut last_error = String::new();

        for attempt in 0..max_retries {
            let guard = if attempt == 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    guard = self.pool.acquire() => guard,
                }
            } else {
                self.pool.acquire().await
            };

            let result = match guard {
                Ok(guard) => self.attempt(url, guard).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(outcome) => return Some(outcome),
                Err(FetchError::PoolClosed) => return None,
                Err(e) if !e.is_retryable() => {
                    tracing::debug!("Giving up on {}: {}", url, e);
                    return Some(Outcome::TerminalFailure {
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt + 1,
                        max_retries,
                        url,
                        e
                    );
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < max_retries {
                let delay = self.policy.backoff(attempt);
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Some(Outcome::RetryableFailure {
                            reason: format!("interrupted after {} attempts: {}", attempt + 1, last_error),
                        });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Some(Outcome::TerminalFailure {
            reason: format!("gave up after {} attempts: {}", max_retries, last_error),
        })
    }

    async fn attempt(
        &self,
        url: &CanonicalUrl,
        mut guard: PoolGuard<F>,
    ) -> Result<Outcome, FetchError> {
        let target = url
            .to_url()
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let session = guard.session_mut().ok_or(FetchError::NoSession)?;
        let page = self
            .pool
            .fetcher()
            .load(session, &target, &self.readiness)
            .await?;
        drop(guard);

        if !page.ready {
            tracing::debug!("{} never signalled readiness; using what loaded", url);
        }

        let parsed = self.parser.extract(&page.html, &page.final_url)?;

        let mut seen = HashSet::new();
        let links = parsed
            .hrefs
            .iter()
            .filter_map(|href| self.canonicalizer.canonicalize(&page.final_url, href))
            .filter(|link| link != url && seen.insert(link.clone()))
            .collect();

        Ok(Outcome::Success {
            title: parsed.title,
            content: parsed.content,
            links,
        })
    }
}
