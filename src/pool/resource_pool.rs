use crate::crawler::{FetchError, PageFetcher};
use crate::CrawlError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One slot of the pool; `session` is `None` after a failed re-creation
struct PoolEntry<S> {
    session: Option<S>,
    created_at: Instant,
}

impl<S> PoolEntry<S> {
    fn new(session: Option<S>) -> Self {
        Self {
            session,
            created_at: Instant::now(),
        }
    }

    fn needs_refresh(&self, recycle_interval: Duration) -> bool {
        self.session.is_none() || self.created_at.elapsed() >= recycle_interval
    }
}

struct PoolInner<F: PageFetcher> {
    fetcher: Arc<F>,
    idle: Mutex<Vec<PoolEntry<F::Session>>>,
    permits: Arc<Semaphore>,
    capacity: usize,
    recycle_interval: Duration,
    closed: AtomicBool,
}

impl<F: PageFetcher> PoolInner<F> {
    // Never held across an await point, so a poisoned lock only means a
    // borrower panicked elsewhere; the Vec itself is still consistent.
    fn idle(&self) -> MutexGuard<'_, Vec<PoolEntry<F::Session>>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Bounded pool of fetch sessions with time-based recycling
pub struct ResourcePool<F: PageFetcher> {
    inner: Arc<PoolInner<F>>,
}

impl<F: PageFetcher> ResourcePool<F> {
    /// Creates the pool eagerly by opening `size` sessions
    ///
    /// Sessions that fail to open are logged and skipped, so the pool may end
    /// up smaller than requested.
    ///
    /// # Returns
    ///
    /// * `Ok(ResourcePool)` - At least one session was created
    /// * `Err(CrawlError::NoResources)` - Every creation failed
    pub async fn new(
        fetcher: Arc<F>,
        size: usize,
        recycle_interval: Duration,
    ) -> Result<Self, CrawlError> {
        let mut entries = Vec::with_capacity(size);

        for slot in 0..size {
            match fetcher.create_session().await {
                Ok(session) => entries.push(PoolEntry::new(Some(session))),
                Err(e) => tracing::warn!("Failed to create fetch session {}: {}", slot, e),
            }
        }

        if entries.is_empty() {
            return Err(CrawlError::NoResources);
        }

        if entries.len() < size {
            tracing::warn!(
                "Continuing with {} of {} fetch sessions",
                entries.len(),
                size
            );
        }

        let capacity = entries.len();
        Ok(Self {
            inner: Arc::new(PoolInner {
                fetcher,
                idle: Mutex::new(entries),
                permits: Arc::new(Semaphore::new(capacity)),
                capacity,
                recycle_interval,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// The fetcher sessions are created by and loaded with
    pub fn fetcher(&self) -> &F {
        &self.inner.fetcher
    }

    /// Number of slots, fixed once built
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of slots currently sitting in the pool (not checked out)
    pub fn resident(&self) -> usize {
        self.inner.idle().len()
    }

    /// Borrows a session, waiting until one is free
    ///
    /// A slot that is older than the recycle interval, or that lost its
    /// session earlier, is recreated first. If re-creation fails the guard
    /// carries no session and [`PoolGuard::session_mut`] returns `None`.
    pub async fn acquire(&self) -> Result<PoolGuard<F>, FetchError> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FetchError::PoolClosed)?;

        let entry = self
            .inner
            .idle()
            .pop()
            .unwrap_or_else(|| PoolEntry::new(None));

        // The guard owns the slot from here on, so cancelling this future
        // mid-refresh still returns the slot to the pool.
        let mut guard = PoolGuard {
            entry: Some(entry),
            inner: Arc::clone(&self.inner),
            _permit: permit,
        };
        guard.refresh().await;

        Ok(guard)
    }

    /// Closes every resident session
    ///
    /// Waiting borrowers are released with [`FetchError::PoolClosed`]; sessions
    /// still checked out are closed when their guard drops.
    pub async fn shutdown(&self) {
        // Flag and drain under one lock so a guard dropping concurrently
        // either lands in the drained set or sees the flag
        let entries: Vec<_> = {
            let mut idle = self.inner.idle();
            if self.inner.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            idle.drain(..).collect()
        };
        self.inner.permits.close();

        let mut closed = 0;
        for entry in entries {
            if let Some(session) = entry.session {
                self.inner.fetcher.close_session(session).await;
                closed += 1;
            }
        }

        tracing::debug!("Closed {} pooled fetch sessions", closed);
    }
}

/// Exclusive loan of one pool slot, returned on drop
pub struct PoolGuard<F: PageFetcher> {
    entry: Option<PoolEntry<F::Session>>,
    inner: Arc<PoolInner<F>>,
    // released after `drop` has put the entry back
    _permit: OwnedSemaphorePermit,
}

impl<F: PageFetcher> PoolGuard<F> {
    /// The borrowed session, or `None` if the slot could not be recreated
    pub fn session_mut(&mut self) -> Option<&mut F::Session> {
        self.entry.as_mut().and_then(|e| e.session.as_mut())
    }

    pub fn has_session(&self) -> bool {
        self.entry.as_ref().is_some_and(|e| e.session.is_some())
    }

    async fn refresh(&mut self) {
        let recycle_interval = self.inner.recycle_interval;
        let Some(entry) = self.entry.as_mut() else {
            return;
        };
        if !entry.needs_refresh(recycle_interval) {
            return;
        }

        if let Some(old) = entry.session.take() {
            tracing::debug!(
                "Recycling fetch session after {:?}",
                entry.created_at.elapsed()
            );
            self.inner.fetcher.close_session(old).await;
        }

        let session = match self.inner.fetcher.create_session().await {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("Failed to recreate fetch session: {}", e);
                None
            }
        };

        if let Some(entry) = self.entry.as_mut() {
            *entry = PoolEntry::new(session);
        }
    }
}

impl<F: PageFetcher> Drop for PoolGuard<F> {
    fn drop(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };

        {
            let mut idle = self.inner.idle();
            if !self.inner.closed.load(Ordering::SeqCst) {
                idle.push(entry);
                return;
            }
        }

        // Pool already shut down: close instead of returning
        if let Some(session) = entry.session {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let fetcher = Arc::clone(&self.inner.fetcher);
                handle.spawn(async move { fetcher.close_session(session).await });
            }
        }
    }
}
