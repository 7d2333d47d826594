//! Shared helpers: an in-process fake site and test configurations

use async_trait::async_trait;
use doc_crawler::config::Config;
use doc_crawler::crawler::{FetchError, LoadedPage, PageFetcher, Readiness};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Creates a configuration scoped to `https://x/doc` with fast retries
pub fn test_config(db_path: &Path) -> Config {
    let mut config = Config::default();
    config.crawl.start_url = "https://x/doc".to_string();
    config.crawl.allowed_domain = "x".to_string();
    config.crawl.path_prefix = "https://x/doc".to_string();
    config.pool.workers = 4;
    config.pool.pool_size = 2;
    config.retry.max_retries = 2;
    config.retry.retry_ceiling = 2;
    config.retry.backoff_base_ms = 1;
    config.retry.backoff_cap_ms = 2;
    config.output.database_path = db_path.display().to_string();
    config
}

/// A site held in memory; unknown URLs answer 404
#[derive(Clone, Default)]
pub struct FakeSite {
    inner: Arc<SiteInner>,
}

#[derive(Default)]
struct SiteInner {
    pages: Mutex<HashMap<String, String>>,
    loads: Mutex<Vec<String>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
    load_delay: Mutex<Duration>,
    refuse_sessions: bool,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// A site whose sessions can never be opened
    pub fn unreachable() -> Self {
        Self {
            inner: Arc::new(SiteInner {
                refuse_sessions: true,
                ..SiteInner::default()
            }),
        }
    }

    /// Adds a page with a title and links (hrefs as written in the HTML)
    pub fn page(self, url: &str, title: &str, links: &[&str]) -> Self {
        let anchors: String = links
            .iter()
            .map(|href| format!(r#"<a href="{}">{}</a>"#, href, href))
            .collect();
        let html = format!(
            "<html><head><title>{}</title></head><body><p>{} content</p>{}</body></html>",
            title, title, anchors
        );
        self.inner
            .pages
            .lock()
            .unwrap()
            .insert(url.to_string(), html);
        self
    }

    /// Makes every load take `delay` before it answers
    pub fn slow_down(&self, delay: Duration) {
        *self.inner.load_delay.lock().unwrap() = delay;
    }

    /// Cancels `token` as soon as the `n`-th page load starts
    pub fn cancel_after(&self, n: usize, token: CancellationToken) {
        *self.inner.cancel_after.lock().unwrap() = Some((n, token));
    }

    /// Every URL loaded so far, in order
    pub fn loads(&self) -> Vec<String> {
        self.inner.loads.lock().unwrap().clone()
    }

    pub fn load_count(&self, url: &str) -> usize {
        self.loads().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl PageFetcher for FakeSite {
    type Session = ();

    async fn create_session(&self) -> Result<(), FetchError> {
        if self.inner.refuse_sessions {
            return Err(FetchError::Session("connection refused".to_string()));
        }
        Ok(())
    }

    async fn close_session(&self, _session: ()) {}

    async fn load(
        &self,
        _session: &mut (),
        url: &Url,
        _readiness: &Readiness,
    ) -> Result<LoadedPage, FetchError> {
        let key = url.to_string();
        let served = {
            let mut loads = self.inner.loads.lock().unwrap();
            loads.push(key.clone());
            loads.len()
        };

        if let Some((n, token)) = self.inner.cancel_after.lock().unwrap().as_ref() {
            if served == *n {
                token.cancel();
            }
        }

        let delay = *self.inner.load_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.inner.pages.lock().unwrap().get(&key) {
            Some(html) => Ok(LoadedPage {
                html: html.clone(),
                final_url: url.clone(),
                ready: true,
            }),
            None => Err(FetchError::Http(404)),
        }
    }
}
