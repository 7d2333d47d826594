//! Page fetching
//!
//! This module defines the fetcher seam used by the pool and the workers:
//! - Opening and closing sessions (a rendering engine instance, an HTTP client)
//! - Loading a URL into a session with a bounded readiness wait
//! - Error classification into retryable and terminal failures
//!
//! [`HttpFetcher`] is the default implementation, built on reqwest.

use crate::config::FetchConfig;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use scraper::{Html, Selector};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors raised while loading a page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Page did not load within {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("Not an HTML page (content-type: {0})")]
    NotHtml(String),

    #[error("Could not open fetch session: {0}")]
    Session(String),

    #[error("No fetch session available")]
    NoSession,

    #[error("Primary content not found")]
    MissingContent,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Resource pool is shut down")]
    PoolClosed,
}

impl FetchError {
    /// Returns true if another attempt may succeed
    ///
    /// | Error | Retry? |
    /// |-------|--------|
    /// | Timeout, transport, session, missing content | yes |
    /// | HTTP 429 and 5xx | yes |
    /// | Other HTTP errors, non-HTML, invalid URL | no |
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_)
            | Self::Transport(_)
            | Self::Session(_)
            | Self::NoSession
            | Self::MissingContent => true,
            Self::Http(code) => {
                *code == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..600).contains(code)
            }
            Self::NotHtml(_) | Self::InvalidUrl(_) | Self::PoolClosed => false,
        }
    }
}

/// When a loaded page counts as ready
#[derive(Debug, Clone)]
pub struct Readiness {
    /// Upper bound on the whole load, readiness wait included
    pub timeout: Duration,

    /// The page is ready once its title contains this token
    pub title_token: Option<String>,
}

impl Readiness {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            timeout: config.readiness_timeout(),
            title_token: config.ready_title_token.clone(),
        }
    }

    /// Checks a page title against the readiness token (no token: always ready)
    pub fn is_ready(&self, title: Option<&str>) -> bool {
        match (&self.title_token, title) {
            (None, _) => true,
            (Some(token), Some(title)) => title.contains(token.as_str()),
            (Some(_), None) => false,
        }
    }
}

/// A loaded page
#[derive(Debug, Clone)]
pub struct LoadedPage {
    /// Rendered HTML
    pub html: String,

    /// URL after redirects; relative links resolve against it
    pub final_url: Url,

    /// Whether the readiness signal was observed before the timeout
    pub ready: bool,
}

/// Loads pages into sessions
///
/// A session is whatever state one concurrent page load needs. Sessions are
/// owned by the resource pool and lent to one worker at a time.
#[async_trait]
pub trait PageFetcher: Send + Sync + 'static {
    type Session: Send + 'static;

    /// Opens a new session
    async fn create_session(&self) -> Result<Self::Session, FetchError>;

    /// Releases a session; must not fail
    async fn close_session(&self, session: Self::Session);

    /// Loads `url`, waiting at most `readiness.timeout`
    ///
    /// A page that loaded but never showed the readiness signal is returned
    /// with `ready: false`; only a load that produced no document is an error.
    async fn load(
        &self,
        session: &mut Self::Session,
        url: &Url,
        readiness: &Readiness,
    ) -> Result<LoadedPage, FetchError>;
}

/// HTTP session: a client with its own cookie jar
#[derive(Debug)]
pub struct HttpSession {
    client: Client,
    pages_loaded: u64,
}

impl HttpSession {
    pub fn pages_loaded(&self) -> u64 {
        self.pages_loaded
    }
}

/// Default fetcher: plain HTTP GET, no script execution
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    user_agent: String,
    connect_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    type Session = HttpSession;

    async fn create_session(&self) -> Result<HttpSession, FetchError> {
        let client = Client::builder()
            .user_agent(&self.user_agent)
            .connect_timeout(self.connect_timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| FetchError::Session(e.to_string()))?;

        Ok(HttpSession {
            client,
            pages_loaded: 0,
        })
    }

    async fn close_session(&self, session: HttpSession) {
        tracing::trace!("Closing HTTP session after {} pages", session.pages_loaded);
    }

    async fn load(
        &self,
        session: &mut HttpSession,
        url: &Url,
        readiness: &Readiness,
    ) -> Result<LoadedPage, FetchError> {
        let response = session
            .client
            .get(url.clone())
            .timeout(readiness.timeout)
            .send()
            .await
            .map_err(|e| classify_error(e, readiness.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        // Servers that omit the header are given the benefit of the doubt
        if !content_type.is_empty() && !content_type.contains("html") {
            return Err(FetchError::NotHtml(content_type));
        }

        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| classify_error(e, readiness.timeout))?;

        session.pages_loaded += 1;

        let ready = readiness.is_ready(page_title(&html).as_deref());
        Ok(LoadedPage {
            html,
            final_url,
            ready,
        })
    }
}

fn classify_error(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout)
    } else if let Some(status) = error.status() {
        FetchError::Http(status.as_u16())
    } else {
        FetchError::Transport(error.to_string())
    }
}

fn page_title(html: &str) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    Html::parse_document(html)
        .select(&selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
}
