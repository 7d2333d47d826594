//! Orchestration tests against an in-process fake site
//!
//! These tests run the full Starting -> Running -> Draining -> Stopped cycle
//! over a real SQLite frontier in a temporary directory.

use crate::common::{test_config, FakeSite};
use doc_crawler::crawler::{HtmlParser, Phase};
use doc_crawler::storage::{FrontierStore, SqliteStore};
use doc_crawler::{CrawlError, CrawlOutcome, Orchestrator, UrlStatus};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn open(dir: &TempDir) -> SqliteStore {
    SqliteStore::open(&dir.path().join("frontier.db")).expect("Failed to open frontier")
}

#[tokio::test]
async fn test_single_page_budget() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir.path().join("frontier.db"));
    config.crawl.max_pages = Some(1);

    let site = FakeSite::new().page("https://x/doc", "OK", &["/doc/a", "/other"]);
    let mut orchestrator = Orchestrator::new(config, site.clone(), HtmlParser::default());

    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::PageLimitReached);
    assert_eq!((report.done, report.total), (1, 2));
    assert_eq!(orchestrator.phase(), Phase::Stopped);

    let store = open(&dir);
    let start = store.get("https://x/doc").unwrap().unwrap();
    assert_eq!(start.status, UrlStatus::Success);
    assert_eq!(start.title.as_deref(), Some("OK"));
    assert!(start.content_ref.is_some());

    let discovered = store.get("https://x/doc/a").unwrap().unwrap();
    assert_eq!(discovered.status, UrlStatus::New);
    assert_eq!(discovered.attempts, 0);

    assert!(store.get("https://x/other").unwrap().is_none());
    assert_eq!(site.loads(), vec!["https://x/doc"]);
}

#[tokio::test]
async fn test_full_crawl_completes() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir.path().join("frontier.db"));

    let site = FakeSite::new()
        .page("https://x/doc", "Home", &["/doc/a", "/doc/b?lang=en"])
        .page("https://x/doc/a", "A", &["/doc/b#top", "/doc", "https://y/doc/z"])
        .page("https://x/doc/b", "B", &["/doc/missing", "../other"]);

    let mut orchestrator = Orchestrator::new(config.clone(), site.clone(), HtmlParser::default());
    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 1);
    assert_eq!((report.done, report.total), (3, 4));
    assert_eq!(report.write_errors, 0);

    // every page fetched exactly once, the 404 not retried
    for url in ["https://x/doc", "https://x/doc/a", "https://x/doc/b", "https://x/doc/missing"] {
        assert_eq!(site.load_count(url), 1, "{}", url);
    }

    let store = open(&dir);
    let missing = store.get("https://x/doc/missing").unwrap().unwrap();
    assert_eq!(missing.status, UrlStatus::Failed);
    assert!(missing.attempts >= config.retry.retry_ceiling);
    assert!(missing.last_error.unwrap().contains("404"));

    assert_eq!(
        store.content("https://x/doc/a").unwrap().as_deref(),
        Some("A content\n/doc/b#top /doc https://y/doc/z")
    );

    // a second run finds nothing to do and fetches nothing
    let mut again = Orchestrator::new(config, site.clone(), HtmlParser::default());
    let report = again.run(CancellationToken::new()).await.unwrap();
    assert_eq!(report.outcome, CrawlOutcome::NothingToDo);
    assert_eq!(site.loads().len(), 4);
}

#[tokio::test]
async fn test_interrupt_and_resume() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir.path().join("frontier.db"));
    config.pool.workers = 1;
    config.pool.pool_size = 1;

    let children: Vec<String> = (0..9).map(|i| format!("/doc/{}", i)).collect();
    let hrefs: Vec<&str> = children.iter().map(String::as_str).collect();
    let mut site = FakeSite::new().page("https://x/doc", "Home", &hrefs);
    for i in 0..9 {
        site = site.page(&format!("https://x/doc/{}", i), &format!("Page {}", i), &[]);
    }

    // First run: interrupted once the third page has been served
    let cancel = CancellationToken::new();
    site.cancel_after(3, cancel.clone());

    let mut first = Orchestrator::new(config.clone(), site.clone(), HtmlParser::default());
    let report = first.run(cancel).await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Interrupted);
    assert_eq!((report.done, report.total), (3, 10));

    {
        let store = open(&dir);
        assert_eq!(store.claim_pending(100, config.retry.retry_ceiling).unwrap().len(), 7);
    }

    // Second run: picks up exactly the remaining seven
    let mut second = Orchestrator::new(config, site.clone(), HtmlParser::default());
    let report = second.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.succeeded, 7);
    assert_eq!((report.done, report.total), (10, 10));

    let loads = site.loads();
    assert_eq!(loads.len(), 10);
    for url in &loads {
        assert_eq!(site.load_count(url), 1, "{} fetched twice", url);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dispatch_waiting_for_a_session_is_abandoned() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir.path().join("frontier.db"));
    config.pool.workers = 2;
    config.pool.pool_size = 1;

    let site = FakeSite::new()
        .page("https://x/doc", "Home", &["/doc/a", "/doc/b"])
        .page("https://x/doc/a", "A", &[])
        .page("https://x/doc/b", "B", &[]);
    site.slow_down(Duration::from_millis(150));

    // The second load cancels the run while the other child page waits for
    // the only session
    let cancel = CancellationToken::new();
    site.cancel_after(2, cancel.clone());

    let mut first = Orchestrator::new(config.clone(), site.clone(), HtmlParser::default());
    let report = first.run(cancel).await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Interrupted);
    assert_eq!(site.loads().len(), 2);
    assert_eq!((report.done, report.total), (2, 3));

    // the abandoned page is fetched by the next run
    site.slow_down(Duration::ZERO);
    let mut second = Orchestrator::new(config, site.clone(), HtmlParser::default());
    let report = second.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.succeeded, 1);
    assert_eq!(site.loads().len(), 3);
    for url in ["https://x/doc", "https://x/doc/a", "https://x/doc/b"] {
        assert_eq!(site.load_count(url), 1, "{}", url);
    }
}

#[tokio::test]
async fn test_interrupted_dispatch_is_claimed_again() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir.path().join("frontier.db"));

    // A previous run died after marking the page in progress
    {
        let mut store = open(&dir);
        let url = doc_crawler::Canonicalizer::new("x", "https://x/doc")
            .unwrap()
            .canonicalize_absolute("https://x/doc/a")
            .unwrap();
        store.ensure(&url).unwrap();
        store.mark_in_progress(&url, chrono::Utc::now()).unwrap();
    }

    let site = FakeSite::new()
        .page("https://x/doc", "Home", &[])
        .page("https://x/doc/a", "A", &[]);

    let mut orchestrator = Orchestrator::new(config, site.clone(), HtmlParser::default());
    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!((report.done, report.total), (2, 2));
    assert_eq!(site.load_count("https://x/doc/a"), 1);
}

#[tokio::test]
async fn test_no_fetch_sessions_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir.path().join("frontier.db"));

    let mut orchestrator =
        Orchestrator::new(config, FakeSite::unreachable(), HtmlParser::default());
    let result = orchestrator.run(CancellationToken::new()).await;

    assert!(matches!(result, Err(CrawlError::NoResources)));
    assert_eq!(orchestrator.phase(), Phase::Stopped);

    // the start URL was still seeded, so the next run can begin from it
    let store = open(&dir);
    assert_eq!(
        store.get("https://x/doc").unwrap().unwrap().status,
        UrlStatus::New
    );
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir.path().join("frontier.db"));
    let site = FakeSite::new().page("https://x/doc", "Home", &[]);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut orchestrator = Orchestrator::new(config, site.clone(), HtmlParser::default());
    let report = orchestrator.run(cancel).await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Interrupted);
    assert_eq!(report.done, 0);
    assert!(site.loads().is_empty());
}
