//! HTTP fetcher tests against a mock server

use crate::common::test_config;
use doc_crawler::crawler::{crawl, FetchError, HttpFetcher, PageFetcher, Readiness};
use doc_crawler::storage::{FrontierStore, SqliteStore};
use doc_crawler::{CrawlOutcome, UrlStatus};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html_page(title: &str, body: &str) -> ResponseTemplate {
    let html = format!(
        "<html><head><title>{}</title></head><body>{}</body></html>",
        title, body
    );
    ResponseTemplate::new(200).set_body_raw(html, "text/html")
}

fn readiness(token: Option<&str>) -> Readiness {
    Readiness {
        timeout: Duration::from_secs(5),
        title_token: token.map(str::to_string),
    }
}

async fn load(
    server: &MockServer,
    route: &str,
    readiness: &Readiness,
) -> Result<doc_crawler::crawler::LoadedPage, FetchError> {
    let config = test_config(std::path::Path::new("unused.db"));
    let fetcher = HttpFetcher::new(&config.fetch);
    let mut session = fetcher.create_session().await?;
    let url = Url::parse(&format!("{}{}", server.uri(), route)).unwrap();
    fetcher.load(&mut session, &url, readiness).await
}

#[tokio::test]
async fn test_load_html_page() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(html_page("Guide | Docs", "<p>Hello</p>"))
        .mount(&mock_server)
        .await;

    let page = load(&mock_server, "/doc", &readiness(Some("Docs"))).await.unwrap();

    assert!(page.ready);
    assert!(page.html.contains("<p>Hello</p>"));
    assert_eq!(page.final_url.path(), "/doc");
}

#[tokio::test]
async fn test_readiness_token_missing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(html_page("Loading...", "<p>spinner</p>"))
        .mount(&mock_server)
        .await;

    // The page is still returned, just flagged as not ready
    let page = load(&mock_server, "/doc", &readiness(Some("Docs"))).await.unwrap();
    assert!(!page.ready);
}

#[tokio::test]
async fn test_http_errors_are_classified() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let err = load(&mock_server, "/gone", &readiness(None)).await.unwrap_err();
    assert!(matches!(err, FetchError::Http(404)));
    assert!(!err.is_retryable());

    let err = load(&mock_server, "/busy", &readiness(None)).await.unwrap_err();
    assert!(matches!(err, FetchError::Http(503)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_non_html_rejected() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc/manual.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("%PDF-1.4", "application/pdf"))
        .mount(&mock_server)
        .await;

    let err = load(&mock_server, "/doc/manual.pdf", &readiness(None))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::NotHtml(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_slow_page_times_out() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html_page("Slow", "").set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let quick = Readiness {
        timeout: Duration::from_millis(200),
        title_token: None,
    };
    let err = load(&mock_server, "/slow", &quick).await.unwrap_err();
    assert!(matches!(err, FetchError::Timeout(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_crawl_over_http() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(html_page(
            "Home",
            r#"<a href="/doc/a">A</a> <a href="/doc/b?lang=en#top">B</a> <a href="/other">Other</a>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/doc/a"))
        .respond_with(html_page("A", r#"<p>Page A</p><a href="b">B again</a>"#))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/doc/b"))
        .respond_with(html_page("B", "<p>Page B</p>"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/other"))
        .respond_with(html_page("Other", ""))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("frontier.db");
    let mut config = test_config(&db_path);
    config.crawl.start_url = format!("{}/doc", base);
    config.crawl.path_prefix = format!("{}/doc", base);
    config.crawl.allowed_domain = "127.0.0.1".to_string();

    let report = crawl(config, CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!((report.done, report.total), (3, 3));

    let store = SqliteStore::open(&db_path).unwrap();
    let page_a = store.get(&format!("{}/doc/a", base)).unwrap().unwrap();
    assert_eq!(page_a.status, UrlStatus::Success);
    assert_eq!(page_a.title.as_deref(), Some("A"));
    assert!(store.get(&format!("{}/other", base)).unwrap().is_none());
}
