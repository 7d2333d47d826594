//! Integration tests for the crawler

mod common;
mod crawl_tests;
mod http_fetcher_tests;
