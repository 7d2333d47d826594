//! Output module for reporting on the frontier
//!
//! This module handles:
//! - Loading crawl statistics from the database
//! - Printing them for the `--stats` mode

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
