//! State module for tracking crawl progress
//!
//! - `UrlStatus`: the persisted status of a frontier record
//! - `FailureKind`: whether a failed attempt may be retried

mod url_status;

pub use url_status::{FailureKind, UrlStatus};
