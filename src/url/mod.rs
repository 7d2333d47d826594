//! URL handling module
//!
//! The canonicalizer is the crawl's only dedup boundary: every frontier
//! membership test and every store key goes through it.

mod canonical;

pub use canonical::{CanonicalUrl, Canonicalizer};
