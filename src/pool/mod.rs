//! Pool of fetch sessions
//!
//! A fixed number of sessions is created up front. Borrowers wait for a free
//! session, use it for one page load and hand it back when their guard is
//! dropped, whatever way they exit. Sessions past their recycle interval are
//! replaced on checkout.

mod resource_pool;

pub use resource_pool::{PoolGuard, ResourcePool};
