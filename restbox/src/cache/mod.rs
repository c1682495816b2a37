//! Response cache and in-flight request coalescing.
//!
//! The cache is made of three structures that are always mutated together
//! under one lock by the [`RequestCache`] controller:
//!
//! - [`CacheStore`] - cached responses by [`CacheKey`](restbox_core::CacheKey)
//! - [`EvictionTimers`] - at most one TTL timer per cached key
//! - [`RunningRequests`] - requests waiting for an in-flight response
//!
//! Only GET requests that carry [`RequestCacheOptions`](restbox_core::RequestCacheOptions)
//! go through the cache; everything else is sent straight to the transport.

pub mod lifecycle;
pub mod running;
pub mod store;
pub mod timer;

pub use lifecycle::{CacheStatus, Delivery, RequestCache, Resolved};
pub use running::{PendingRequest, RequestId, RunningRequests, Slice};
pub use store::{CacheEntry, CacheStore};
pub use timer::{EvictionTimers, TimerId};
