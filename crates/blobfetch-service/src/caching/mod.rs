//! # Request caching
//!
//! Every fetch in this crate goes through an in-memory [`Cacher`] which does request
//! coalescing: concurrent requests for the same [`CacheKey`] share a single upstream query,
//! and the outcome of that query is kept and handed to every later request for the key.
//!
//! A request goes through the following steps:
//! - Its options are normalized and turned into a [`CacheKey`].
//! - If a computation for the key exists, running or finished, the caller subscribes to it.
//! - Otherwise a fresh computation is spawned on the runtime and registered under the key.
//!
//! Computations are spawned as their own tasks. A caller that stops waiting does not cancel the
//! upstream query, and other callers of the same key still receive its result.
//!
//! ## Errors
//!
//! Errors are [`CacheEntry`] values like any other, so a failed computation is replayed to
//! all callers of its key and never retried. Callers that want a fresh attempt have to
//! use a different key.
//!
//! ## Lifetime
//!
//! Entries live as long as the [`Cacher`] that holds them. There is no expiration and no
//! eviction, freshness is the responsibility of whoever owns the cache.
//!
//! ### Metrics
//!
//! Each metric is tagged with a `cache` field that corresponds to the [`CacheName`]:
//!
//! - `caches.access`: All accesses.
//! - `caches.channel.hit`: Accesses served by an existing computation.
//! - `caches.channel.miss`: Accesses that spawned a new computation.
//! - `caches.computation`: Computations actually being run.
use std::fmt;

mod cache_error;
mod cache_key;
mod memory;

pub use cache_error::{CacheEntry, FetchError};
pub use cache_key::{CacheKey, CacheKeyBuilder};
pub use memory::{CacheItemRequest, Cacher};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheName {
    Blobs,
    Definitions,
}

impl AsRef<str> for CacheName {
    fn as_ref(&self) -> &str {
        match self {
            Self::Blobs => "blobs",
            Self::Definitions => "definitions",
        }
    }
}

impl fmt::Display for CacheName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}
