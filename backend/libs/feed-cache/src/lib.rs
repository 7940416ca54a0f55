//! Shared-cache layer for the newsfeed ranking engine
//!
//! Provides the cache-resident half of the engine:
//! - Store contract with Redis and in-process implementations
//! - Unified key schema with versioning
//! - Metrics cache, candidate store, seen-post tracker, feed version
//!   controller, ranked window cache and per-author counters
//! - Prometheus metrics per entity

mod error;
mod keys;
mod memory_store;
mod metrics;
mod redis_store;
mod store;

pub mod author_count;
pub mod candidates;
pub mod post_metrics;
pub mod seen;
pub mod version;
pub mod window;

pub use author_count::AuthorCountStore;
pub use candidates::{CandidateEntry, CandidateStore};
pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, CACHE_VERSION};
pub use memory_store::InMemoryStore;
pub use metrics::CacheMetrics;
pub use post_metrics::{MetricField, MetricsCache, PostMetrics};
pub use redis_store::{RedisStore, SharedRedis};
pub use seen::SeenPostTracker;
pub use store::KeyValueStore;
pub use version::{FeedVersionController, Invalidation};
pub use window::{RankedWindow, RankedWindowCache, WindowItem, WINDOW_SCHEMA_VERSION};

/// Default TTL values (seconds)
pub mod ttl {
    pub const CANDIDATES: u64 = 3600; // 1 hour
    pub const METRICS: u64 = 3600; // 1 hour
    pub const SEEN: u64 = 7200; // session lifetime, 2 hours
    pub const WINDOW: u64 = 45; // 30-60s class
    pub const AUTHOR_COUNT: u64 = 600; // 10 minutes
}

/// Add 0-10% jitter to a TTL so entries warmed together don't expire together
pub fn ttl_with_jitter(ttl_secs: u64) -> u64 {
    let jitter_percent = (rand::random::<u32>() % 11) as f64 / 100.0;
    let jitter = (ttl_secs as f64 * jitter_percent).round() as u64;
    ttl_secs + jitter
}
