//! Feed version counter
//!
//! A per-user integer bumped on every invalidation. Ranked windows carry the
//! version they were computed under; a window tagged with anything else is
//! stale. The counter has no expiry so it never moves backwards.

use crate::{CacheError, CacheKey, CacheMetrics, CacheResult, KeyValueStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of invalidating one user's feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Invalidation {
    /// Version after the bump
    pub version: u64,
    /// Whether cached candidates and window were also deleted.
    /// `false` is harmless since the version bump alone stales the window.
    pub purged: bool,
}

#[derive(Clone)]
pub struct FeedVersionController {
    store: Arc<dyn KeyValueStore>,
    metrics: CacheMetrics,
}

impl FeedVersionController {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            metrics: CacheMetrics::new(),
        }
    }

    /// Current version; 0 when never invalidated
    pub async fn get_version(&self, user_id: &str) -> CacheResult<u64> {
        let key = CacheKey::feed_version(user_id);
        match self.store.get(&key).await? {
            None => Ok(0),
            Some(raw) => parse_version(&key, &raw),
        }
    }

    /// Atomically bump the version and return the new value
    pub async fn increment_version(&self, user_id: &str) -> CacheResult<u64> {
        let key = CacheKey::feed_version(user_id);
        let value = self.store.incr(&key, 1).await?;
        u64::try_from(value)
            .map_err(|_| CacheError::InvalidData(format!("negative feed version at {}", key)))
    }

    /// Bump the version, then drop the user's cached candidates and window.
    ///
    /// The bump must succeed; the purge is best effort.
    pub async fn invalidate(&self, user_id: &str) -> CacheResult<Invalidation> {
        let version = self.increment_version(user_id).await?;

        let keys = [CacheKey::candidates(user_id), CacheKey::window(user_id)];
        let purged = match self.store.del(&keys).await {
            Ok(()) => {
                for key in &keys {
                    self.metrics.record_invalidation(key);
                }
                true
            }
            Err(e) => {
                warn!(user_id, version, error = %e, "Feed purge failed after version bump");
                self.metrics.record_error(&keys[0], "purge");
                false
            }
        };

        info!(user_id, version, purged, "Feed invalidated");
        Ok(Invalidation { version, purged })
    }
}

fn parse_version(key: &str, raw: &str) -> CacheResult<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| CacheError::InvalidData(format!("feed version at {} is not a counter", key)))
}
