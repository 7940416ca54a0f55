//! Ranked window cache
//!
//! Stores the last fully ranked list for a user so nearby page requests skip
//! recomputation. Each window is tagged with the feed version it was built
//! under and the payload schema version.

use crate::{CacheKey, CacheMetrics, CacheResult, KeyValueStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Bump when the serialized window layout changes
pub const WINDOW_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowItem {
    pub post_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedWindow {
    pub feed_version: u64,
    pub items: Vec<WindowItem>,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub schema_version: u32,
}

impl RankedWindow {
    pub fn new(feed_version: u64, items: Vec<WindowItem>) -> Self {
        Self {
            feed_version,
            items,
            generated_at: Utc::now(),
            schema_version: WINDOW_SCHEMA_VERSION,
        }
    }

    /// Whether this window was computed under `current_version`
    pub fn is_current(&self, current_version: u64) -> bool {
        self.feed_version == current_version
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Clone)]
pub struct RankedWindowCache {
    store: Arc<dyn KeyValueStore>,
    metrics: CacheMetrics,
}

impl RankedWindowCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            metrics: CacheMetrics::new(),
        }
    }

    pub async fn set_window(
        &self,
        user_id: &str,
        window: &RankedWindow,
        ttl_secs: u64,
    ) -> CacheResult<()> {
        let key = CacheKey::window(user_id);
        let payload = serde_json::to_string(window)?;
        self.store.set_ex(&key, &payload, ttl_secs).await?;
        self.metrics.record_write(&key);
        debug!(
            user_id,
            feed_version = window.feed_version,
            items = window.items.len(),
            "Ranked window cached"
        );
        Ok(())
    }

    /// Read the cached window. Undecodable or old-schema payloads are
    /// deleted and reported as a miss.
    pub async fn get_window(&self, user_id: &str) -> CacheResult<Option<RankedWindow>> {
        let key = CacheKey::window(user_id);
        let Some(raw) = self.store.get(&key).await? else {
            self.metrics.record_miss(&key);
            return Ok(None);
        };

        match serde_json::from_str::<RankedWindow>(&raw) {
            Ok(window) if window.schema_version == WINDOW_SCHEMA_VERSION => {
                self.metrics.record_hit(&key);
                Ok(Some(window))
            }
            Ok(window) => {
                debug!(
                    user_id,
                    schema_version = window.schema_version,
                    "Discarding window with old schema"
                );
                self.discard(&key).await;
                Ok(None)
            }
            Err(e) => {
                warn!(user_id, error = %e, "Discarding undecodable window");
                self.metrics.record_error(&key, "decode");
                self.discard(&key).await;
                Ok(None)
            }
        }
    }

    pub async fn delete_window(&self, user_id: &str) -> CacheResult<()> {
        let key = CacheKey::window(user_id);
        self.store.del(&[key.clone()]).await?;
        self.metrics.record_invalidation(&key);
        Ok(())
    }

    async fn discard(&self, key: &str) {
        self.metrics.record_miss(key);
        if let Err(e) = self.store.del(&[key.to_string()]).await {
            warn!(key = %key, error = %e, "Failed to delete bad window");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;

    fn window(version: u64) -> RankedWindow {
        RankedWindow::new(
            version,
            vec![
                WindowItem {
                    post_id: "p1".into(),
                    score: 1.5,
                },
                WindowItem {
                    post_id: "p2".into(),
                    score: 0.7,
                },
            ],
        )
    }

    #[tokio::test]
    async fn test_roundtrip_keeps_order_and_version() {
        let cache = RankedWindowCache::new(Arc::new(InMemoryStore::new()));
        cache.set_window("u1", &window(3), 45).await.unwrap();

        let got = cache.get_window("u1").await.unwrap().unwrap();
        assert_eq!(got.feed_version, 3);
        assert!(got.is_current(3));
        assert!(!got.is_current(4));
        assert_eq!(got.items[0].post_id, "p1");
        assert_eq!(got.items[1].post_id, "p2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expires() {
        let cache = RankedWindowCache::new(Arc::new(InMemoryStore::new()));
        cache.set_window("u1", &window(0), 45).await.unwrap();

        tokio::time::advance(std::time::Duration::from_secs(46)).await;
        assert!(cache.get_window("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_deleted() {
        let store = Arc::new(InMemoryStore::new());
        let key = CacheKey::window("u1");
        store.set_ex(&key, "{not json", 45).await.unwrap();

        let cache = RankedWindowCache::new(store.clone());
        assert!(cache.get_window("u1").await.unwrap().is_none());
        assert!(!store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_old_schema_is_miss() {
        let store = Arc::new(InMemoryStore::new());
        let mut old = window(1);
        old.schema_version = 0;
        store
            .set_ex(
                &CacheKey::window("u1"),
                &serde_json::to_string(&old).unwrap(),
                45,
            )
            .await
            .unwrap();

        let cache = RankedWindowCache::new(store);
        assert!(cache.get_window("u1").await.unwrap().is_none());
    }
}
