//! Posts already served within one session

use crate::{CacheKey, CacheMetrics, CacheResult, KeyValueStore};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct SeenPostTracker {
    store: Arc<dyn KeyValueStore>,
    metrics: CacheMetrics,
}

impl SeenPostTracker {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            metrics: CacheMetrics::new(),
        }
    }

    /// Record served posts; every call refreshes the session's expiry
    pub async fn add_seen(
        &self,
        user_id: &str,
        session_id: &str,
        post_ids: &[String],
        ttl_secs: u64,
    ) -> CacheResult<()> {
        if post_ids.is_empty() {
            return Ok(());
        }
        let key = CacheKey::seen(user_id, session_id);
        self.store.set_add(&key, post_ids, ttl_secs).await?;
        self.metrics.record_write(&key);
        Ok(())
    }

    pub async fn get_seen(&self, user_id: &str, session_id: &str) -> CacheResult<HashSet<String>> {
        self.store
            .set_members(&CacheKey::seen(user_id, session_id))
            .await
    }

    pub async fn is_seen(&self, user_id: &str, session_id: &str, post_id: &str) -> CacheResult<bool> {
        self.store
            .set_contains(&CacheKey::seen(user_id, session_id), post_id)
            .await
    }

    /// Keep only unseen ids, preserving input order
    pub async fn filter_unseen(
        &self,
        user_id: &str,
        session_id: &str,
        post_ids: Vec<String>,
    ) -> CacheResult<Vec<String>> {
        if post_ids.is_empty() {
            return Ok(post_ids);
        }
        let flags = self
            .store
            .set_contains_many(&CacheKey::seen(user_id, session_id), &post_ids)
            .await?;

        Ok(post_ids
            .into_iter()
            .zip(flags)
            .filter_map(|(id, seen)| (!seen).then_some(id))
            .collect())
    }
}
