//! Per-author selection counts
//!
//! How many posts by each author the user was recently served. The ranker
//! seeds its diversity penalty from these counts so consecutive pages don't
//! pile up on one author.

use crate::{CacheKey, CacheMetrics, CacheResult, KeyValueStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct AuthorCountStore {
    store: Arc<dyn KeyValueStore>,
    metrics: CacheMetrics,
}

impl AuthorCountStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            metrics: CacheMetrics::new(),
        }
    }

    /// Counts keyed by author; unparsable fields are skipped
    pub async fn get_counts(&self, user_id: &str) -> CacheResult<HashMap<String, u32>> {
        let key = CacheKey::author_count(user_id);
        let raw = self.store.hash_get_all(&key).await?;

        Ok(raw
            .into_iter()
            .filter_map(|(author, value)| match value.parse::<u32>() {
                Ok(count) => Some((author, count)),
                Err(_) => {
                    warn!(user_id, author = %author, "Skipping bad author count");
                    None
                }
            })
            .collect())
    }

    /// Add `served` counts to the stored ones and refresh expiry
    pub async fn record(
        &self,
        user_id: &str,
        served: &HashMap<String, u32>,
        ttl_secs: u64,
    ) -> CacheResult<()> {
        let deltas: Vec<(String, i64)> = served
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(author, count)| (author.clone(), i64::from(*count)))
            .collect();
        if deltas.is_empty() {
            return Ok(());
        }

        let key = CacheKey::author_count(user_id);
        self.store.hash_incr_many(&key, &deltas, ttl_secs).await?;
        self.metrics.record_write(&key);
        Ok(())
    }
}
