//! Candidate pool per user
//!
//! An upstream generator writes the whole pool; the ranker only reads it,
//! highest base score first.

use crate::{CacheKey, CacheMetrics, CacheResult, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntry {
    pub post_id: String,
    pub base_score: f64,
}

impl CandidateEntry {
    pub fn new(post_id: impl Into<String>, base_score: f64) -> Self {
        Self {
            post_id: post_id.into(),
            base_score,
        }
    }
}

#[derive(Clone)]
pub struct CandidateStore {
    store: Arc<dyn KeyValueStore>,
    metrics: CacheMetrics,
}

impl CandidateStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            metrics: CacheMetrics::new(),
        }
    }

    /// Replace the user's pool atomically. Entries with a non-finite base
    /// score are dropped; a repeated post id keeps its last score.
    pub async fn set_candidates(
        &self,
        user_id: &str,
        entries: &[CandidateEntry],
        ttl_secs: u64,
    ) -> CacheResult<usize> {
        let key = CacheKey::candidates(user_id);
        let members: Vec<(String, f64)> = entries
            .iter()
            .filter(|e| {
                let finite = e.base_score.is_finite();
                if !finite {
                    warn!(user_id, post_id = %e.post_id, "Dropping candidate with non-finite base score");
                }
                finite
            })
            .map(|e| (e.post_id.clone(), e.base_score))
            .collect();

        self.store.zset_replace(&key, &members, ttl_secs).await?;
        self.metrics.record_write(&key);
        debug!(user_id, count = members.len(), "Candidates replaced");
        Ok(members.len())
    }

    /// Pool ordered by base score descending, truncated to `limit`
    pub async fn get_candidates(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> CacheResult<Vec<CandidateEntry>> {
        let key = CacheKey::candidates(user_id);
        let rows = self
            .store
            .zset_range_desc(&key, limit)
            .await
            .map_err(|e| {
                self.metrics.record_error(&key, "read");
                e
            })?;

        if rows.is_empty() {
            self.metrics.record_miss(&key);
        } else {
            self.metrics.record_hit(&key);
        }

        Ok(rows
            .into_iter()
            .map(|(post_id, base_score)| CandidateEntry { post_id, base_score })
            .collect())
    }

    pub async fn candidates_exist(&self, user_id: &str) -> CacheResult<bool> {
        self.store.exists(&CacheKey::candidates(user_id)).await
    }

    pub async fn delete_candidates(&self, user_id: &str) -> CacheResult<()> {
        let key = CacheKey::candidates(user_id);
        self.store.del(&[key.clone()]).await?;
        self.metrics.record_invalidation(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;

    fn pool() -> Vec<CandidateEntry> {
        vec![
            CandidateEntry::new("p1", 0.2),
            CandidateEntry::new("p2", 0.9),
            CandidateEntry::new("p3", 0.5),
        ]
    }

    #[tokio::test]
    async fn test_read_back_highest_first() {
        let store = CandidateStore::new(Arc::new(InMemoryStore::new()));
        store.set_candidates("u1", &pool(), 3600).await.unwrap();

        let got = store.get_candidates("u1", None).await.unwrap();
        let ids: Vec<&str> = got.iter().map(|c| c.post_id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p3", "p1"]);
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let store = CandidateStore::new(Arc::new(InMemoryStore::new()));
        store.set_candidates("u1", &pool(), 3600).await.unwrap();

        let got = store.get_candidates("u1", Some(2)).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].post_id, "p2");
    }

    #[tokio::test]
    async fn test_replace_drops_previous_members() {
        let store = CandidateStore::new(Arc::new(InMemoryStore::new()));
        store.set_candidates("u1", &pool(), 3600).await.unwrap();
        store
            .set_candidates("u1", &[CandidateEntry::new("p9", 1.0)], 3600)
            .await
            .unwrap();

        let got = store.get_candidates("u1", None).await.unwrap();
        assert_eq!(got, vec![CandidateEntry::new("p9", 1.0)]);
    }

    #[tokio::test]
    async fn test_non_finite_scores_dropped() {
        let store = CandidateStore::new(Arc::new(InMemoryStore::new()));
        let written = store
            .set_candidates(
                "u1",
                &[
                    CandidateEntry::new("p1", f64::NAN),
                    CandidateEntry::new("p2", 0.3),
                ],
                3600,
            )
            .await
            .unwrap();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let store = CandidateStore::new(Arc::new(InMemoryStore::new()));
        assert!(!store.candidates_exist("u1").await.unwrap());

        store.set_candidates("u1", &pool(), 3600).await.unwrap();
        assert!(store.candidates_exist("u1").await.unwrap());

        store.delete_candidates("u1").await.unwrap();
        assert!(!store.candidates_exist("u1").await.unwrap());
        assert!(store.get_candidates("u1", None).await.unwrap().is_empty());
    }
}
