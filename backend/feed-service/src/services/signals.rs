//! Read-only ranking signals maintained upstream
//!
//! Affinity, author quality, negative feedback and context flags are
//! produced by other services. The ranker only reads them and falls back to
//! neutral values when they are missing or unreadable.

use super::scoring::{AffinitySignal, ContextFlags, NegativeFeedback};
use async_trait::async_trait;
use feed_cache::{CacheKey, CacheResult, KeyValueStore};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Signals for one user and one batch of candidates
#[derive(Debug, Clone, Default)]
pub struct UserSignals {
    /// Keyed by author
    pub affinity: HashMap<String, AffinitySignal>,
    /// Keyed by author
    pub author_quality: HashMap<String, f64>,
    /// Keyed by post
    pub negative: HashMap<String, NegativeFeedback>,
    pub trending_posts: HashSet<String>,
    pub mutual_authors: HashSet<String>,
    /// Some signal could not be read and was replaced by neutral values
    pub degraded: bool,
}

impl UserSignals {
    pub fn affinity_for(&self, author_id: Option<&str>) -> AffinitySignal {
        author_id
            .and_then(|a| self.affinity.get(a))
            .copied()
            .unwrap_or_default()
    }

    pub fn quality_for(&self, author_id: Option<&str>) -> f64 {
        author_id
            .and_then(|a| self.author_quality.get(a))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn negative_for(&self, post_id: &str) -> NegativeFeedback {
        self.negative.get(post_id).copied().unwrap_or_default()
    }

    pub fn context_for(&self, post_id: &str, author_id: Option<&str>) -> ContextFlags {
        ContextFlags {
            trending_hashtag: self.trending_posts.contains(post_id),
            mutual_followers: author_id
                .map(|a| self.mutual_authors.contains(a))
                .unwrap_or(false),
        }
    }
}

#[async_trait]
pub trait SignalProvider: Send + Sync {
    /// Never fails; unreadable signals come back neutral with `degraded` set
    async fn load(&self, user_id: &str, post_ids: &[String], author_ids: &[String]) -> UserSignals;
}

/// Reads signals from the shared cache under the `signals` key family
pub struct StoreSignalProvider {
    store: Arc<dyn KeyValueStore>,
}

impl StoreSignalProvider {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    async fn fields(&self, key: &str, fields: &[String]) -> CacheResult<Vec<Option<String>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        self.store.hash_get_fields(key, fields).await
    }

    async fn members(&self, key: &str, members: &[String]) -> CacheResult<HashSet<String>> {
        if members.is_empty() {
            return Ok(HashSet::new());
        }
        let flags = self.store.set_contains_many(key, members).await?;
        Ok(members
            .iter()
            .zip(flags)
            .filter_map(|(m, present)| present.then(|| m.clone()))
            .collect())
    }
}

#[async_trait]
impl SignalProvider for StoreSignalProvider {
    async fn load(&self, user_id: &str, post_ids: &[String], author_ids: &[String]) -> UserSignals {
        let affinity_key = CacheKey::affinity(user_id);
        let quality_key = CacheKey::author_quality();
        let negative_key = CacheKey::negative_feedback(user_id);
        let trending_key = CacheKey::trending_posts();
        let mutual_key = CacheKey::mutual_authors(user_id);

        let (affinity, quality, negative, trending, mutual) = tokio::join!(
            self.fields(&affinity_key, author_ids),
            self.fields(&quality_key, author_ids),
            self.fields(&negative_key, post_ids),
            self.members(&trending_key, post_ids),
            self.members(&mutual_key, author_ids),
        );

        let mut signals = UserSignals::default();

        match affinity {
            Ok(values) => signals.affinity = decode_json(&affinity_key, author_ids, values),
            Err(e) => signals.degrade(&affinity_key, e),
        }
        match quality {
            Ok(values) => {
                signals.author_quality = author_ids
                    .iter()
                    .zip(values)
                    .filter_map(|(author, raw)| {
                        let rate = raw?.parse::<f64>().ok()?;
                        Some((author.clone(), rate))
                    })
                    .collect()
            }
            Err(e) => signals.degrade(&quality_key, e),
        }
        match negative {
            Ok(values) => signals.negative = decode_json(&negative_key, post_ids, values),
            Err(e) => signals.degrade(&negative_key, e),
        }
        match trending {
            Ok(set) => signals.trending_posts = set,
            Err(e) => signals.degrade(&trending_key, e),
        }
        match mutual {
            Ok(set) => signals.mutual_authors = set,
            Err(e) => signals.degrade(&mutual_key, e),
        }

        signals
    }
}

impl UserSignals {
    fn degrade(&mut self, key: &str, error: feed_cache::CacheError) {
        warn!(key = %key, error = %error, "Signal read failed, using neutral values");
        self.degraded = true;
    }
}

fn decode_json<T: DeserializeOwned>(
    key: &str,
    ids: &[String],
    values: Vec<Option<String>>,
) -> HashMap<String, T> {
    ids.iter()
        .zip(values)
        .filter_map(|(id, raw)| {
            let raw = raw?;
            match serde_json::from_str::<T>(&raw) {
                Ok(value) => Some((id.clone(), value)),
                Err(e) => {
                    debug!(key = %key, field = %id, error = %e, "Skipping undecodable signal");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_cache::InMemoryStore;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .hash_replace(
                &CacheKey::affinity("u1"),
                &[(
                    "alice".to_string(),
                    r#"{"past_likes":3,"past_comments":1,"direct_replies":0,"profile_visits":2}"#
                        .to_string(),
                )],
                600,
            )
            .await
            .unwrap();
        store
            .hash_replace(
                &CacheKey::author_quality(),
                &[
                    ("alice".to_string(), "0.4".to_string()),
                    ("bob".to_string(), "oops".to_string()),
                ],
                600,
            )
            .await
            .unwrap();
        store
            .hash_replace(
                &CacheKey::negative_feedback("u1"),
                &[("p2".to_string(), r#"{"hides":1,"reports":2}"#.to_string())],
                600,
            )
            .await
            .unwrap();
        store
            .set_add(&CacheKey::trending_posts(), &ids(&["p1"]), 600)
            .await
            .unwrap();
        store
            .set_add(&CacheKey::mutual_authors("u1"), &ids(&["bob"]), 600)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_load_reads_every_family() {
        let provider = StoreSignalProvider::new(seeded_store().await);
        let signals = provider
            .load("u1", &ids(&["p1", "p2"]), &ids(&["alice", "bob"]))
            .await;

        assert!(!signals.degraded);
        assert_eq!(signals.affinity_for(Some("alice")).past_likes, 3.0);
        assert_eq!(signals.affinity_for(Some("bob")), AffinitySignal::default());
        assert_eq!(signals.quality_for(Some("alice")), 0.4);
        assert_eq!(signals.quality_for(Some("bob")), 0.0);
        assert_eq!(
            signals.negative_for("p2"),
            NegativeFeedback { hides: 1, reports: 2 }
        );
        assert!(signals.context_for("p1", Some("alice")).trending_hashtag);
        assert!(signals.context_for("p2", Some("bob")).mutual_followers);
        assert!(!signals.context_for("p2", None).mutual_followers);
    }

    #[tokio::test]
    async fn test_store_down_gives_neutral_degraded() {
        let store = seeded_store().await;
        store.set_unavailable(true);
        let provider = StoreSignalProvider::new(store);

        let signals = provider.load("u1", &ids(&["p1"]), &ids(&["alice"])).await;
        assert!(signals.degraded);
        assert_eq!(signals.quality_for(Some("alice")), 0.0);
        assert!(!signals.context_for("p1", Some("alice")).trending_hashtag);
    }

    #[tokio::test]
    async fn test_other_user_sees_no_personal_signals() {
        let provider = StoreSignalProvider::new(seeded_store().await);
        let signals = provider.load("u2", &ids(&["p2"]), &ids(&["alice"])).await;
        assert_eq!(signals.negative_for("p2"), NegativeFeedback::default());
        // Global families still apply
        assert_eq!(signals.quality_for(Some("alice")), 0.4);
    }
}
