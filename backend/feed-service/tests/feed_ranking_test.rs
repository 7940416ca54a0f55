use async_trait::async_trait;
use chrono::{Duration, Utc};
use feed_cache::{
    AuthorCountStore, CandidateEntry, CandidateStore, FeedVersionController, InMemoryStore,
    KeyValueStore, MetricsCache, PostMetrics, RankedWindow, RankedWindowCache, WindowItem,
};
use feed_service::config::{MetricsMissPolicy, RankingConfig};
use feed_service::models::FeedSource;
use feed_service::services::{SeededRandom, SignalProvider, UserSignals};
use feed_service::FeedRanker;
use std::collections::HashSet;
use std::sync::Arc;

const USER: &str = "user-1";

fn config() -> RankingConfig {
    RankingConfig {
        // Constant recency keeps scores independent of wall-clock time
        recency_decay: 0.0,
        ..RankingConfig::default()
    }
}

/// `count` candidates spread over `authors` authors, all with cached metrics
async fn seed_user(store: &Arc<InMemoryStore>, user_id: &str, count: usize, authors: usize) {
    let candidates = CandidateStore::new(store.clone());
    let metrics = MetricsCache::new(store.clone());

    let entries: Vec<CandidateEntry> = (0..count)
        .map(|i| CandidateEntry::new(format!("post-{}", i), (count - i) as f64))
        .collect();
    candidates
        .set_candidates(user_id, &entries, 3600)
        .await
        .unwrap();

    for i in 0..count {
        metrics
            .set_metrics(
                &PostMetrics {
                    post_id: format!("post-{}", i),
                    likes: (i * 3) as i64,
                    comments: i as i64,
                    reshares: 0,
                    author_id: format!("author-{}", i % authors),
                    created_at: Utc::now() - Duration::hours(2),
                },
                3600,
            )
            .await
            .unwrap();
    }
}

fn ids(feed: &feed_service::models::RankedFeed) -> Vec<String> {
    feed.items.iter().map(|i| i.post_id.clone()).collect()
}

#[tokio::test]
async fn first_request_computes_then_window_serves() {
    let store = Arc::new(InMemoryStore::new());
    seed_user(&store, USER, 30, 6).await;
    let ranker = FeedRanker::new(store.clone(), config());

    let first = ranker.get_ranked_feed(USER, "s1", 10).await;
    assert_eq!(first.source, FeedSource::Computed);
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.feed_version, Some(0));
    assert!(!first.degraded);

    let window = RankedWindowCache::new(store.clone())
        .get_window(USER)
        .await
        .unwrap()
        .expect("window cached after compute");
    assert_eq!(window.feed_version, 0);
    assert_eq!(window.len(), 30);

    let second = ranker.get_ranked_feed(USER, "s1", 10).await;
    assert_eq!(second.source, FeedSource::Window);
    assert_eq!(second.items.len(), 10);
}

#[tokio::test]
async fn pages_in_one_session_never_repeat() {
    let store = Arc::new(InMemoryStore::new());
    seed_user(&store, USER, 30, 6).await;
    let ranker = FeedRanker::new(store.clone(), config());

    let mut served = HashSet::new();
    for _ in 0..3 {
        let page = ranker.get_ranked_feed(USER, "s1", 10).await;
        assert_eq!(page.items.len(), 10);
        for id in ids(&page) {
            assert!(served.insert(id), "post served twice in one session");
        }
    }

    // Everything has been seen
    let exhausted = ranker.get_ranked_feed(USER, "s1", 10).await;
    assert_eq!(exhausted.source, FeedSource::Empty);
    assert!(exhausted.items.is_empty());

    // Seen state is per session
    let other = ranker.get_ranked_feed(USER, "s2", 10).await;
    assert_eq!(other.items.len(), 10);
}

#[tokio::test]
async fn short_window_falls_back_to_recompute() {
    let store = Arc::new(InMemoryStore::new());
    seed_user(&store, USER, 15, 5).await;
    let ranker = FeedRanker::new(store.clone(), config());

    ranker.get_ranked_feed(USER, "s1", 10).await;
    // Only 5 unseen posts remain in the window, fewer than a page
    let rest = ranker.get_ranked_feed(USER, "s1", 10).await;
    assert_eq!(rest.source, FeedSource::Computed);
    assert_eq!(rest.items.len(), 5);
}

#[tokio::test]
async fn invalidation_stales_window_and_purges_pool() {
    let store = Arc::new(InMemoryStore::new());
    seed_user(&store, USER, 30, 6).await;
    let ranker = FeedRanker::new(store.clone(), config());

    ranker.get_ranked_feed(USER, "s1", 10).await;
    let outcome = ranker.invalidate_feed(USER).await.unwrap();
    assert_eq!(outcome.version, 1);
    assert!(outcome.purged);

    assert!(RankedWindowCache::new(store.clone())
        .get_window(USER)
        .await
        .unwrap()
        .is_none());

    // Pool is gone until upstream repopulates it
    let empty = ranker.get_ranked_feed(USER, "s1", 10).await;
    assert_eq!(empty.source, FeedSource::Empty);

    seed_user(&store, USER, 30, 6).await;
    let fresh = ranker.get_ranked_feed(USER, "s1", 10).await;
    assert_eq!(fresh.source, FeedSource::Computed);
    assert_eq!(fresh.feed_version, Some(1));
}

#[tokio::test]
async fn window_from_older_version_is_not_served() {
    let store = Arc::new(InMemoryStore::new());
    seed_user(&store, USER, 30, 6).await;

    // Window built before a version bump that failed to delete it
    let stale = RankedWindow::new(
        0,
        (0..30)
            .map(|i| WindowItem {
                post_id: format!("post-{}", i),
                score: 1.0,
            })
            .collect(),
    );
    RankedWindowCache::new(store.clone())
        .set_window(USER, &stale, 45)
        .await
        .unwrap();
    FeedVersionController::new(store.clone())
        .increment_version(USER)
        .await
        .unwrap();

    let ranker = FeedRanker::new(store.clone(), config());
    let page = ranker.get_ranked_feed(USER, "s1", 10).await;
    assert_eq!(page.source, FeedSource::Computed);
    assert_eq!(page.feed_version, Some(1));

    let rewritten = RankedWindowCache::new(store.clone())
        .get_window(USER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rewritten.feed_version, 1);
}

/// Bumps the feed version while ranking is in flight
struct InvalidatingSignals {
    versions: FeedVersionController,
}

#[async_trait]
impl SignalProvider for InvalidatingSignals {
    async fn load(&self, user_id: &str, _: &[String], _: &[String]) -> UserSignals {
        self.versions.increment_version(user_id).await.unwrap();
        UserSignals::default()
    }
}

#[tokio::test]
async fn window_not_cached_when_invalidated_mid_pass() {
    let store = Arc::new(InMemoryStore::new());
    seed_user(&store, USER, 30, 6).await;
    let ranker = FeedRanker::new(store.clone(), config()).with_signals(Arc::new(
        InvalidatingSignals {
            versions: FeedVersionController::new(store.clone()),
        },
    ));

    let page = ranker.get_ranked_feed(USER, "s1", 10).await;
    assert_eq!(page.source, FeedSource::Computed);
    assert_eq!(page.items.len(), 10);
    assert_eq!(page.feed_version, Some(0));

    assert!(RankedWindowCache::new(store.clone())
        .get_window(USER)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn store_outage_degrades_instead_of_failing() {
    let store = Arc::new(InMemoryStore::new());
    seed_user(&store, USER, 30, 6).await;
    let ranker = FeedRanker::new(store.clone(), config());

    store.set_unavailable(true);
    let page = ranker.get_ranked_feed(USER, "s1", 10).await;
    assert!(page.degraded);
    assert_eq!(page.feed_version, None);
    assert_eq!(page.source, FeedSource::Empty);

    store.set_unavailable(false);
    let recovered = ranker.get_ranked_feed(USER, "s1", 10).await;
    assert!(!recovered.degraded);
    assert_eq!(recovered.items.len(), 10);
}

struct UnavailableSignals;

#[async_trait]
impl SignalProvider for UnavailableSignals {
    async fn load(&self, _: &str, _: &[String], _: &[String]) -> UserSignals {
        UserSignals {
            degraded: true,
            ..Default::default()
        }
    }
}

#[tokio::test]
async fn missing_signals_still_rank() {
    let store = Arc::new(InMemoryStore::new());
    seed_user(&store, USER, 30, 6).await;
    let ranker = FeedRanker::new(store.clone(), config()).with_signals(Arc::new(UnavailableSignals));

    let page = ranker.get_ranked_feed(USER, "s1", 10).await;
    assert_eq!(page.items.len(), 10);
    assert!(page.degraded);
}

#[tokio::test]
async fn same_seed_same_order() {
    let mut orders = Vec::new();
    for _ in 0..2 {
        let store = Arc::new(InMemoryStore::new());
        seed_user(&store, USER, 20, 5).await;
        let ranker = FeedRanker::new(store.clone(), config())
            .with_random(Arc::new(SeededRandom::new(7)));
        orders.push(ids(&ranker.get_ranked_feed(USER, "s1", 20).await));
    }
    assert_eq!(orders[0], orders[1]);
}

#[tokio::test]
async fn different_seeds_explore() {
    let mut distinct = HashSet::new();
    for seed in 0..32 {
        let store = Arc::new(InMemoryStore::new());
        seed_user(&store, USER, 20, 5).await;
        let ranker = FeedRanker::new(store.clone(), config())
            .with_random(Arc::new(SeededRandom::new(seed)));
        distinct.insert(ids(&ranker.get_ranked_feed(USER, "s1", 20).await));
    }
    assert!(distinct.len() >= 2);
}

#[tokio::test]
async fn metrics_miss_policy() {
    let store = Arc::new(InMemoryStore::new());
    seed_user(&store, USER, 3, 3).await;
    let extra = vec![
        CandidateEntry::new("post-0", 3.0),
        CandidateEntry::new("post-1", 2.0),
        CandidateEntry::new("post-2", 1.0),
        CandidateEntry::new("no-metrics", 10.0),
    ];
    CandidateStore::new(store.clone())
        .set_candidates(USER, &extra, 3600)
        .await
        .unwrap();

    let skip = FeedRanker::new(store.clone(), config());
    let page = skip.get_ranked_feed(USER, "skip", 10).await;
    assert_eq!(page.items.len(), 3);
    assert!(!ids(&page).contains(&"no-metrics".to_string()));

    let conservative = FeedRanker::new(
        store.clone(),
        RankingConfig {
            metrics_miss_policy: MetricsMissPolicy::Conservative,
            ..config()
        },
    );
    // Fresh user so no window from the first ranker is reused
    CandidateStore::new(store.clone())
        .set_candidates("user-2", &extra, 3600)
        .await
        .unwrap();
    let page = conservative.get_ranked_feed("user-2", "cons", 10).await;
    assert_eq!(page.items.len(), 4);
    assert!(ids(&page).contains(&"no-metrics".to_string()));
}

#[tokio::test]
async fn served_authors_are_counted() {
    let store = Arc::new(InMemoryStore::new());
    seed_user(&store, USER, 30, 6).await;
    let ranker = FeedRanker::new(store.clone(), config());

    ranker.get_ranked_feed(USER, "s1", 10).await;
    let counts = AuthorCountStore::new(store.clone())
        .get_counts(USER)
        .await
        .unwrap();
    assert_eq!(counts.values().sum::<u32>(), 10);

    ranker.get_ranked_feed(USER, "s1", 10).await;
    let counts = AuthorCountStore::new(store.clone())
        .get_counts(USER)
        .await
        .unwrap();
    assert_eq!(counts.values().sum::<u32>(), 20);
}

#[tokio::test]
async fn page_size_is_clamped() {
    let store = Arc::new(InMemoryStore::new());
    seed_user(&store, USER, 150, 30).await;
    let ranker = FeedRanker::new(store.clone(), config());

    assert_eq!(ranker.get_ranked_feed(USER, "a", 0).await.items.len(), 1);
    assert_eq!(ranker.get_ranked_feed(USER, "b", 1000).await.items.len(), 100);
}

#[tokio::test]
async fn zero_max_page_size_still_serves_one_post() {
    let store = Arc::new(InMemoryStore::new());
    seed_user(&store, USER, 5, 5).await;
    let ranker = FeedRanker::new(
        store.clone(),
        RankingConfig {
            max_page_size: 0,
            ..config()
        },
    );

    let page = ranker.get_ranked_feed(USER, "s1", 5).await;
    assert_eq!(page.items.len(), 1);
}

#[tokio::test]
async fn batch_invalidation_dedupes_and_reports_failures() {
    let store = Arc::new(InMemoryStore::new());
    let ranker = FeedRanker::new(store.clone(), config());

    let users = vec!["u1".to_string(), "u2".to_string(), "u1".to_string()];
    let batch = ranker.invalidate_feeds(&users).await;
    assert_eq!(batch.invalidated.len(), 2);
    assert!(batch.failed.is_empty());
    assert!(batch.invalidated.iter().all(|u| u.version == 1));

    store.set_unavailable(true);
    let batch = ranker.invalidate_feeds(&users).await;
    assert!(batch.invalidated.is_empty());
    assert_eq!(batch.failed, vec!["u1".to_string(), "u2".to_string()]);
}

#[tokio::test]
async fn unknown_user_gets_empty_feed() {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let ranker = FeedRanker::new(store, config());
    let page = ranker.get_ranked_feed("nobody", "s1", 10).await;
    assert_eq!(page.source, FeedSource::Empty);
    assert!(!page.degraded);
    assert_eq!(page.feed_version, Some(0));
}
