/// Feed Ranker
///
/// Assembles one page of a user's feed:
///
/// 1. Serve from the cached ranked window when it was built under the
///    current feed version and still has enough unseen posts
/// 2. Otherwise take the top-N candidates, drop posts seen this session,
///    join cached metrics and upstream signals, score, then diversify and
///    sample a new window
/// 3. Write the window (only if the version did not move meanwhile), mark
///    the page seen and bump per-author counts
///
/// Cache failures never fail the request; they turn into misses and set
/// `degraded` on the response.
use super::diversity::{Diversifier, Selection};
use super::random::{RandomSource, ThreadRandom};
use super::scoring::{CandidateSignals, ScoringEngine};
use super::signals::{SignalProvider, StoreSignalProvider};
use crate::config::{MetricsMissPolicy, RankingConfig};
use crate::metrics;
use crate::models::{BatchInvalidation, FeedItem, FeedSource, RankedFeed, UserInvalidation};
use chrono::{DateTime, Utc};
use feed_cache::{
    AuthorCountStore, CacheError, CandidateEntry, CandidateStore, FeedVersionController,
    Invalidation, KeyValueStore, MetricsCache, PostMetrics, RankedWindow, RankedWindowCache,
    SeenPostTracker, WindowItem,
};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct FeedRanker {
    config: Arc<RankingConfig>,
    candidates: CandidateStore,
    metrics: MetricsCache,
    seen: SeenPostTracker,
    versions: FeedVersionController,
    windows: RankedWindowCache,
    author_counts: AuthorCountStore,
    signals: Arc<dyn SignalProvider>,
    scorer: ScoringEngine,
    diversifier: Diversifier,
    rng: Arc<dyn RandomSource>,
}

/// Mutable per-request bookkeeping
struct Pass<'a> {
    user_id: &'a str,
    degraded: bool,
}

impl Pass<'_> {
    /// Turn a failed cache read into `fallback` and remember the failure
    fn or_miss<T>(&mut self, what: &str, result: Result<T, CacheError>, fallback: T) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "Cache read failed ({}), treating as miss", what);
                self.degraded = true;
                fallback
            }
        }
    }

    fn write_failed(&mut self, what: &str, result: Result<(), CacheError>) {
        if let Err(e) = result {
            warn!(user_id = %self.user_id, error = %e, "Cache write failed ({})", what);
            self.degraded = true;
        }
    }
}

impl FeedRanker {
    /// Ranker over `store` with store-backed signals and thread-local randomness
    pub fn new(store: Arc<dyn KeyValueStore>, config: RankingConfig) -> Self {
        let config = Arc::new(config);
        Self {
            candidates: CandidateStore::new(store.clone()),
            metrics: MetricsCache::new(store.clone()),
            seen: SeenPostTracker::new(store.clone()),
            versions: FeedVersionController::new(store.clone()),
            windows: RankedWindowCache::new(store.clone()),
            author_counts: AuthorCountStore::new(store.clone()),
            signals: Arc::new(StoreSignalProvider::new(store)),
            scorer: ScoringEngine::new(config.clone()),
            diversifier: Diversifier::from_config(&config),
            rng: Arc::new(ThreadRandom),
            config,
        }
    }

    pub fn with_random(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_signals(mut self, signals: Arc<dyn SignalProvider>) -> Self {
        self.signals = signals;
        self
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn candidate_store(&self) -> &CandidateStore {
        &self.candidates
    }

    pub fn metrics_cache(&self) -> &MetricsCache {
        &self.metrics
    }

    pub fn seen_tracker(&self) -> &SeenPostTracker {
        &self.seen
    }

    pub fn version_controller(&self) -> &FeedVersionController {
        &self.versions
    }

    /// `GetRankedFeed`: one page of at most `page_size` posts, none of them
    /// already served in this session
    pub async fn get_ranked_feed(
        &self,
        user_id: &str,
        session_id: &str,
        page_size: usize,
    ) -> RankedFeed {
        let page_size = page_size.clamp(1, self.config.max_page_size.max(1));
        let mut pass = Pass {
            user_id,
            degraded: false,
        };

        let version = match self.versions.get_version(user_id).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(user_id, error = %e, "Feed version unreadable, bypassing window");
                pass.degraded = true;
                None
            }
        };
        let seen = self.seen.get_seen(user_id, session_id).await;
        let seen = pass.or_miss("seen", seen, HashSet::new());

        if let Some(current) = version {
            let window = self.windows.get_window(user_id).await;
            if let Some(window) = pass.or_miss("window", window, None) {
                if let Some(items) = page_from_window(&window, current, &seen, page_size) {
                    debug!(user_id, feed_version = current, "Serving page from ranked window");
                    let authors = self.authors_of(&mut pass, &items).await;
                    self.finish_page(&mut pass, session_id, &items, &authors)
                        .await;
                    return self.respond(pass, session_id, items, version, FeedSource::Window);
                }
                if !window.is_current(current) {
                    debug!(
                        user_id,
                        window_version = window.feed_version,
                        feed_version = current,
                        "Ranked window is stale"
                    );
                }
            }
        }

        let started = Instant::now();
        let Some(selection) = self.rank(&mut pass, &seen).await else {
            return self.respond(pass, session_id, Vec::new(), version, FeedSource::Empty);
        };

        let window_items: Vec<WindowItem> = selection
            .posts
            .iter()
            .map(|p| WindowItem {
                post_id: p.post_id.clone(),
                score: p.score,
            })
            .collect();

        if let Some(computed_under) = version {
            self.store_window(&mut pass, computed_under, window_items)
                .await;
        }

        let page: Vec<FeedItem> = selection
            .posts
            .iter()
            .take(page_size)
            .map(|p| FeedItem {
                post_id: p.post_id.clone(),
                score: p.score,
            })
            .collect();
        let page_authors: HashMap<String, String> = selection
            .posts
            .iter()
            .take(page_size)
            .filter_map(|p| Some((p.post_id.clone(), p.author_id.clone()?)))
            .collect();

        self.finish_page(&mut pass, session_id, &page, &page_authors)
            .await;

        info!(
            user_id,
            selected = selection.posts.len(),
            served = page.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            degraded = pass.degraded,
            "Ranked feed computed"
        );
        self.respond(pass, session_id, page, version, FeedSource::Computed)
    }

    /// Score and sample a new window; `None` when nothing is left to rank
    async fn rank(&self, pass: &mut Pass<'_>, seen: &HashSet<String>) -> Option<Selection> {
        let user_id = pass.user_id;
        let started = Instant::now();

        let pool = self
            .candidates
            .get_candidates(user_id, Some(self.config.candidate_limit))
            .await;
        let pool: Vec<CandidateEntry> = pass
            .or_miss("candidates", pool, Vec::new())
            .into_iter()
            .filter(|c| !seen.contains(&c.post_id))
            .collect();
        if pool.is_empty() {
            debug!(user_id, "No unseen candidates");
            return None;
        }

        let post_ids: Vec<String> = pool.iter().map(|c| c.post_id.clone()).collect();
        let cached = self.metrics.get_many(&post_ids).await;
        let cached = pass.or_miss("metrics", cached, HashMap::new());

        let now = Utc::now();
        let mut inputs = Vec::with_capacity(pool.len());
        let mut skipped = 0usize;
        for entry in pool {
            match cached.get(&entry.post_id) {
                Some(m) => inputs.push(signals_from_metrics(entry.post_id, m, now)),
                None => match self.config.metrics_miss_policy {
                    MetricsMissPolicy::Skip => skipped += 1,
                    MetricsMissPolicy::Conservative => inputs.push(CandidateSignals {
                        post_id: entry.post_id,
                        ..Default::default()
                    }),
                },
            }
        }
        if skipped > 0 {
            debug!(user_id, skipped, "Candidates without cached metrics skipped");
        }
        if inputs.is_empty() {
            return None;
        }

        let post_ids: Vec<String> = inputs.iter().map(|c| c.post_id.clone()).collect();
        let author_ids: Vec<String> = inputs
            .iter()
            .filter_map(|c| c.author_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let signals = self.signals.load(user_id, &post_ids, &author_ids).await;
        pass.degraded |= signals.degraded;

        for input in inputs.iter_mut() {
            let author = input.author_id.as_deref();
            input.affinity = signals.affinity_for(author);
            input.author_quality = signals.quality_for(author);
            input.negative = signals.negative_for(&input.post_id);
            input.context = signals.context_for(&input.post_id, author);
        }

        let scored_count = inputs.len();
        let scored = self.scorer.score_all(inputs, self.rng.as_ref());

        let prior = self.author_counts.get_counts(user_id).await;
        let prior = pass.or_miss("author counts", prior, HashMap::new());

        let selection =
            self.diversifier
                .select(scored, self.config.window_size, &prior, self.rng.as_ref());
        metrics::observe_ranking(started.elapsed(), scored_count);
        Some(selection)
    }

    /// Write a computed window unless an invalidation landed mid-pass
    async fn store_window(&self, pass: &mut Pass<'_>, computed_under: u64, items: Vec<WindowItem>) {
        let user_id = pass.user_id;
        match self.versions.get_version(user_id).await {
            Ok(now) if now == computed_under => {
                let window = RankedWindow::new(computed_under, items);
                let written = self
                    .windows
                    .set_window(user_id, &window, self.config.window_ttl_secs)
                    .await;
                pass.write_failed("window", written);
            }
            Ok(now) => {
                debug!(
                    user_id,
                    computed_under,
                    current = now,
                    "Feed invalidated during ranking, window not cached"
                );
                metrics::record_window_write_skipped();
            }
            Err(e) => {
                warn!(user_id, error = %e, "Feed version unreadable, window not cached");
                pass.degraded = true;
            }
        }
    }

    /// Look up authors for posts served from a window
    async fn authors_of(&self, pass: &mut Pass<'_>, items: &[FeedItem]) -> HashMap<String, String> {
        let ids: Vec<String> = items.iter().map(|i| i.post_id.clone()).collect();
        let cached = self.metrics.get_many(&ids).await;
        pass.or_miss("metrics", cached, HashMap::new())
            .into_iter()
            .map(|(post_id, m)| (post_id, m.author_id))
            .collect()
    }

    /// Mark the page seen and count its authors
    async fn finish_page(
        &self,
        pass: &mut Pass<'_>,
        session_id: &str,
        items: &[FeedItem],
        authors: &HashMap<String, String>,
    ) {
        if items.is_empty() {
            return;
        }
        let user_id = pass.user_id;
        let ids: Vec<String> = items.iter().map(|i| i.post_id.clone()).collect();

        let mut served: HashMap<String, u32> = HashMap::new();
        for id in &ids {
            if let Some(author) = authors.get(id) {
                *served.entry(author.clone()).or_insert(0) += 1;
            }
        }

        let (seen, counted) = tokio::join!(
            self.seen
                .add_seen(user_id, session_id, &ids, self.config.seen_ttl_secs),
            self.author_counts
                .record(user_id, &served, self.config.author_count_ttl_secs),
        );
        pass.write_failed("seen", seen);
        pass.write_failed("author counts", counted);
    }

    fn respond(
        &self,
        pass: Pass<'_>,
        session_id: &str,
        items: Vec<FeedItem>,
        feed_version: Option<u64>,
        source: FeedSource,
    ) -> RankedFeed {
        metrics::record_feed_request(source.as_str());
        if pass.degraded {
            metrics::record_degraded();
        }
        RankedFeed {
            user_id: pass.user_id.to_string(),
            session_id: session_id.to_string(),
            items,
            feed_version,
            source,
            degraded: pass.degraded,
        }
    }

    /// `InvalidateFeed`: bump the version and drop cached candidates and
    /// window. Fails only when the version could not be bumped.
    pub async fn invalidate_feed(&self, user_id: &str) -> Result<Invalidation, CacheError> {
        match self.versions.invalidate(user_id).await {
            Ok(outcome) => {
                metrics::record_invalidation(if outcome.purged {
                    "purged"
                } else {
                    "version_only"
                });
                Ok(outcome)
            }
            Err(e) => {
                warn!(user_id, error = %e, "Feed invalidation failed");
                metrics::record_invalidation("failed");
                Err(e)
            }
        }
    }

    /// Invalidate many feeds concurrently, e.g. all followers of a new post's author
    pub async fn invalidate_feeds(&self, user_ids: &[String]) -> BatchInvalidation {
        let mut unique = HashSet::new();
        let targets: Vec<&String> = user_ids.iter().filter(|u| unique.insert(*u)).collect();

        let results = join_all(targets.iter().map(|u| self.invalidate_feed(u))).await;

        let mut batch = BatchInvalidation::default();
        for (user_id, result) in targets.into_iter().zip(results) {
            match result {
                Ok(outcome) => batch.invalidated.push(UserInvalidation {
                    user_id: user_id.clone(),
                    version: outcome.version,
                    purged: outcome.purged,
                }),
                Err(_) => batch.failed.push(user_id.clone()),
            }
        }
        info!(
            invalidated = batch.invalidated.len(),
            failed = batch.failed.len(),
            "Batch feed invalidation finished"
        );
        batch
    }
}

/// Next page from a window built under `current`, or `None` when the
/// window is stale or cannot fill a whole page
fn page_from_window(
    window: &RankedWindow,
    current: u64,
    seen: &HashSet<String>,
    page_size: usize,
) -> Option<Vec<FeedItem>> {
    if !window.is_current(current) {
        return None;
    }
    let page: Vec<FeedItem> = window
        .items
        .iter()
        .filter(|item| !seen.contains(&item.post_id))
        .take(page_size)
        .map(|item| FeedItem {
            post_id: item.post_id.clone(),
            score: item.score,
        })
        .collect();
    (page.len() == page_size).then_some(page)
}

fn signals_from_metrics(post_id: String, m: &PostMetrics, now: DateTime<Utc>) -> CandidateSignals {
    let age_hours = (now - m.created_at).num_milliseconds() as f64 / 3_600_000.0;
    CandidateSignals {
        post_id,
        author_id: Some(m.author_id.clone()),
        likes: m.likes,
        comments: m.comments,
        reshares: m.reshares,
        age_hours: Some(age_hours),
        ..Default::default()
    }
}
