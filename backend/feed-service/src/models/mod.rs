use chrono::{DateTime, Utc};
use feed_cache::{CandidateEntry, MetricField};
use serde::{Deserialize, Serialize};

/// One ranked post as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub post_id: String,
    pub score: f64,
}

/// Where a page of the feed came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    /// Served from a cached ranked window
    Window,
    /// Freshly scored and sampled
    Computed,
    /// Nothing left to serve
    Empty,
}

impl FeedSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedSource::Window => "window",
            FeedSource::Computed => "computed",
            FeedSource::Empty => "empty",
        }
    }
}

/// Response of `GetRankedFeed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedFeed {
    pub user_id: String,
    pub session_id: String,
    pub items: Vec<FeedItem>,
    /// Feed version the page was ranked under; `None` when it could not be read
    pub feed_version: Option<u64>,
    pub source: FeedSource,
    /// Some cache read or write failed; the page is still usable
    pub degraded: bool,
}

/// Outcome of invalidating one user's feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInvalidation {
    pub user_id: String,
    pub version: u64,
    pub purged: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchInvalidation {
    pub invalidated: Vec<UserInvalidation>,
    pub failed: Vec<String>,
}

// ============= HTTP payloads =============

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub session_id: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct BatchInvalidateRequest {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetCandidatesRequest {
    pub candidates: Vec<CandidateEntry>,
    /// Overrides the configured candidate TTL
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SetCandidatesResponse {
    pub user_id: String,
    pub stored: usize,
}

#[derive(Debug, Deserialize)]
pub struct SetMetricsRequest {
    pub likes: i64,
    pub comments: i64,
    pub reshares: i64,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct EngagementRequest {
    pub field: MetricField,
    #[serde(default = "default_delta")]
    pub delta: i64,
}

fn default_delta() -> i64 {
    1
}

#[derive(Debug, Serialize)]
pub struct EngagementResponse {
    pub post_id: String,
    pub field: MetricField,
    /// New counter value; `None` when the post's metrics were not cached
    pub value: Option<i64>,
    pub applied: bool,
}
