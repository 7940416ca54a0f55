//! Unified cache key schema
//!
//! Every component builds its keys here.
//! Key format: v{VERSION}:{entity}:{identifier}[:sub_key]

/// Cache schema version - increment when changing key formats
pub const CACHE_VERSION: u32 = 1;

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    // ============= Engine Keys =============

    /// Engagement counters for one post (hash)
    /// Format: v1:metrics:{post_id}
    pub fn post_metrics(post_id: &str) -> String {
        format!("v{}:metrics:{}", CACHE_VERSION, post_id)
    }

    /// Candidate set for a user (sorted set, score = base score)
    /// Format: v1:candidates:{user_id}
    pub fn candidates(user_id: &str) -> String {
        format!("v{}:candidates:{}", CACHE_VERSION, user_id)
    }

    /// Posts already served in one session (set)
    /// Format: v1:seen:{user_id}:{session_id}
    pub fn seen(user_id: &str, session_id: &str) -> String {
        format!("v{}:seen:{}:{}", CACHE_VERSION, user_id, session_id)
    }

    /// Monotonic feed version counter (integer, never expires)
    /// Format: v1:feed_version:{user_id}
    pub fn feed_version(user_id: &str) -> String {
        format!("v{}:feed_version:{}", CACHE_VERSION, user_id)
    }

    /// Last computed ranked window (JSON string)
    /// Format: v1:window:{user_id}
    pub fn window(user_id: &str) -> String {
        format!("v{}:window:{}", CACHE_VERSION, user_id)
    }

    /// Per-author selection counts for the current assembly pass (hash)
    /// Format: v1:author_count:{user_id}
    pub fn author_count(user_id: &str) -> String {
        format!("v{}:author_count:{}", CACHE_VERSION, user_id)
    }

    // ============= Upstream Signal Keys =============

    /// Interaction history of a user with each author (hash author -> JSON)
    pub fn affinity(user_id: &str) -> String {
        format!("v{}:signals:affinity:{}", CACHE_VERSION, user_id)
    }

    /// Author engagement-rate EMA (hash author -> float)
    pub fn author_quality() -> String {
        format!("v{}:signals:author_quality", CACHE_VERSION)
    }

    /// Hides and reports a user filed against posts (hash post -> JSON)
    pub fn negative_feedback(user_id: &str) -> String {
        format!("v{}:signals:negative:{}", CACHE_VERSION, user_id)
    }

    /// Posts carrying a trending hashtag (set)
    pub fn trending_posts() -> String {
        format!("v{}:signals:trending_posts", CACHE_VERSION)
    }

    /// Authors sharing mutual followers with a user (set)
    pub fn mutual_authors(user_id: &str) -> String {
        format!("v{}:signals:mutual:{}", CACHE_VERSION, user_id)
    }

    // ============= Utility =============

    /// Extract entity type from key
    pub fn entity_type(key: &str) -> Option<&str> {
        // Format: v{N}:{entity}:...
        let mut parts = key.split(':');
        match (parts.next(), parts.next()) {
            (Some(_), Some(entity)) => Some(entity),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seen_key_is_session_scoped() {
        assert_eq!(CacheKey::seen("u1", "s1"), "v1:seen:u1:s1");
        assert_ne!(CacheKey::seen("u1", "s1"), CacheKey::seen("u1", "s2"));
    }

    #[test]
    fn test_user_keys() {
        assert_eq!(CacheKey::candidates("u1"), "v1:candidates:u1");
        assert_eq!(CacheKey::feed_version("u1"), "v1:feed_version:u1");
        assert_eq!(CacheKey::window("u1"), "v1:window:u1");
        assert_eq!(CacheKey::author_count("u1"), "v1:author_count:u1");
    }

    #[test]
    fn test_entity_type() {
        assert_eq!(CacheKey::entity_type("v1:metrics:p1"), Some("metrics"));
        assert_eq!(
            CacheKey::entity_type(&CacheKey::affinity("u1")),
            Some("signals")
        );
        assert_eq!(CacheKey::entity_type("invalid"), None);
    }
}
