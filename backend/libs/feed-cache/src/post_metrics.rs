//! Per-post engagement counters
//!
//! An eventually-consistent mirror of the source-of-truth store. Records are
//! warmed wholesale and then bumped in place by engagement events; readers
//! must tolerate misses and stale counts.

use crate::{ttl_with_jitter, CacheError, CacheKey, CacheMetrics, CacheResult, KeyValueStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

const FIELD_AUTHOR: &str = "author_id";
const FIELD_CREATED_AT: &str = "created_at_ms";

/// Cached engagement snapshot of one post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMetrics {
    pub post_id: String,
    pub likes: i64,
    pub comments: i64,
    pub reshares: i64,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
}

/// Counter fields that engagement events may increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    Likes,
    Comments,
    Reshares,
}

impl MetricField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricField::Likes => "likes",
            MetricField::Comments => "comments",
            MetricField::Reshares => "reshares",
        }
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricField {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "likes" => Ok(MetricField::Likes),
            "comments" => Ok(MetricField::Comments),
            "reshares" => Ok(MetricField::Reshares),
            other => Err(CacheError::InvalidData(format!(
                "unknown metric field: {}",
                other
            ))),
        }
    }
}

impl PostMetrics {
    fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            (MetricField::Likes.to_string(), self.likes.to_string()),
            (MetricField::Comments.to_string(), self.comments.to_string()),
            (MetricField::Reshares.to_string(), self.reshares.to_string()),
            (FIELD_AUTHOR.to_string(), self.author_id.clone()),
            (
                FIELD_CREATED_AT.to_string(),
                self.created_at.timestamp_millis().to_string(),
            ),
        ]
    }

    /// Rebuild from hash fields; `None` when the record is incomplete
    fn from_fields(post_id: &str, fields: &HashMap<String, String>) -> Option<Self> {
        let counter = |field: MetricField| -> Option<i64> {
            fields.get(field.as_str())?.parse().ok()
        };

        let created_ms: i64 = fields.get(FIELD_CREATED_AT)?.parse().ok()?;

        Some(Self {
            post_id: post_id.to_string(),
            likes: counter(MetricField::Likes)?,
            comments: counter(MetricField::Comments)?,
            reshares: counter(MetricField::Reshares)?,
            author_id: fields.get(FIELD_AUTHOR)?.clone(),
            created_at: DateTime::from_timestamp_millis(created_ms)?,
        })
    }
}

/// Metrics cache operations
#[derive(Clone)]
pub struct MetricsCache {
    store: Arc<dyn KeyValueStore>,
    metrics: CacheMetrics,
}

impl MetricsCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            metrics: CacheMetrics::new(),
        }
    }

    /// Overwrite the whole record, as when warming from the source of truth.
    /// The TTL gets 0-10% jitter.
    pub async fn set_metrics(&self, metrics: &PostMetrics, ttl_secs: u64) -> CacheResult<()> {
        let key = CacheKey::post_metrics(&metrics.post_id);
        self.store
            .hash_replace(&key, &metrics.to_fields(), ttl_with_jitter(ttl_secs))
            .await?;
        self.metrics.record_write(&key);
        Ok(())
    }

    pub async fn get_metrics(&self, post_id: &str) -> CacheResult<Option<PostMetrics>> {
        let key = CacheKey::post_metrics(post_id);
        let fields = self.store.hash_get_all(&key).await.map_err(|e| {
            self.metrics.record_error(&key, "read");
            e
        })?;
        Ok(self.decode(&key, post_id, &fields))
    }

    /// Fetch many records in one round-trip; misses are simply absent
    pub async fn get_many(&self, post_ids: &[String]) -> CacheResult<HashMap<String, PostMetrics>> {
        let keys: Vec<String> = post_ids.iter().map(|id| CacheKey::post_metrics(id)).collect();
        let rows = self.store.hash_get_all_many(&keys).await.map_err(|e| {
            if let Some(key) = keys.first() {
                self.metrics.record_error(key, "read");
            }
            e
        })?;

        Ok(post_ids
            .iter()
            .zip(keys.iter())
            .zip(rows.iter())
            .filter_map(|((post_id, key), fields)| {
                self.decode(key, post_id, fields)
                    .map(|m| (post_id.clone(), m))
            })
            .collect())
    }

    /// Atomically bump one counter in place.
    ///
    /// Returns the new value, or `None` when no record is cached: an
    /// increment never creates a partial record.
    pub async fn increment_metric(
        &self,
        post_id: &str,
        field: MetricField,
        delta: i64,
    ) -> CacheResult<Option<i64>> {
        let key = CacheKey::post_metrics(post_id);
        let value = self
            .store
            .hash_incr_existing(&key, field.as_str(), delta)
            .await?;

        match value {
            Some(v) => {
                self.metrics.record_write(&key);
                debug!(post_id, field = %field, value = v, "Metric incremented");
            }
            None => {
                self.metrics.record_miss(&key);
                debug!(post_id, field = %field, "Metric increment dropped, record not cached");
            }
        }
        Ok(value)
    }

    fn decode(
        &self,
        key: &str,
        post_id: &str,
        fields: &HashMap<String, String>,
    ) -> Option<PostMetrics> {
        if fields.is_empty() {
            self.metrics.record_miss(key);
            return None;
        }
        match PostMetrics::from_fields(post_id, fields) {
            Some(m) => {
                self.metrics.record_hit(key);
                Some(m)
            }
            None => {
                warn!(key = %key, "Incomplete metrics record treated as miss");
                self.metrics.record_error(key, "decode");
                None
            }
        }
    }
}
