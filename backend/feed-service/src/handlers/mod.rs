pub mod feed;
pub mod health;
pub mod ingest;

pub use feed::{batch_invalidate, get_ranked_feed, invalidate_feed};
pub use health::{liveness, readiness};
pub use ingest::{delete_candidates, put_candidates, put_post_metrics, record_engagement};

use crate::error::{AppError, Result};
use crate::services::FeedRanker;
use actix_web::web;
use feed_cache::KeyValueStore;
use std::sync::Arc;

const MAX_ID_LEN: usize = 128;

/// Shared state for every handler
pub struct HandlerState {
    pub ranker: Arc<FeedRanker>,
    pub store: Arc<dyn KeyValueStore>,
}

/// Register every `/api/v1` route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(liveness)
            .service(readiness)
            // Before `/feed/{user_id}` so "invalidate" is never taken as a user id
            .service(batch_invalidate)
            .service(get_ranked_feed)
            .service(invalidate_feed)
            .service(put_candidates)
            .service(delete_candidates)
            .service(put_post_metrics)
            .service(record_engagement),
    );
}

/// Ids become part of cache keys, so `:` and whitespace are rejected
pub(crate) fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty", kind)));
    }
    if id.len() > MAX_ID_LEN {
        return Err(AppError::BadRequest(format!(
            "{} longer than {} bytes",
            kind, MAX_ID_LEN
        )));
    }
    if id.contains(':') || id.chars().any(char::is_whitespace) {
        return Err(AppError::BadRequest(format!(
            "{} must not contain ':' or whitespace",
            kind
        )));
    }
    Ok(())
}
