/// Feed API Handlers
///
/// Ranked feed reads and feed invalidation
use actix_web::{get, post, web, HttpResponse};
use tracing::debug;

use super::{validate_id, HandlerState};
use crate::error::{AppError, Result};
use crate::models::{BatchInvalidateRequest, FeedQuery, UserInvalidation};

/// GET /api/v1/feed/{user_id}?session_id=..&limit=..
#[get("/feed/{user_id}")]
pub async fn get_ranked_feed(
    path: web::Path<String>,
    query: web::Query<FeedQuery>,
    state: web::Data<HandlerState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    validate_id("user_id", &user_id)?;
    validate_id("session_id", &query.session_id)?;

    let config = state.ranker.config();
    let limit = query.limit.unwrap_or(config.default_page_size);
    if limit == 0 || limit > config.max_page_size {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            config.max_page_size
        )));
    }

    debug!(user_id = %user_id, session_id = %query.session_id, limit, "Getting ranked feed");
    let feed = state
        .ranker
        .get_ranked_feed(&user_id, &query.session_id, limit)
        .await;
    Ok(HttpResponse::Ok().json(feed))
}

/// POST /api/v1/feed/{user_id}/invalidate
#[post("/feed/{user_id}/invalidate")]
pub async fn invalidate_feed(
    path: web::Path<String>,
    state: web::Data<HandlerState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    validate_id("user_id", &user_id)?;

    let outcome = state.ranker.invalidate_feed(&user_id).await?;
    Ok(HttpResponse::Ok().json(UserInvalidation {
        user_id,
        version: outcome.version,
        purged: outcome.purged,
    }))
}

/// POST /api/v1/feed/invalidate
///
/// Fan-out invalidation, e.g. for every follower of an author who just posted.
/// Per-user failures are reported in the body rather than failing the batch.
#[post("/feed/invalidate")]
pub async fn batch_invalidate(
    body: web::Json<BatchInvalidateRequest>,
    state: web::Data<HandlerState>,
) -> Result<HttpResponse> {
    for user_id in &body.user_ids {
        validate_id("user_id", user_id)?;
    }
    let batch = state.ranker.invalidate_feeds(&body.user_ids).await;
    Ok(HttpResponse::Ok().json(batch))
}
