/// Ingest API Handlers
///
/// Write side used by upstream producers: candidate pools, post metrics and
/// engagement counters
use actix_web::{delete, post, put, web, HttpResponse};
use feed_cache::PostMetrics;
use tracing::info;

use super::{validate_id, HandlerState};
use crate::error::{AppError, Result};
use crate::models::{
    EngagementRequest, EngagementResponse, SetCandidatesRequest, SetCandidatesResponse,
    SetMetricsRequest,
};

/// A zero TTL would expire the entry before anyone could read it
fn validate_ttl(ttl_secs: Option<u64>) -> Result<()> {
    if ttl_secs == Some(0) {
        return Err(AppError::BadRequest("ttl_secs must be positive".to_string()));
    }
    Ok(())
}

/// PUT /api/v1/candidates/{user_id}
#[put("/candidates/{user_id}")]
pub async fn put_candidates(
    path: web::Path<String>,
    body: web::Json<SetCandidatesRequest>,
    state: web::Data<HandlerState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    validate_id("user_id", &user_id)?;
    for entry in &body.candidates {
        validate_id("post_id", &entry.post_id)?;
    }

    validate_ttl(body.ttl_secs)?;
    let ttl = body
        .ttl_secs
        .unwrap_or(state.ranker.config().candidate_ttl_secs);
    let stored = state
        .ranker
        .candidate_store()
        .set_candidates(&user_id, &body.candidates, ttl)
        .await?;

    info!(user_id = %user_id, stored, "Candidate pool replaced");
    Ok(HttpResponse::Ok().json(SetCandidatesResponse { user_id, stored }))
}

/// DELETE /api/v1/candidates/{user_id}
#[delete("/candidates/{user_id}")]
pub async fn delete_candidates(
    path: web::Path<String>,
    state: web::Data<HandlerState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    validate_id("user_id", &user_id)?;

    state
        .ranker
        .candidate_store()
        .delete_candidates(&user_id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// PUT /api/v1/posts/{post_id}/metrics
#[put("/posts/{post_id}/metrics")]
pub async fn put_post_metrics(
    path: web::Path<String>,
    body: web::Json<SetMetricsRequest>,
    state: web::Data<HandlerState>,
) -> Result<HttpResponse> {
    let post_id = path.into_inner();
    validate_id("post_id", &post_id)?;
    validate_id("author_id", &body.author_id)?;
    if body.likes < 0 || body.comments < 0 || body.reshares < 0 {
        return Err(AppError::BadRequest(
            "engagement counts must not be negative".to_string(),
        ));
    }

    validate_ttl(body.ttl_secs)?;

    let body = body.into_inner();
    let ttl = body
        .ttl_secs
        .unwrap_or(state.ranker.config().metrics_ttl_secs);
    let metrics = PostMetrics {
        post_id,
        likes: body.likes,
        comments: body.comments,
        reshares: body.reshares,
        author_id: body.author_id,
        created_at: body.created_at,
    };
    state
        .ranker
        .metrics_cache()
        .set_metrics(&metrics, ttl)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/v1/posts/{post_id}/engagement
///
/// Bumps one counter in place. Posts without cached metrics are left
/// alone and reported with `applied: false`.
#[post("/posts/{post_id}/engagement")]
pub async fn record_engagement(
    path: web::Path<String>,
    body: web::Json<EngagementRequest>,
    state: web::Data<HandlerState>,
) -> Result<HttpResponse> {
    let post_id = path.into_inner();
    validate_id("post_id", &post_id)?;

    let value = state
        .ranker
        .metrics_cache()
        .increment_metric(&post_id, body.field, body.delta)
        .await?;
    Ok(HttpResponse::Ok().json(EngagementResponse {
        post_id,
        field: body.field,
        value,
        applied: value.is_some(),
    }))
}
