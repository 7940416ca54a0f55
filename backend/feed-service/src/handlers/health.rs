use actix_web::{get, web, HttpResponse};
use tracing::warn;

use super::HandlerState;

/// GET /api/v1/health/live
#[get("/health/live")]
pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// GET /api/v1/health/ready - ready only while the shared cache answers
#[get("/health/ready")]
pub async fn readiness(state: web::Data<HandlerState>) -> HttpResponse {
    match state.store.ping().await {
        Ok(()) => HttpResponse::Ok().body("OK"),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            HttpResponse::ServiceUnavailable().body("cache unavailable")
        }
    }
}
