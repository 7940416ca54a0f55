//! Feed Service Metrics
//!
//! Prometheus metrics for ranking passes, invalidations and HTTP traffic

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Duration;

static FEED_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_requests_total",
        "Ranked feed requests by source (window/computed/empty)",
        &["source"]
    )
    .expect("Failed to register feed requests metric")
});

static FEED_DEGRADED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "feed_degraded_total",
        "Feed responses served with at least one cache failure"
    )
    .expect("Failed to register feed degraded metric")
});

static RANKING_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "feed_ranking_duration_seconds",
        "Duration of a full scoring and sampling pass",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register ranking duration metric")
});

static CANDIDATES_SCORED: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "feed_candidates_scored",
        "Candidates scored per ranking pass",
        vec![0.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0]
    )
    .expect("Failed to register candidates scored metric")
});

static WINDOW_WRITES_SKIPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "feed_window_writes_skipped_total",
        "Computed windows discarded because the feed was invalidated mid-pass"
    )
    .expect("Failed to register window skip metric")
});

static INVALIDATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_invalidations_total",
        "Feed invalidations by outcome (purged/version_only/failed)",
        &["outcome"]
    )
    .expect("Failed to register invalidations metric")
});

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_http_requests_total",
        "HTTP requests by method, route and status",
        &["method", "path", "status"]
    )
    .expect("Failed to register HTTP requests metric")
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "feed_http_request_duration_seconds",
        "HTTP request latency by method and route",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register HTTP duration metric")
});

/// Record which path served a feed request
pub fn record_feed_request(source: &str) {
    FEED_REQUESTS_TOTAL.with_label_values(&[source]).inc();
}

pub fn record_degraded() {
    FEED_DEGRADED_TOTAL.inc();
}

pub fn observe_ranking(duration: Duration, candidates: usize) {
    RANKING_DURATION_SECONDS.observe(duration.as_secs_f64());
    CANDIDATES_SCORED.observe(candidates as f64);
}

pub fn record_window_write_skipped() {
    WINDOW_WRITES_SKIPPED_TOTAL.inc();
}

pub fn record_invalidation(outcome: &str) {
    INVALIDATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn observe_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Serve the default registry in Prometheus text format
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
