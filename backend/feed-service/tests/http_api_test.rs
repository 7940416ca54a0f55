use actix_web::{test, web, App};
use chrono::Utc;
use feed_cache::{CandidateStore, InMemoryStore, KeyValueStore};
use feed_service::config::RankingConfig;
use feed_service::handlers::{self, HandlerState};
use feed_service::models::{BatchInvalidation, FeedSource, RankedFeed, UserInvalidation};
use feed_service::FeedRanker;
use serde_json::json;
use std::sync::Arc;

fn state(store: Arc<InMemoryStore>) -> web::Data<HandlerState> {
    let store: Arc<dyn KeyValueStore> = store;
    web::Data::new(HandlerState {
        ranker: Arc::new(FeedRanker::new(store.clone(), RankingConfig::default())),
        store,
    })
}

#[actix_web::test]
async fn ingest_then_read_feed() {
    let store = Arc::new(InMemoryStore::new());
    let app = test::init_service(
        App::new()
            .app_data(state(store.clone()))
            .configure(handlers::configure),
    )
    .await;

    for i in 0..5 {
        let req = test::TestRequest::put()
            .uri(&format!("/api/v1/posts/p{}/metrics", i))
            .set_json(json!({
                "likes": i,
                "comments": 0,
                "reshares": 0,
                "author_id": "alice",
                "created_at": Utc::now(),
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 204);
    }

    let req = test::TestRequest::put()
        .uri("/api/v1/candidates/u1")
        .set_json(json!({
            "candidates": (0..5)
                .map(|i| json!({"post_id": format!("p{}", i), "base_score": 1.0}))
                .collect::<Vec<_>>()
        }))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["stored"], 5);

    let req = test::TestRequest::get()
        .uri("/api/v1/feed/u1?session_id=s1&limit=3")
        .to_request();
    let feed: RankedFeed = test::call_and_read_body_json(&app, req).await;
    assert_eq!(feed.items.len(), 3);
    assert_eq!(feed.source, FeedSource::Computed);

    let req = test::TestRequest::post()
        .uri("/api/v1/posts/p0/engagement")
        .set_json(json!({"field": "likes", "delta": 2}))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["value"], 2);
    assert_eq!(resp["applied"], true);

    let req = test::TestRequest::post()
        .uri("/api/v1/posts/unknown/engagement")
        .set_json(json!({"field": "comments"}))
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["applied"], false);
}

#[actix_web::test]
async fn rejects_bad_input() {
    let store = Arc::new(InMemoryStore::new());
    let app = test::init_service(
        App::new()
            .app_data(state(store.clone()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/v1/feed/u1?session_id=s1&limit=1000")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::get()
        .uri("/api/v1/feed/a:b?session_id=s1")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::get().uri("/api/v1/feed/u1").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::put()
        .uri("/api/v1/candidates/u1")
        .set_json(json!({
            "candidates": [
                {"post_id": "p1", "base_score": 1.0},
                {"post_id": "p2", "base_score": 2.0}
            ],
            "ttl_secs": 0
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
    assert!(CandidateStore::new(store.clone())
        .get_candidates("u1", None)
        .await
        .unwrap()
        .is_empty());

    let req = test::TestRequest::put()
        .uri("/api/v1/posts/p1/metrics")
        .set_json(json!({
            "likes": 1,
            "comments": 0,
            "reshares": 0,
            "author_id": "alice",
            "created_at": Utc::now(),
            "ttl_secs": 0,
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
async fn invalidation_endpoints() {
    let store = Arc::new(InMemoryStore::new());
    let app = test::init_service(
        App::new()
            .app_data(state(store.clone()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/feed/u1/invalidate")
        .to_request();
    let outcome: UserInvalidation = test::call_and_read_body_json(&app, req).await;
    assert_eq!(outcome.version, 1);

    let req = test::TestRequest::post()
        .uri("/api/v1/feed/invalidate")
        .set_json(json!({"user_ids": ["u1", "u2"]}))
        .to_request();
    let batch: BatchInvalidation = test::call_and_read_body_json(&app, req).await;
    assert_eq!(batch.invalidated.len(), 2);

    store.set_unavailable(true);
    let req = test::TestRequest::post()
        .uri("/api/v1/feed/u1/invalidate")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 503);
}

#[actix_web::test]
async fn readiness_follows_cache() {
    let store = Arc::new(InMemoryStore::new());
    let app = test::init_service(
        App::new()
            .app_data(state(store.clone()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/health/ready").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    store.set_unavailable(true);
    let req = test::TestRequest::get().uri("/api/v1/health/ready").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 503);

    let req = test::TestRequest::get().uri("/api/v1/health/live").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}
