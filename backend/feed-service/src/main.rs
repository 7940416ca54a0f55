use actix_web::{dev::Service, web, App, HttpServer};
use feed_cache::{CacheMetrics, KeyValueStore, RedisStore};
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_service::config::Config;
use feed_service::handlers::{self, HandlerState};
use feed_service::jobs::redis_health::{start_redis_health_check, RedisHealthConfig};
use feed_service::FeedRanker;

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting feed-service v{}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.env);

    if let Err(e) = CacheMetrics::register(prometheus::default_registry()) {
        tracing::warn!("Cache metrics not registered: {}", e);
    }

    let store: Arc<dyn KeyValueStore> =
        match RedisStore::connect(&config.redis.url, config.redis.io_config()).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::error!("Redis connection failed: {:#}", e);
                eprintln!("ERROR: Failed to connect to Redis: {}", e);
                std::process::exit(1);
            }
        };
    info!("Connected to shared cache");

    let health_store = store.clone();
    let health_config = RedisHealthConfig::with_interval_secs(config.redis.keepalive_interval_secs);
    tokio::spawn(async move {
        start_redis_health_check(health_store, health_config).await;
    });
    info!("Cache health check background job started");

    let ranker = Arc::new(FeedRanker::new(store.clone(), config.ranking.clone()));
    let state = web::Data::new(HandlerState { ranker, store });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(TracingLogger::default())
            .route("/health", web::get().to(|| async { "OK" }))
            .route(
                "/metrics",
                web::get().to(feed_service::metrics::serve_metrics),
            )
            .wrap_fn(|req, srv| {
                let method = req.method().to_string();
                let path = req
                    .match_pattern()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| req.path().to_string());
                let start = Instant::now();

                let fut = srv.call(req);
                async move {
                    match fut.await {
                        Ok(res) => {
                            feed_service::metrics::observe_http_request(
                                &method,
                                &path,
                                res.status().as_u16(),
                                start.elapsed(),
                            );
                            Ok(res)
                        }
                        Err(err) => {
                            feed_service::metrics::observe_http_request(
                                &method,
                                &path,
                                500,
                                start.elapsed(),
                            );
                            Err(err)
                        }
                    }
                }
            })
            .configure(handlers::configure)
    })
    .bind(format!("0.0.0.0:{}", config.app.port))?
    .run()
    .await
}
