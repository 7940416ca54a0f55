//! Cache Connection Health Check Background Job
//!
//! Periodically pings the shared cache so idle connections stay open and
//! a dead connection is noticed (and re-established by the connection
//! manager) before a feed request trips over it.

use feed_cache::KeyValueStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Consecutive failures after which the job logs at error level
const CRITICAL_FAILURES: u32 = 5;

#[derive(Clone)]
pub struct RedisHealthConfig {
    pub enabled: bool,
    pub check_interval: Duration,
    pub initial_delay: Duration,
}

impl Default for RedisHealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: Duration::from_secs(30),
            initial_delay: Duration::from_secs(10),
        }
    }
}

impl RedisHealthConfig {
    pub fn with_interval_secs(secs: u64) -> Self {
        Self {
            check_interval: Duration::from_secs(secs.max(1)),
            ..Default::default()
        }
    }
}

/// Start the health check loop; never returns while enabled
pub async fn start_redis_health_check(store: Arc<dyn KeyValueStore>, config: RedisHealthConfig) {
    if !config.enabled {
        tracing::info!("Cache health check disabled by configuration");
        return;
    }

    tracing::info!(
        interval_secs = config.check_interval.as_secs(),
        "Starting cache health check background job"
    );

    sleep(config.initial_delay).await;

    let mut consecutive_failures = 0;
    loop {
        consecutive_failures = check_once(store.as_ref(), consecutive_failures).await;
        sleep(config.check_interval).await;
    }
}

/// One ping; returns the updated consecutive failure count
async fn check_once(store: &dyn KeyValueStore, consecutive_failures: u32) -> u32 {
    match store.ping().await {
        Ok(()) => {
            if consecutive_failures > 0 {
                tracing::info!(
                    previous_failures = consecutive_failures,
                    "Cache connection recovered"
                );
            }
            tracing::debug!("Cache health check: OK");
            0
        }
        Err(e) => {
            let failures = consecutive_failures + 1;
            if failures >= CRITICAL_FAILURES {
                tracing::error!(
                    consecutive_failures = failures,
                    error = %e,
                    "Cache health check: CRITICAL - multiple consecutive failures"
                );
            } else {
                tracing::warn!(
                    consecutive_failures = failures,
                    error = %e,
                    "Cache health check: FAILED"
                );
            }
            failures
        }
    }
}
