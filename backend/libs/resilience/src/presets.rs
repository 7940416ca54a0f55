/// Preset configurations for cache round-trips
use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for one class of I/O
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub retry: RetryConfig,
}

/// Shared cache operations (Redis)
///
/// - Timeout: 250ms per attempt (a slow cache is treated as a miss)
/// - Retry: 2 retries, 20ms → 40ms backoff
pub fn cache_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_millis(250),
        },
        retry: RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            jitter: true,
        },
    }
}
