/// Resilience helpers for shared-cache I/O
///
/// - **Retry**: bounded exponential backoff with jitter, gated by a
///   transient-error predicate
/// - **Timeout**: per-attempt deadline so a hung connection counts as a
///   failed attempt instead of stalling the request
/// - **Presets**: tuned settings for cache round-trips
///
/// # Example
///
/// ```rust,no_run
/// use resilience::{presets, with_retry_if, timeout::with_timeout_result};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::cache_config();
///     let timeout = config.timeout.duration;
///
///     let result = with_retry_if(
///         config.retry,
///         || with_timeout_result(timeout, async { Ok::<_, String>(1) }),
///         |_err| true,
///     )
///     .await;
///     assert!(result.is_ok());
/// }
/// ```

pub mod presets;
pub mod retry;
pub mod timeout;

pub use presets::{cache_config, ServiceConfig};
pub use retry::{with_retry, with_retry_if, RetryConfig, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
