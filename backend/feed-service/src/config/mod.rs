mod ranking;

pub use ranking::{MetricsMissPolicy, RankingConfig};

use resilience::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read ranking environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub redis: RedisConfig,
    pub ranking: RankingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    /// Per-attempt deadline for one cache command
    pub op_timeout_ms: u64,
    pub max_retries: u32,
    pub keepalive_interval_secs: u64,
}

impl RedisConfig {
    /// Cache I/O policy: the shared preset with this deployment's overrides
    pub fn io_config(&self) -> ServiceConfig {
        let mut io = resilience::cache_config();
        io.timeout.duration = Duration::from_millis(self.op_timeout_ms);
        io.retry.max_retries = self.max_retries;
        io
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // .env is optional; real deployments inject variables directly
        let _ = dotenvy::dotenv();

        Ok(Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                port: parse_var("APP_PORT", 8000)?,
            },
            redis: RedisConfig {
                url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
                op_timeout_ms: parse_var("REDIS_OP_TIMEOUT_MS", default_op_timeout_ms())?,
                max_retries: parse_var("REDIS_MAX_RETRIES", default_max_retries())?,
                keepalive_interval_secs: parse_var(
                    "REDIS_KEEPALIVE_INTERVAL_SECS",
                    default_keepalive_interval_secs(),
                )?,
            },
            ranking: RankingConfig::from_env()?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::invalid(name, format!("cannot parse {:?}", raw))),
        Err(_) => Ok(default),
    }
}

fn default_op_timeout_ms() -> u64 {
    250
}

fn default_max_retries() -> u32 {
    2
}

fn default_keepalive_interval_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_config_overrides_preset() {
        let redis = RedisConfig {
            url: "redis://localhost".to_string(),
            op_timeout_ms: 100,
            max_retries: 0,
            keepalive_interval_secs: 30,
        };
        let io = redis.io_config();
        assert_eq!(io.timeout.duration, Duration::from_millis(100));
        assert_eq!(io.retry.max_retries, 0);
    }
}
