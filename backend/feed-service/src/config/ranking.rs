//! Ranking weights, thresholds, TTLs and limits
//!
//! Read from `FEED_RANKING_*` environment variables; every field has a
//! default so an empty environment yields a working configuration.

use super::ConfigError;
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "FEED_RANKING_";

/// What to do with a candidate whose metrics are not cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsMissPolicy {
    /// Drop the candidate from this pass
    #[default]
    Skip,
    /// Keep it with zero engagement, zero recency and no author
    Conservative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    // Recency: R = exp(-λ·ageHours)
    pub recency_decay: f64,

    // Engagement: E = α·likes + β·comments + γ·reshares
    pub like_weight: f64,
    pub comment_weight: f64,
    pub reshare_weight: f64,

    // Affinity: w1..w4, normalised by max_affinity
    pub affinity_like_weight: f64,
    pub affinity_comment_weight: f64,
    pub affinity_reply_weight: f64,
    pub affinity_visit_weight: f64,
    pub max_affinity: f64,

    // Diversity: δ and the per-author threshold
    pub diversity_penalty: f64,
    pub diversity_threshold: u32,

    // Negative feedback: ζ
    pub negative_feedback_weight: f64,

    // Contextual boosts
    pub trending_boost: f64,
    pub mutual_boost: f64,

    // Composite weights wr..wb
    pub weight_recency: f64,
    pub weight_engagement: f64,
    pub weight_affinity: f64,
    pub weight_quality: f64,
    pub weight_diversity: f64,
    pub weight_negative: f64,
    pub weight_boost: f64,

    pub jitter_percent: f64,
    pub temperature: f64,

    // TTLs (seconds)
    pub candidate_ttl_secs: u64,
    pub metrics_ttl_secs: u64,
    pub seen_ttl_secs: u64,
    pub window_ttl_secs: u64,
    pub author_count_ttl_secs: u64,

    /// Top-N prefix of the candidate store scored per pass
    pub candidate_limit: usize,
    /// Posts sampled into one ranked window
    pub window_size: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,

    pub metrics_miss_policy: MetricsMissPolicy,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            recency_decay: 0.05,
            like_weight: 1.0,
            comment_weight: 2.0,
            reshare_weight: 3.0,
            affinity_like_weight: 1.0,
            affinity_comment_weight: 2.0,
            affinity_reply_weight: 3.0,
            affinity_visit_weight: 0.5,
            max_affinity: 50.0,
            diversity_penalty: 0.5,
            diversity_threshold: 3,
            negative_feedback_weight: 1.0,
            trending_boost: 0.2,
            mutual_boost: 0.1,
            weight_recency: 1.0,
            weight_engagement: 0.01,
            weight_affinity: 0.5,
            weight_quality: 0.3,
            weight_diversity: 1.0,
            weight_negative: 0.1,
            weight_boost: 1.0,
            jitter_percent: 0.05,
            temperature: 0.5,
            candidate_ttl_secs: feed_cache::ttl::CANDIDATES,
            metrics_ttl_secs: feed_cache::ttl::METRICS,
            seen_ttl_secs: feed_cache::ttl::SEEN,
            window_ttl_secs: feed_cache::ttl::WINDOW,
            author_count_ttl_secs: feed_cache::ttl::AUTHOR_COUNT,
            candidate_limit: 500,
            window_size: 100,
            default_page_size: 20,
            max_page_size: 100,
            metrics_miss_policy: MetricsMissPolicy::Skip,
        }
    }
}

impl RankingConfig {
    /// Load from the process environment and validate
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = envy::prefixed(ENV_PREFIX).from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from explicit `(name, value)` pairs, names carrying the prefix
    pub fn from_pairs<I>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::prefixed(ENV_PREFIX).from_iter(pairs)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot rank with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let reals = [
            ("recency_decay", self.recency_decay),
            ("like_weight", self.like_weight),
            ("comment_weight", self.comment_weight),
            ("reshare_weight", self.reshare_weight),
            ("affinity_like_weight", self.affinity_like_weight),
            ("affinity_comment_weight", self.affinity_comment_weight),
            ("affinity_reply_weight", self.affinity_reply_weight),
            ("affinity_visit_weight", self.affinity_visit_weight),
            ("max_affinity", self.max_affinity),
            ("diversity_penalty", self.diversity_penalty),
            ("negative_feedback_weight", self.negative_feedback_weight),
            ("trending_boost", self.trending_boost),
            ("mutual_boost", self.mutual_boost),
            ("weight_recency", self.weight_recency),
            ("weight_engagement", self.weight_engagement),
            ("weight_affinity", self.weight_affinity),
            ("weight_quality", self.weight_quality),
            ("weight_diversity", self.weight_diversity),
            ("weight_negative", self.weight_negative),
            ("weight_boost", self.weight_boost),
            ("jitter_percent", self.jitter_percent),
            ("temperature", self.temperature),
        ];
        for (name, value) in reals {
            if !value.is_finite() {
                return Err(ConfigError::invalid(name, "must be finite"));
            }
        }

        let non_negative = [
            ("recency_decay", self.recency_decay),
            ("max_affinity", self.max_affinity),
            ("diversity_penalty", self.diversity_penalty),
            ("negative_feedback_weight", self.negative_feedback_weight),
        ];
        for (name, value) in non_negative {
            if value < 0.0 {
                return Err(ConfigError::invalid(name, "must not be negative"));
            }
        }

        if self.diversity_threshold == 0 {
            return Err(ConfigError::invalid(
                "diversity_threshold",
                "must be at least 1",
            ));
        }
        if self.temperature <= 0.0 {
            return Err(ConfigError::invalid("temperature", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.jitter_percent) {
            return Err(ConfigError::invalid("jitter_percent", "must be in [0, 1)"));
        }

        let positive = [
            ("candidate_ttl_secs", self.candidate_ttl_secs as usize),
            ("metrics_ttl_secs", self.metrics_ttl_secs as usize),
            ("seen_ttl_secs", self.seen_ttl_secs as usize),
            ("window_ttl_secs", self.window_ttl_secs as usize),
            ("author_count_ttl_secs", self.author_count_ttl_secs as usize),
            ("candidate_limit", self.candidate_limit),
            ("window_size", self.window_size),
            ("default_page_size", self.default_page_size),
            ("max_page_size", self.max_page_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::invalid(name, "must be positive"));
            }
        }

        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::invalid(
                "default_page_size",
                "must not exceed max_page_size",
            ));
        }
        if self.max_page_size > self.window_size {
            return Err(ConfigError::invalid(
                "max_page_size",
                "must not exceed window_size",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_page_larger_than_window_rejected() {
        let config = RankingConfig {
            window_size: 50,
            max_page_size: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let err = RankingConfig::from_pairs(pairs(&[
            ("FEED_RANKING_WINDOW_SIZE", "10"),
            ("FEED_RANKING_DEFAULT_PAGE_SIZE", "5"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("max_page_size"));
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(RankingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = RankingConfig::from_pairs(Vec::new()).unwrap();
        assert_eq!(config, RankingConfig::default());
    }

    #[test]
    fn test_overrides_from_prefixed_vars() {
        let config = RankingConfig::from_pairs(pairs(&[
            ("FEED_RANKING_TEMPERATURE", "0.8"),
            ("FEED_RANKING_DIVERSITY_THRESHOLD", "5"),
            ("FEED_RANKING_METRICS_MISS_POLICY", "conservative"),
            ("UNRELATED", "x"),
        ]))
        .unwrap();

        assert_eq!(config.temperature, 0.8);
        assert_eq!(config.diversity_threshold, 5);
        assert_eq!(config.metrics_miss_policy, MetricsMissPolicy::Conservative);
    }

    #[test]
    fn test_negative_max_affinity_rejected() {
        let err = RankingConfig::from_pairs(pairs(&[("FEED_RANKING_MAX_AFFINITY", "-1")]))
            .unwrap_err();
        assert!(err.to_string().contains("max_affinity"));
    }

    #[test]
    fn test_zero_max_affinity_allowed() {
        let config = RankingConfig {
            max_affinity: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_values_rejected() {
        let cases = [
            RankingConfig {
                temperature: 0.0,
                ..Default::default()
            },
            RankingConfig {
                diversity_threshold: 0,
                ..Default::default()
            },
            RankingConfig {
                jitter_percent: 1.0,
                ..Default::default()
            },
            RankingConfig {
                weight_recency: f64::NAN,
                ..Default::default()
            },
            RankingConfig {
                window_ttl_secs: 0,
                ..Default::default()
            },
            RankingConfig {
                default_page_size: 200,
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }

    #[test]
    fn test_unparsable_value_is_error() {
        assert!(
            RankingConfig::from_pairs(pairs(&[("FEED_RANKING_WINDOW_SIZE", "lots")])).is_err()
        );
    }
}
