//! Composite Scoring
//!
//! Pure functions turning raw signals into one score per candidate:
//!
//! ```text
//! Score = wr·R + we·E + wa·A + wc·Q + wd·D + wn·N + wb·B
//! ```
//!
//! The diversity term depends on what was already selected, so it is left
//! out here (D = 0) and added progressively by the diversifier. Jitter is
//! applied once to the composite and is the only random step.

use super::random::RandomSource;
use crate::config::RankingConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Interaction history between the viewer and one author
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffinitySignal {
    pub past_likes: f64,
    pub past_comments: f64,
    pub direct_replies: f64,
    pub profile_visits: f64,
}

/// Hides and reports the viewer filed against one post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegativeFeedback {
    pub hides: u32,
    pub reports: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextFlags {
    pub trending_hashtag: bool,
    pub mutual_followers: bool,
}

/// Everything the composite needs about one candidate
#[derive(Debug, Clone, Default)]
pub struct CandidateSignals {
    pub post_id: String,
    pub author_id: Option<String>,
    pub likes: i64,
    pub comments: i64,
    pub reshares: i64,
    /// Hours since creation; `None` when unknown, which scores zero recency
    pub age_hours: Option<f64>,
    pub affinity: AffinitySignal,
    pub author_quality: f64,
    pub negative: NegativeFeedback,
    pub context: ContextFlags,
}

/// Individual terms before weighting
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub recency: f64,
    pub engagement: f64,
    pub affinity: f64,
    pub quality: f64,
    pub negative: f64,
    pub boost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub post_id: String,
    pub author_id: Option<String>,
    pub breakdown: ScoreBreakdown,
    /// Jittered composite without the diversity term
    pub score: f64,
}

/// R = exp(-λ·ageHours); ages in the future count as zero
pub fn recency(age_hours: f64, lambda: f64) -> f64 {
    (-lambda * age_hours.max(0.0)).exp()
}

/// E = α·likes + β·comments + γ·reshares
pub fn engagement(likes: i64, comments: i64, reshares: i64, alpha: f64, beta: f64, gamma: f64) -> f64 {
    alpha * likes as f64 + beta * comments as f64 + gamma * reshares as f64
}

/// A = clamp(w1·likes + w2·comments + w3·replies + w4·visits, 0, max) / max.
/// Zero when `max_affinity` is zero.
pub fn affinity(signal: &AffinitySignal, config: &RankingConfig) -> f64 {
    let max = config.max_affinity;
    if max <= 0.0 || !max.is_finite() {
        return 0.0;
    }
    let raw = config.affinity_like_weight * signal.past_likes
        + config.affinity_comment_weight * signal.past_comments
        + config.affinity_reply_weight * signal.direct_replies
        + config.affinity_visit_weight * signal.profile_visits;
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, max) / max
}

/// Q = clamp(rate, 0, 1)
pub fn quality(engagement_rate: f64) -> f64 {
    if engagement_rate.is_nan() {
        return 0.0;
    }
    engagement_rate.clamp(0.0, 1.0)
}

/// D = 0 up to the threshold, then -δ·(count - threshold)/threshold
pub fn diversity_penalty(author_post_count: u32, threshold: u32, delta: f64) -> f64 {
    if threshold == 0 || author_post_count <= threshold {
        return 0.0;
    }
    let excess = f64::from(author_post_count - threshold);
    -delta * excess / f64::from(threshold)
}

/// N = -ζ·(hides + 2·reports)
pub fn negative_feedback(feedback: &NegativeFeedback, zeta: f64) -> f64 {
    -zeta * (f64::from(feedback.hides) + 2.0 * f64::from(feedback.reports))
}

/// B = trending·[trending hashtag] + mutual·[mutual followers]
pub fn context_boost(flags: &ContextFlags, trending_boost: f64, mutual_boost: f64) -> f64 {
    let mut boost = 0.0;
    if flags.trending_hashtag {
        boost += trending_boost;
    }
    if flags.mutual_followers {
        boost += mutual_boost;
    }
    boost
}

/// Score + ε with ε ~ U(-τ, τ), τ = |Score·jitterPercent|
pub fn jitter(score: f64, jitter_percent: f64, rng: &dyn RandomSource) -> f64 {
    let tau = (score * jitter_percent).abs();
    if tau == 0.0 || !tau.is_finite() {
        return score;
    }
    let u = rng.next_f64();
    score + (2.0 * u - 1.0) * tau
}

pub struct ScoringEngine {
    config: Arc<RankingConfig>,
}

impl ScoringEngine {
    pub fn new(config: Arc<RankingConfig>) -> Self {
        Self { config }
    }

    pub fn breakdown(&self, candidate: &CandidateSignals) -> ScoreBreakdown {
        let cfg = &self.config;
        ScoreBreakdown {
            recency: candidate
                .age_hours
                .map(|age| recency(age, cfg.recency_decay))
                .unwrap_or(0.0),
            engagement: engagement(
                candidate.likes,
                candidate.comments,
                candidate.reshares,
                cfg.like_weight,
                cfg.comment_weight,
                cfg.reshare_weight,
            ),
            affinity: affinity(&candidate.affinity, cfg),
            quality: quality(candidate.author_quality),
            negative: negative_feedback(&candidate.negative, cfg.negative_feedback_weight),
            boost: context_boost(&candidate.context, cfg.trending_boost, cfg.mutual_boost),
        }
    }

    /// Weighted sum of all seven terms
    pub fn composite(&self, b: &ScoreBreakdown, diversity: f64) -> f64 {
        let cfg = &self.config;
        cfg.weight_recency * b.recency
            + cfg.weight_engagement * b.engagement
            + cfg.weight_affinity * b.affinity
            + cfg.weight_quality * b.quality
            + cfg.weight_diversity * diversity
            + cfg.weight_negative * b.negative
            + cfg.weight_boost * b.boost
    }

    pub fn score(&self, candidate: CandidateSignals, rng: &dyn RandomSource) -> ScoredCandidate {
        let breakdown = self.breakdown(&candidate);
        let composite = self.composite(&breakdown, 0.0);
        ScoredCandidate {
            post_id: candidate.post_id,
            author_id: candidate.author_id,
            breakdown,
            score: jitter(composite, self.config.jitter_percent, rng),
        }
    }

    /// Score every candidate in input order
    pub fn score_all(
        &self,
        candidates: Vec<CandidateSignals>,
        rng: &dyn RandomSource,
    ) -> Vec<ScoredCandidate> {
        candidates
            .into_iter()
            .map(|c| self.score(c, rng))
            .collect()
    }
}
