//! Diversifier - progressive author penalty with softmax sampling
//!
//! Selection is a single-threaded fold over the sampling order. Each step
//! adds the diversity term for every remaining candidate given how many
//! posts of its author are already in the window, then draws one item from
//! the softmax of those adjusted scores.

use super::random::RandomSource;
use super::sampler::{draw_index, sample_without_replacement, softmax};
use super::scoring::{diversity_penalty, ScoredCandidate};
use crate::config::RankingConfig;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedPost {
    pub post_id: String,
    pub author_id: Option<String>,
    /// Score including the diversity term at the moment of selection
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub posts: Vec<SelectedPost>,
    /// Posts per author picked in this pass
    pub author_counts: HashMap<String, u32>,
}

pub struct Diversifier {
    threshold: u32,
    delta: f64,
    weight: f64,
    temperature: f64,
}

impl Diversifier {
    pub fn new(threshold: u32, delta: f64, weight: f64, temperature: f64) -> Self {
        Self {
            threshold,
            delta,
            weight,
            temperature,
        }
    }

    pub fn from_config(config: &RankingConfig) -> Self {
        Self::new(
            config.diversity_threshold,
            config.diversity_penalty,
            config.weight_diversity,
            config.temperature,
        )
    }

    /// Weighted diversity term for the next post of an author already
    /// picked `already` times
    fn penalty(&self, already: u32) -> f64 {
        self.weight * diversity_penalty(already.saturating_add(1), self.threshold, self.delta)
    }

    /// Sample up to `k` distinct candidates.
    ///
    /// `prior_counts` seeds the per-author tally, so authors served on
    /// earlier pages start closer to their penalty.
    pub fn select(
        &self,
        candidates: Vec<ScoredCandidate>,
        k: usize,
        prior_counts: &HashMap<String, u32>,
        rng: &dyn RandomSource,
    ) -> Selection {
        if candidates.is_empty() || k == 0 {
            return Selection::default();
        }

        if self.delta == 0.0 || self.weight == 0.0 {
            return self.select_static(candidates, k, rng);
        }

        let mut tally = prior_counts.clone();
        let mut selection = Selection::default();
        let mut remaining = candidates;

        while selection.posts.len() < k && !remaining.is_empty() {
            let adjusted: Vec<f64> = remaining
                .iter()
                .map(|c| {
                    let already = c
                        .author_id
                        .as_ref()
                        .and_then(|a| tally.get(a))
                        .copied()
                        .unwrap_or(0);
                    match c.author_id {
                        Some(_) => c.score + self.penalty(already),
                        None => c.score,
                    }
                })
                .collect();

            let probs = softmax(&adjusted, self.temperature);
            let Some(pos) = draw_index(&probs, rng) else {
                break;
            };

            let chosen = remaining.remove(pos);
            if let Some(author) = &chosen.author_id {
                *tally.entry(author.clone()).or_insert(0) += 1;
                *selection.author_counts.entry(author.clone()).or_insert(0) += 1;
            }
            selection.posts.push(SelectedPost {
                post_id: chosen.post_id,
                author_id: chosen.author_id,
                score: adjusted[pos],
            });
        }

        selection
    }

    /// No diversity term in play: one softmax, then plain sampling
    fn select_static(
        &self,
        candidates: Vec<ScoredCandidate>,
        k: usize,
        rng: &dyn RandomSource,
    ) -> Selection {
        let scores: Vec<f64> = candidates.iter().map(|c| c.score).collect();
        let probs = softmax(&scores, self.temperature);
        let order = sample_without_replacement(&probs, k, rng);

        let mut slots: Vec<Option<ScoredCandidate>> = candidates.into_iter().map(Some).collect();
        let mut selection = Selection::default();
        for index in order {
            let Some(chosen) = slots[index].take() else {
                continue;
            };
            if let Some(author) = &chosen.author_id {
                *selection.author_counts.entry(author.clone()).or_insert(0) += 1;
            }
            selection.posts.push(SelectedPost {
                post_id: chosen.post_id,
                author_id: chosen.author_id,
                score: chosen.score,
            });
        }
        selection
    }
}
