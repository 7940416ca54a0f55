//! Softmax weighting and weighted sampling without replacement

use super::random::RandomSource;

/// p_i = exp(s_i / T) / Σ exp(s_j / T)
///
/// Shifted by the max score so large scores cannot overflow. Non-finite
/// scores get zero mass; when nothing usable remains the distribution is
/// uniform.
pub fn softmax(scores: &[f64], temperature: f64) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let t = if temperature.is_finite() && temperature > 0.0 {
        temperature
    } else {
        1.0
    };

    let max = scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return uniform(scores.len());
    }

    let exps: Vec<f64> = scores
        .iter()
        .map(|s| if s.is_finite() { ((s - max) / t).exp() } else { 0.0 })
        .collect();
    let sum: f64 = exps.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return uniform(scores.len());
    }

    exps.into_iter().map(|e| e / sum).collect()
}

fn uniform(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Pick one index by cumulative-distribution inversion over `weights`.
///
/// Weights need not be normalised. Negative or non-finite weights count as
/// zero; if every weight is zero the pick is uniform. `None` only when
/// `weights` is empty.
pub fn draw_index(weights: &[f64], rng: &dyn RandomSource) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    let usable = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
    let total: f64 = weights.iter().map(|w| usable(*w)).sum();
    let u = rng.next_f64();

    if !total.is_finite() || total <= 0.0 {
        let idx = (u * weights.len() as f64) as usize;
        return Some(idx.min(weights.len() - 1));
    }

    let target = u * total;
    let mut cumulative = 0.0;
    let mut last_positive = 0;
    for (i, w) in weights.iter().enumerate() {
        let w = usable(*w);
        if w == 0.0 {
            continue;
        }
        cumulative += w;
        last_positive = i;
        if target < cumulative {
            return Some(i);
        }
    }
    // Rounding can leave target a hair above the final cumulative sum
    Some(last_positive)
}

/// Draw up to `k` distinct indices, each draw renormalising over what is left
pub fn sample_without_replacement(probs: &[f64], k: usize, rng: &dyn RandomSource) -> Vec<usize> {
    let mut remaining: Vec<(usize, f64)> = probs.iter().copied().enumerate().collect();
    let take = k.min(remaining.len());
    let mut picked = Vec::with_capacity(take);

    while picked.len() < take {
        let weights: Vec<f64> = remaining.iter().map(|(_, p)| *p).collect();
        let Some(pos) = draw_index(&weights, rng) else {
            break;
        };
        let (index, _) = remaining.remove(pos);
        picked.push(index);
    }

    picked
}
