//! Combining per-candidate signals into one ranking score

use locus_core::FusionStrategy;
use serde::{Deserialize, Serialize};

/// Raw per-candidate signals, before normalisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    /// BM25 score; 0 when no query term matched.
    pub lexical: f64,
    /// Thresholded name similarity in [0, 1].
    pub fuzzy: f64,
    /// Cosine similarity clamped to [0, 1]; `None` when the node had no vector.
    pub embedding: Option<f64>,
}

/// Fused score per candidate, aligned with `signals`.
///
/// Candidates must be in ascending id order; rank-based strategies break
/// ties by that order.
pub fn fuse(strategy: &FusionStrategy, signals: &[Signals]) -> Vec<f64> {
    match *strategy {
        FusionStrategy::WeightedSum {
            lexical,
            fuzzy,
            embedding,
        } => weighted_sum(signals, [lexical, fuzzy, embedding]),
        FusionStrategy::ReciprocalRank { k } => reciprocal_rank(signals, k),
    }
}

fn channels(s: &Signals) -> [f64; 3] {
    [s.lexical, s.fuzzy, s.embedding.unwrap_or(0.0)]
}

/// Each signal divided by its maximum over the candidates, then weighted.
fn weighted_sum(signals: &[Signals], weights: [f64; 3]) -> Vec<f64> {
    let mut max = [0.0f64; 3];
    for s in signals {
        for (m, value) in max.iter_mut().zip(channels(s)) {
            *m = m.max(value);
        }
    }
    signals
        .iter()
        .map(|s| {
            channels(s)
                .into_iter()
                .zip(max)
                .zip(weights)
                .map(|((value, m), w)| if m > 0.0 { w * value / m } else { 0.0 })
                .sum::<f64>()
        })
        .collect()
}

/// Sum of `1 / (k + rank)` over the signals a candidate scored on.
/// Ranks start at 1; a zero signal contributes nothing.
fn reciprocal_rank(signals: &[Signals], k: f64) -> Vec<f64> {
    let mut fused = vec![0.0; signals.len()];
    for channel in 0..3 {
        let mut ranked: Vec<(usize, f64)> = signals
            .iter()
            .enumerate()
            .map(|(i, s)| (i, channels(s)[channel]))
            .filter(|(_, value)| *value > 0.0)
            .collect();
        // stable: equal scores keep ascending id order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (rank, (i, _)) in ranked.into_iter().enumerate() {
            fused[i] += 1.0 / (k + rank as f64 + 1.0);
        }
    }
    fused
}
