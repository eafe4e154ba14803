//! Name similarity for the fuzzy retrieval signal

use crate::tokenize::words;
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use locus_core::FuzzyMetric;
use std::collections::BTreeSet;

/// Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - distance / longer length`, in [0, 1]. Two empty strings are identical.
pub fn edit_ratio(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Jaccard overlap of the two strings' word sets.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let a: BTreeSet<String> = words(a).into_iter().collect();
    let b: BTreeSet<String> = words(b).into_iter().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Scores candidate names against a query. Similarities below the
/// threshold count as zero.
pub struct NameMatcher {
    metric: FuzzyMetric,
    threshold: f64,
    skim: SkimMatcherV2,
}

impl std::fmt::Debug for NameMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameMatcher")
            .field("metric", &self.metric)
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl NameMatcher {
    pub fn new(metric: FuzzyMetric, threshold: f64) -> Self {
        NameMatcher {
            metric,
            threshold,
            skim: SkimMatcherV2::default().ignore_case(),
        }
    }

    /// Similarity in [0, 1] before thresholding.
    pub fn similarity(&self, query: &str, name: &str) -> f64 {
        let query = query.trim();
        match self.metric {
            FuzzyMetric::EditDistance => {
                // overlap sees the original case so camelCase still splits
                let ratio = edit_ratio(&query.to_lowercase(), &name.to_lowercase());
                ratio.max(token_overlap(query, name))
            }
            FuzzyMetric::Subsequence => {
                let Some(perfect) = self.skim.fuzzy_match(query, query).filter(|s| *s > 0) else {
                    return 0.0;
                };
                self.skim
                    .fuzzy_match(name, query)
                    .map_or(0.0, |score| (score as f64 / perfect as f64).clamp(0.0, 1.0))
            }
        }
    }

    pub fn score(&self, query: &str, name: &str) -> f64 {
        let similarity = self.similarity(query, name);
        if similarity < self.threshold { 0.0 } else { similarity }
    }
}
