use std::collections::{BTreeMap, BTreeSet};

use super::text::content_terms;

/// Meaning-level similarity between two texts, in `[0, 1]`.
///
/// Implementations must be pure and symmetric: the same pair always yields the
/// same value regardless of argument order.
pub trait SimilarityFn: Send + Sync {
    fn similarity(&self, left: &str, right: &str) -> f64;
}

impl<F> SimilarityFn for F
where
    F: Fn(&str, &str) -> f64 + Send + Sync,
{
    fn similarity(&self, left: &str, right: &str) -> f64 {
        self(left, right)
    }
}

/// Bag-of-terms cosine similarity blended with bigram overlap, so word order
/// counts for a little.
#[derive(Debug, Clone, Copy)]
pub struct LexicalSimilarity {
    cosine_weight: f64,
}

impl Default for LexicalSimilarity {
    fn default() -> Self {
        Self { cosine_weight: 0.8 }
    }
}

impl SimilarityFn for LexicalSimilarity {
    fn similarity(&self, left: &str, right: &str) -> f64 {
        let left_terms = content_terms(left);
        let right_terms = content_terms(right);
        if left_terms.is_empty() || right_terms.is_empty() {
            return 0.0;
        }

        let cosine = cosine(&term_frequencies(&left_terms), &term_frequencies(&right_terms));
        let left_bigrams = bigrams(&left_terms);
        let right_bigrams = bigrams(&right_terms);
        if left_bigrams.is_empty() || right_bigrams.is_empty() {
            return cosine.clamp(0.0, 1.0);
        }

        let dice = 2.0 * left_bigrams.intersection(&right_bigrams).count() as f64
            / (left_bigrams.len() + right_bigrams.len()) as f64;
        (self.cosine_weight * cosine + (1.0 - self.cosine_weight) * dice).clamp(0.0, 1.0)
    }
}

fn term_frequencies(terms: &[String]) -> BTreeMap<&str, f64> {
    let mut counts = BTreeMap::new();
    for term in terms {
        *counts.entry(term.as_str()).or_insert(0.0) += 1.0;
    }
    counts
}

fn cosine(left: &BTreeMap<&str, f64>, right: &BTreeMap<&str, f64>) -> f64 {
    let dot: f64 = left
        .iter()
        .filter_map(|(term, weight)| right.get(term).map(|other| weight * other))
        .sum();
    let norm = |vector: &BTreeMap<&str, f64>| vector.values().map(|v| v * v).sum::<f64>().sqrt();
    let denominator = norm(left) * norm(right);
    if denominator == 0.0 {
        0.0
    } else {
        dot / denominator
    }
}

fn bigrams(terms: &[String]) -> BTreeSet<(&str, &str)> {
    terms.windows(2).map(|pair| (pair[0].as_str(), pair[1].as_str())).collect()
}
