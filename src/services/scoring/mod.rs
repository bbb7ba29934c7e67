//! Rubric scoring of an extracted answer against its answer key.
//!
//! Five dimensions are computed independently, each in `[0, 1]`:
//! relevance (meaning similarity), accuracy (key points present),
//! completeness (key concepts covered), grammar (surface checks) and word
//! count adequacy.

mod grammar;
mod similarity;
mod text;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::Settings;

pub use grammar::{GrammarIssue, GrammarIssueKind};
pub use similarity::{LexicalSimilarity, SimilarityFn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    /// Fraction of a key point's terms that must appear for it to count as covered.
    pub point_coverage_threshold: f64,
    pub max_sentence_words: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { point_coverage_threshold: 0.6, max_sentence_words: 40 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub relevance: f64,
    pub accuracy: f64,
    pub grammar: f64,
    pub completeness: f64,
    pub word_count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub sub_scores: SubScores,
    pub word_count: usize,
    pub min_word_count: u32,
    pub matched_points: Vec<String>,
    pub missing_points: Vec<String>,
    pub missing_concepts: Vec<String>,
    pub grammar_issues: Vec<GrammarIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    #[error("answer key has no gradable content")]
    EmptyAnswerKey,
}

#[derive(Clone)]
pub struct Scorer {
    similarity: Arc<dyn SimilarityFn>,
    config: ScoringConfig,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { similarity: Arc::new(LexicalSimilarity::default()), config }
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn SimilarityFn>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(ScoringConfig {
            point_coverage_threshold: settings.scoring().key_point_coverage,
            ..ScoringConfig::default()
        })
    }

    pub fn score(
        &self,
        extracted_text: &str,
        answer_key: &str,
        min_word_count: u32,
    ) -> Result<ScoreBreakdown, ScoringError> {
        let key_points = text::split_key_points(answer_key);
        let key_concepts = distinct_in_order(text::content_terms(answer_key));
        if key_points.is_empty() || key_concepts.is_empty() {
            return Err(ScoringError::EmptyAnswerKey);
        }

        let extracted = extracted_text.trim();
        if extracted.is_empty() {
            return Ok(ScoreBreakdown {
                sub_scores: SubScores::default(),
                word_count: 0,
                min_word_count,
                matched_points: Vec::new(),
                missing_points: key_points,
                missing_concepts: key_concepts,
                grammar_issues: Vec::new(),
            });
        }

        let text_terms: BTreeSet<String> = text::content_terms(extracted).into_iter().collect();

        let similarity = self.similarity.similarity(extracted, answer_key);
        let relevance = if similarity.is_finite() { similarity.clamp(0.0, 1.0) } else { 0.0 };

        let mut matched_points = Vec::new();
        let mut missing_points = Vec::new();
        let mut point_total = 0.0;
        for point in &key_points {
            let terms: BTreeSet<String> = text::content_terms(point).into_iter().collect();
            let matched = terms.iter().filter(|term| text_terms.contains(*term)).count();
            let point_score = matched as f64 / terms.len() as f64;
            point_total += point_score;
            if point_score >= self.config.point_coverage_threshold {
                matched_points.push(point.clone());
            } else {
                missing_points.push(point.clone());
            }
        }
        let accuracy = point_total / key_points.len() as f64;

        let (covered, missing_concepts): (Vec<String>, Vec<String>) =
            key_concepts.iter().cloned().partition(|concept| text_terms.contains(concept));
        let completeness = covered.len() as f64 / key_concepts.len() as f64;

        let grammar = grammar::check(extracted, self.config.max_sentence_words);

        let word_count = text::word_count(extracted);
        let word_count_score = if min_word_count == 0 {
            1.0
        } else {
            (word_count as f64 / f64::from(min_word_count)).min(1.0)
        };

        Ok(ScoreBreakdown {
            sub_scores: SubScores {
                relevance: round_to(relevance, 4),
                accuracy: round_to(accuracy, 4),
                grammar: round_to(grammar.score, 4),
                completeness: round_to(completeness, 4),
                word_count: round_to(word_count_score, 4),
            },
            word_count,
            min_word_count,
            matched_points,
            missing_points,
            missing_concepts,
            grammar_issues: grammar.issues,
        })
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

fn distinct_in_order(terms: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    terms.into_iter().filter(|term| seen.insert(term.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "Photosynthesis converts light energy into chemical energy stored in green plants.";

    #[test]
    fn text_equal_to_key_scores_full_marks() {
        let breakdown = Scorer::default().score(KEY, KEY, 10).expect("score");
        assert_eq!(breakdown.word_count, 11);
        assert_eq!(breakdown.sub_scores.relevance, 1.0);
        assert_eq!(breakdown.sub_scores.accuracy, 1.0);
        assert_eq!(breakdown.sub_scores.completeness, 1.0);
        assert_eq!(breakdown.sub_scores.grammar, 1.0);
        assert_eq!(breakdown.sub_scores.word_count, 1.0);
        assert!(breakdown.missing_points.is_empty());
    }

    #[test]
    fn empty_text_scores_zero_everywhere() {
        let breakdown = Scorer::default().score("   ", KEY, 10).expect("score");
        assert_eq!(breakdown.sub_scores, SubScores::default());
        assert_eq!(breakdown.missing_points.len(), 1);
        assert!(!breakdown.missing_concepts.is_empty());
    }

    #[test]
    fn empty_key_is_a_scoring_error() {
        assert_eq!(Scorer::default().score("anything", "  ", 0), Err(ScoringError::EmptyAnswerKey));
        assert_eq!(Scorer::default().score("anything", "the of and.", 0), Err(ScoringError::EmptyAnswerKey));
    }

    #[test]
    fn non_finite_similarity_counts_as_no_relevance() {
        let scorer = Scorer::default().with_similarity(Arc::new(|_: &str, _: &str| f64::NAN));
        let breakdown = scorer.score(KEY, KEY, 10).expect("score");
        assert_eq!(breakdown.sub_scores.relevance, 0.0);
        assert_eq!(breakdown.sub_scores.accuracy, 1.0);

        let infinite = Scorer::default().with_similarity(Arc::new(|_: &str, _: &str| f64::INFINITY));
        assert_eq!(infinite.score(KEY, KEY, 10).expect("score").sub_scores.relevance, 0.0);
    }

    #[test]
    fn partial_answer_reports_missing_points_and_concepts() {
        let key = "Water boils at 100 degrees. Ice melts at 0 degrees.";
        let breakdown = Scorer::default()
            .score("Water boils at 100 degrees.", key, 5)
            .expect("score");
        assert_eq!(breakdown.matched_points, vec!["Water boils at 100 degrees"]);
        assert_eq!(breakdown.missing_points, vec!["Ice melts at 0 degrees"]);
        assert_eq!(breakdown.missing_concepts, vec!["ice", "melt", "0"]);
        // second point still shares "degree" with the answer
        assert!((breakdown.sub_scores.accuracy - round_to((1.0 + 1.0 / 4.0) / 2.0, 4)).abs() < 1e-12);
        assert_eq!(breakdown.sub_scores.word_count, 1.0);
    }

    #[test]
    fn wrong_number_is_unmatched() {
        let key = "Water boils at 100 degrees.";
        let breakdown = Scorer::default().score("Water boils at 90 degrees.", key, 1).expect("score");
        assert_eq!(breakdown.missing_concepts, vec!["100"]);
        assert!(breakdown.sub_scores.accuracy < 1.0);
    }

    #[test]
    fn word_count_score_grows_towards_minimum() {
        let scorer = Scorer::default();
        let short = scorer.score("Green plants.", KEY, 10).expect("score");
        assert_eq!(short.sub_scores.word_count, 0.2);
        let none_required = scorer.score("Plants.", KEY, 0).expect("score");
        assert_eq!(none_required.sub_scores.word_count, 1.0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let scorer = Scorer::default();
        let text = "Plants convert sunlight into energy. i think it is stored as sugar";
        let first = scorer.score(text, KEY, 20).expect("score");
        let second = scorer.score(text, KEY, 20).expect("score");
        assert_eq!(first, second);
    }

    #[test]
    fn custom_similarity_drives_relevance() {
        let scorer = Scorer::default().with_similarity(Arc::new(|_: &str, _: &str| 0.5));
        let breakdown = scorer.score(KEY, KEY, 1).expect("score");
        assert_eq!(breakdown.sub_scores.relevance, 0.5);
        assert_eq!(breakdown.sub_scores.accuracy, 1.0);
    }
}
