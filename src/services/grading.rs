use serde::{Deserialize, Serialize};

use crate::core::config::{ConfigError, Settings};
use crate::services::scoring::{round_to, ScoreBreakdown, SubScores};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
const MAX_LISTED_POINTS: usize = 3;
const MAX_LISTED_CONCEPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub relevance: f64,
    pub accuracy: f64,
    pub completeness: f64,
    pub grammar: f64,
    pub word_count: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { relevance: 0.35, accuracy: 0.30, completeness: 0.20, grammar: 0.10, word_count: 0.05 }
    }
}

impl ScoreWeights {
    pub fn from_settings(settings: &Settings) -> Self {
        let scoring = settings.scoring();
        Self {
            relevance: scoring.weight_relevance,
            accuracy: scoring.weight_accuracy,
            completeness: scoring.weight_completeness,
            grammar: scoring.weight_grammar,
            word_count: scoring.weight_word_count,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("relevance", self.relevance),
            ("accuracy", self.accuracy),
            ("completeness", self.completeness),
            ("grammar", self.grammar),
            ("word_count", self.word_count),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidWeights(format!("{name} weight {weight} must be a non-negative number")));
            }
        }
        let sum: f64 = weights.iter().map(|(_, weight)| weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::InvalidWeights(format!("weights sum to {sum}, expected 1")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackThresholds {
    pub strong: f64,
    pub weak: f64,
}

impl Default for FeedbackThresholds {
    fn default() -> Self {
        Self { strong: 0.75, weak: 0.5 }
    }
}

/// Final grade for one question, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeReport {
    pub sub_scores: SubScores,
    pub final_score: f64,
    pub detailed_feedback: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub grammar_issues: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Relevance,
    Accuracy,
    Completeness,
    Grammar,
    WordCount,
}

impl Dimension {
    const ALL: [Self; 5] =
        [Self::Relevance, Self::Accuracy, Self::Completeness, Self::Grammar, Self::WordCount];

    fn label(self) -> &'static str {
        match self {
            Self::Relevance => "Relevance",
            Self::Accuracy => "Accuracy",
            Self::Completeness => "Completeness",
            Self::Grammar => "Grammar",
            Self::WordCount => "Length",
        }
    }

    fn value(self, scores: &SubScores) -> f64 {
        match self {
            Self::Relevance => scores.relevance,
            Self::Accuracy => scores.accuracy,
            Self::Completeness => scores.completeness,
            Self::Grammar => scores.grammar,
            Self::WordCount => scores.word_count,
        }
    }

    fn strength(self) -> &'static str {
        match self {
            Self::Relevance => "The answer stays on what the question asks.",
            Self::Accuracy => "Key facts from the model answer are stated correctly.",
            Self::Completeness => "The answer covers the main concepts.",
            Self::Grammar => "Writing is clear and well punctuated.",
            Self::WordCount => "The answer is developed at the expected length.",
        }
    }
}

/// Combines sub-scores into the final grade and writes the feedback.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Aggregator {
    weights: ScoreWeights,
    thresholds: FeedbackThresholds,
}

impl Aggregator {
    pub fn new(weights: ScoreWeights, thresholds: FeedbackThresholds) -> Result<Self, ConfigError> {
        weights.validate()?;
        Ok(Self { weights, thresholds })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let scoring = settings.scoring();
        Self::new(
            ScoreWeights::from_settings(settings),
            FeedbackThresholds { strong: scoring.strong_threshold, weak: scoring.weak_threshold },
        )
    }

    pub fn weights(&self) -> ScoreWeights {
        self.weights
    }

    /// `max_score × Σ wᵢ·sᵢ`, clamped to `[0, max_score]` and rounded to two
    /// decimals. The sum runs in fixed dimension order; a non-finite sum is 0.
    pub fn final_score(&self, scores: &SubScores, max_score: f64) -> f64 {
        let weighted = self.weights.relevance * scores.relevance
            + self.weights.accuracy * scores.accuracy
            + self.weights.completeness * scores.completeness
            + self.weights.grammar * scores.grammar
            + self.weights.word_count * scores.word_count;
        let raw = max_score * weighted;
        if !raw.is_finite() {
            return 0.0;
        }
        round_to(raw.clamp(0.0, max_score), 2).clamp(0.0, max_score)
    }

    pub fn grade(&self, breakdown: &ScoreBreakdown, max_score: f64) -> GradeReport {
        let scores = breakdown.sub_scores;
        let final_score = self.final_score(&scores, max_score);

        let mut lines = vec![format!(
            "Score: {final_score:.2} / {max_score:.2} ({:.0}%).",
            percent(final_score / max_score)
        )];
        let mut strengths = Vec::new();
        let mut improvements = Vec::new();

        for dimension in Dimension::ALL {
            let value = dimension.value(&scores);
            let band = if value >= self.thresholds.strong {
                strengths.push(dimension.strength().to_string());
                "strong"
            } else if value < self.thresholds.weak {
                improvements.push(self.improvement(dimension, breakdown));
                "needs work"
            } else {
                "adequate"
            };
            lines.push(format!("{}: {:.0}% ({band}).", dimension.label(), percent(value)));
        }

        if !breakdown.missing_points.is_empty() {
            lines.push(format!("Missing key points: {}.", breakdown.missing_points.join("; ")));
        }
        if !breakdown.missing_concepts.is_empty() {
            lines.push(format!("Concepts not mentioned: {}.", breakdown.missing_concepts.join(", ")));
        }
        if word_shortfall(breakdown) {
            lines.push(format!(
                "Answer has {} words; at least {} were expected.",
                breakdown.word_count, breakdown.min_word_count
            ));
        }

        GradeReport {
            sub_scores: scores,
            final_score,
            detailed_feedback: lines.join("\n"),
            strengths,
            improvements,
            grammar_issues: breakdown.grammar_issues.iter().map(|issue| issue.message.clone()).collect(),
        }
    }

    /// Zero grade for an answer no backend could read.
    pub fn extraction_failed(&self, max_score: f64) -> GradeReport {
        GradeReport {
            sub_scores: SubScores::default(),
            final_score: 0.0,
            detailed_feedback: format!(
                "Score: 0.00 / {max_score:.2}. Extraction failed: no text could be read from the \
                 answer sheet for this question. Review the sheet manually."
            ),
            strengths: Vec::new(),
            improvements: vec!["Submit a clearer scan of the answer sheet.".to_string()],
            grammar_issues: Vec::new(),
        }
    }

    pub fn scoring_failed(&self, max_score: f64, reason: &str) -> GradeReport {
        GradeReport {
            sub_scores: SubScores::default(),
            final_score: 0.0,
            detailed_feedback: format!(
                "Score: 0.00 / {max_score:.2}. Scoring failed: {reason}. Review this answer manually."
            ),
            strengths: Vec::new(),
            improvements: Vec::new(),
            grammar_issues: Vec::new(),
        }
    }

    fn improvement(&self, dimension: Dimension, breakdown: &ScoreBreakdown) -> String {
        match dimension {
            Dimension::Relevance => "Focus the answer on what the question asks.".to_string(),
            Dimension::Accuracy if !breakdown.missing_points.is_empty() => format!(
                "Include the key points: {}.",
                breakdown
                    .missing_points
                    .iter()
                    .take(MAX_LISTED_POINTS)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("; ")
            ),
            Dimension::Accuracy => "Check the facts against the course material.".to_string(),
            Dimension::Completeness if !breakdown.missing_concepts.is_empty() => format!(
                "Cover the missing concepts: {}.",
                breakdown
                    .missing_concepts
                    .iter()
                    .take(MAX_LISTED_CONCEPTS)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Dimension::Completeness => "Develop every part of the answer.".to_string(),
            Dimension::Grammar => format!(
                "Review grammar and punctuation ({} issues found).",
                breakdown.grammar_issues.len()
            ),
            Dimension::WordCount => format!(
                "Write at least {} words (currently {}).",
                breakdown.min_word_count, breakdown.word_count
            ),
        }
    }
}

fn percent(fraction: f64) -> f64 {
    if fraction.is_finite() {
        fraction * 100.0
    } else {
        0.0
    }
}

fn word_shortfall(breakdown: &ScoreBreakdown) -> bool {
    breakdown.min_word_count > 0 && breakdown.word_count < breakdown.min_word_count as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scoring::Scorer;

    fn breakdown(scores: SubScores) -> ScoreBreakdown {
        ScoreBreakdown {
            sub_scores: scores,
            word_count: 12,
            min_word_count: 10,
            matched_points: Vec::new(),
            missing_points: Vec::new(),
            missing_concepts: Vec::new(),
            grammar_issues: Vec::new(),
        }
    }

    #[test]
    fn default_weights_are_valid() {
        ScoreWeights::default().validate().expect("defaults sum to one");
    }

    #[test]
    fn validate_rejects_bad_weights() {
        let negative = ScoreWeights { relevance: -0.1, accuracy: 0.5, ..ScoreWeights::default() };
        assert!(matches!(negative.validate(), Err(ConfigError::InvalidWeights(_))));
        let off_sum = ScoreWeights { relevance: 0.5, ..ScoreWeights::default() };
        assert!(matches!(off_sum.validate(), Err(ConfigError::InvalidWeights(_))));
        assert!(Aggregator::new(off_sum, FeedbackThresholds::default()).is_err());
    }

    #[test]
    fn perfect_scores_reach_max() {
        let aggregator = Aggregator::default();
        let scores = SubScores { relevance: 1.0, accuracy: 1.0, grammar: 1.0, completeness: 1.0, word_count: 1.0 };
        assert_eq!(aggregator.final_score(&scores, 10.0), 10.0);
        assert_eq!(aggregator.final_score(&SubScores::default(), 10.0), 0.0);
    }

    #[test]
    fn final_score_is_weighted_and_rounded() {
        let aggregator = Aggregator::default();
        let scores = SubScores { relevance: 0.8, accuracy: 0.6, grammar: 0.5, completeness: 0.4, word_count: 1.0 };
        // 0.28 + 0.18 + 0.08 + 0.05 + 0.05 = 0.64
        assert_eq!(aggregator.final_score(&scores, 5.0), 3.2);
        let thirds = SubScores { relevance: 1.0 / 3.0, ..scores };
        let value = aggregator.final_score(&thirds, 7.0);
        assert_eq!(value, round_to(value, 2));
    }

    #[test]
    fn nan_similarity_keeps_final_score_in_bounds() {
        let scorer = Scorer::default().with_similarity(std::sync::Arc::new(|_: &str, _: &str| 0.0 / 0.0));
        let key = "Water boils at 100 degrees at sea level.";
        let scored = scorer.score(key, key, 5).expect("score");
        let score = Aggregator::default().final_score(&scored.sub_scores, 10.0);
        assert!(score.is_finite());
        assert!((0.0..=10.0).contains(&score), "{score}");

        let poisoned = SubScores { relevance: f64::NAN, ..scored.sub_scores };
        assert_eq!(Aggregator::default().final_score(&poisoned, 10.0), 0.0);
    }

    #[test]
    fn final_score_stays_in_bounds() {
        let aggregator = Aggregator::default();
        for step in 0..=20 {
            let v = f64::from(step) / 20.0;
            let scores = SubScores { relevance: v, accuracy: 1.0 - v, grammar: v, completeness: v, word_count: 1.0 };
            let score = aggregator.final_score(&scores, 3.0);
            assert!((0.0..=3.0).contains(&score), "{score}");
        }
    }

    #[test]
    fn feedback_lists_strengths_and_improvements_in_fixed_order() {
        let aggregator = Aggregator::default();
        let mut input = breakdown(SubScores {
            relevance: 0.9,
            accuracy: 0.3,
            grammar: 0.6,
            completeness: 0.2,
            word_count: 0.4,
        });
        input.word_count = 4;
        input.missing_points = vec!["Ice melts at 0 degrees".to_string()];
        input.missing_concepts = vec!["ice".to_string(), "melt".to_string()];

        let report = aggregator.grade(&input, 10.0);
        assert_eq!(report.strengths, vec!["The answer stays on what the question asks."]);
        assert_eq!(
            report.improvements,
            vec![
                "Include the key points: Ice melts at 0 degrees.".to_string(),
                "Cover the missing concepts: ice, melt.".to_string(),
                "Write at least 10 words (currently 4).".to_string(),
            ]
        );
        let lines: Vec<&str> = report.detailed_feedback.lines().collect();
        assert!(lines[1].starts_with("Relevance: 90%"));
        assert!(lines[4].starts_with("Grammar: 60% (adequate)"));
        assert!(report.detailed_feedback.contains("Answer has 4 words; at least 10 were expected."));
    }

    #[test]
    fn grading_is_deterministic() {
        let scorer = Scorer::default();
        let aggregator = Aggregator::default();
        let key = "Osmosis moves water across a membrane. It follows the concentration gradient.";
        let text = "osmosis moves water through membranes";
        let first = aggregator.grade(&scorer.score(text, key, 8).expect("score"), 4.0);
        let second = aggregator.grade(&scorer.score(text, key, 8).expect("score"), 4.0);
        assert_eq!(first, second);
        assert!(!first.grammar_issues.is_empty());
    }

    #[test]
    fn extraction_failure_is_zero_with_flag() {
        let report = Aggregator::default().extraction_failed(5.0);
        assert_eq!(report.final_score, 0.0);
        assert_eq!(report.sub_scores, SubScores::default());
        assert!(report.detailed_feedback.contains("Extraction failed"));
    }
}
