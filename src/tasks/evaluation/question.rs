use tokio::sync::watch;

use crate::core::metrics::QUESTION_GRADES_TOTAL;
use crate::schemas::evaluation::{QuestionResult, QuestionSpec};
use crate::schemas::types::QuestionOutcome;
use crate::services::extraction::{
    CoordinatorError, ExtractedAnswer, ExtractionAttempt, ExtractionCoordinator, ExtractionInput,
};
use crate::services::grading::{Aggregator, GradeReport};
use crate::services::scoring::Scorer;

pub(super) enum QuestionRun {
    Finished(Box<QuestionResult>),
    Cancelled,
}

/// Extract, score and aggregate one question. Backend and scoring failures
/// become a zero grade with flagged feedback; only cancellation escapes.
pub(super) async fn grade_question(
    coordinator: &ExtractionCoordinator,
    scorer: &Scorer,
    aggregator: &Aggregator,
    question: &QuestionSpec,
    input: &ExtractionInput,
    cancel: &watch::Receiver<bool>,
) -> QuestionRun {
    let answer = match coordinator.extract(input, cancel).await {
        Ok(answer) => answer,
        Err(CoordinatorError::Cancelled { .. }) => {
            tracing::info!(
                question_id = %question.id,
                "Question cancelled before extraction finished"
            );
            return QuestionRun::Cancelled;
        }
        Err(err @ CoordinatorError::Exhausted { .. }) => {
            tracing::warn!(question_id = %question.id, error = %err, "Extraction exhausted");
            let report = aggregator.extraction_failed(question.max_score);
            let attempts = err.attempts().to_vec();
            return finish(
                question,
                QuestionOutcome::ExtractionFailed,
                None,
                attempts,
                report,
                Some(err.to_string()),
            );
        }
    };

    match scorer.score(&answer.text, &question.answer_key, question.min_word_count) {
        Ok(breakdown) => {
            let report = aggregator.grade(&breakdown, question.max_score);
            tracing::debug!(
                question_id = %question.id,
                backend = %answer.source_backend,
                final_score = report.final_score,
                "Question graded"
            );
            let attempts = answer.attempts.clone();
            finish(question, QuestionOutcome::Graded, Some(answer), attempts, report, None)
        }
        Err(err) => {
            tracing::warn!(question_id = %question.id, error = %err, "Scoring failed");
            let report = aggregator.scoring_failed(question.max_score, &err.to_string());
            let attempts = answer.attempts.clone();
            finish(
                question,
                QuestionOutcome::ScoringFailed,
                Some(answer),
                attempts,
                report,
                Some(err.to_string()),
            )
        }
    }
}

fn finish(
    question: &QuestionSpec,
    outcome: QuestionOutcome,
    answer: Option<ExtractedAnswer>,
    extraction_attempts: Vec<ExtractionAttempt>,
    report: GradeReport,
    error: Option<String>,
) -> QuestionRun {
    metrics::counter!(QUESTION_GRADES_TOTAL, "outcome" => outcome.as_str()).increment(1);

    let (extracted_text, source_backend, confidence) = match answer {
        Some(answer) => (answer.text, Some(answer.source_backend), answer.confidence),
        None => (String::new(), None, None),
    };

    QuestionRun::Finished(Box::new(QuestionResult {
        question_id: question.id.clone(),
        order: question.order,
        max_score: question.max_score,
        outcome,
        extracted_text,
        source_backend,
        confidence,
        relevance_score: report.sub_scores.relevance,
        accuracy_score: report.sub_scores.accuracy,
        grammar_score: report.sub_scores.grammar,
        completeness_score: report.sub_scores.completeness,
        word_count_score: report.sub_scores.word_count,
        final_score: report.final_score,
        detailed_feedback: report.detailed_feedback,
        strengths: report.strengths,
        improvements: report.improvements,
        grammar_issues: report.grammar_issues,
        extraction_attempts,
        error,
    }))
}
