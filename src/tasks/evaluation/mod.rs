//! Evaluation orchestrator: runs extraction, scoring and aggregation for
//! every question of a submission and assembles the result set.

mod in_flight;
mod question;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::metrics::{EVALUATION_DURATION_SECONDS, EVALUATION_RUNS_TOTAL};
use crate::core::time::{format_offset, now_utc};
use crate::repositories::grades::{GradeStore, StoreError};
use crate::schemas::evaluation::{EvaluationRequest, EvaluationResult, QuestionResult};
use crate::schemas::types::{BackendKind, EvaluationStatus, QuestionOutcome};
use crate::services::extraction::{ExtractionCoordinator, ExtractionInput, QuestionHint};
use crate::services::grading::Aggregator;
use crate::services::scoring::{round_to, Scorer};

use in_flight::{InFlightGuard, InFlightSet};
use question::{grade_question, QuestionRun};

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("invalid evaluation request: {0}")]
    InvalidRequest(String),
    #[error("submission {0} is already being evaluated")]
    AlreadyInFlight(String),
    #[error("evaluation of submission {0} was cancelled")]
    Cancelled(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Shared entry point of the pipeline. Cloning is cheap and every clone sees
/// the same concurrency limit and in-flight set.
#[derive(Clone)]
pub struct Evaluator {
    inner: Arc<EvaluatorInner>,
}

struct EvaluatorInner {
    coordinator: ExtractionCoordinator,
    scorer: Scorer,
    aggregator: Aggregator,
    permits: Arc<Semaphore>,
    in_flight: InFlightSet,
}

impl Evaluator {
    pub fn new(
        coordinator: ExtractionCoordinator,
        scorer: Scorer,
        aggregator: Aggregator,
        max_concurrency: usize,
    ) -> Self {
        Self {
            inner: Arc::new(EvaluatorInner {
                coordinator,
                scorer,
                aggregator,
                permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
                in_flight: InFlightSet::default(),
            }),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let coordinator = ExtractionCoordinator::from_settings(settings)
            .context("Failed to build extraction backends")?;
        let aggregator =
            Aggregator::from_settings(settings).context("Invalid score aggregation settings")?;
        Ok(Self::new(
            coordinator,
            Scorer::from_settings(settings),
            aggregator,
            settings.evaluation().max_concurrency,
        ))
    }

    pub fn backend_order(&self) -> Vec<BackendKind> {
        self.inner.coordinator.backend_order()
    }

    pub async fn evaluate_submission(
        &self,
        request: EvaluationRequest,
    ) -> Result<EvaluationResult, EvaluationError> {
        let (_cancel_tx, cancel) = watch::channel(false);
        self.evaluate_submission_with_cancel(request, cancel).await
    }

    /// Flipping `cancel` to `true` stops every question at its next backend
    /// call; a cancelled run returns [`EvaluationError::Cancelled`].
    pub async fn evaluate_submission_with_cancel(
        &self,
        request: EvaluationRequest,
        cancel: watch::Receiver<bool>,
    ) -> Result<EvaluationResult, EvaluationError> {
        let guard = self.admit(&request)?;
        let result = self.run(request, cancel).await;
        drop(guard);
        result
    }

    /// Evaluates and, unless the run failed, commits the result to `store`
    /// while the submission is still held in flight.
    pub async fn evaluate_and_commit(
        &self,
        request: EvaluationRequest,
        store: &dyn GradeStore,
        cancel: watch::Receiver<bool>,
    ) -> Result<EvaluationResult, EvaluationError> {
        let _guard = self.admit(&request)?;
        let result = self.run(request, cancel).await?;
        if result.status != EvaluationStatus::Failed {
            store.commit_submission(&result).await?;
        }
        Ok(result)
    }

    fn admit(&self, request: &EvaluationRequest) -> Result<InFlightGuard, EvaluationError> {
        request.check().map_err(EvaluationError::InvalidRequest)?;
        self.inner
            .in_flight
            .try_acquire(&request.submission_id)
            .ok_or_else(|| EvaluationError::AlreadyInFlight(request.submission_id.clone()))
    }

    async fn run(
        &self,
        request: EvaluationRequest,
        cancel: watch::Receiver<bool>,
    ) -> Result<EvaluationResult, EvaluationError> {
        let started_at = now_utc();
        let timer = Instant::now();
        let run_id = Uuid::new_v4();
        let submission_id = request.submission_id.clone();
        let file_sha256 = hex::encode(Sha256::digest(&request.file_bytes));

        let mut questions = request.questions;
        questions.sort_by_key(|question| question.order);
        let total = questions.len();
        let max_possible_score: f64 = questions.iter().map(|question| question.max_score).sum();

        tracing::info!(
            submission_id = %submission_id,
            run_id = %run_id,
            questions = total,
            content_type = %request.content_type,
            "Starting submission evaluation"
        );

        let base_input = ExtractionInput::new(Arc::from(request.file_bytes), &request.content_type);
        let mut tasks = JoinSet::new();
        for (position, question) in questions.into_iter().enumerate() {
            let inner = Arc::clone(&self.inner);
            let cancel = cancel.clone();
            let input = base_input.clone().with_hint(QuestionHint {
                ordinal: position + 1,
                total,
                text: question.text.clone(),
            });
            let span = tracing::info_span!(
                "evaluate_question",
                submission_id = %submission_id,
                question_id = %question.id
            );

            tasks.spawn(
                async move {
                    let _permit = Arc::clone(&inner.permits)
                        .acquire_owned()
                        .await
                        .map_err(|err| format!("concurrency limiter closed: {err}"))?;
                    if *cancel.borrow() {
                        return Ok((position, QuestionRun::Cancelled));
                    }
                    let run = grade_question(
                        &inner.coordinator,
                        &inner.scorer,
                        &inner.aggregator,
                        &question,
                        &input,
                        &cancel,
                    )
                    .await;
                    Ok::<_, String>((position, run))
                }
                .instrument(span),
            );
        }

        let mut slots: Vec<Option<QuestionResult>> = vec![None; total];
        let mut cancelled = false;
        let mut internal_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((position, QuestionRun::Finished(result)))) => slots[position] = Some(*result),
                Ok(Ok((_, QuestionRun::Cancelled))) => cancelled = true,
                Ok(Err(message)) => {
                    internal_error = Some(message);
                    tasks.abort_all();
                }
                Err(err) if err.is_cancelled() => {}
                Err(err) => {
                    internal_error = Some(format!("question task failed: {err}"));
                    tasks.abort_all();
                }
            }
        }

        let completed_at = now_utc();
        let elapsed = timer.elapsed().as_secs_f64();
        metrics::histogram!(EVALUATION_DURATION_SECONDS).record(elapsed);

        if let Some(error) = internal_error {
            tracing::error!(
                submission_id = %submission_id,
                run_id = %run_id,
                error = %error,
                "Evaluation failed"
            );
            metrics::counter!(EVALUATION_RUNS_TOTAL, "status" => EvaluationStatus::Failed.as_str())
                .increment(1);
            return Ok(EvaluationResult {
                run_id,
                submission_id,
                status: EvaluationStatus::Failed,
                total_score: 0.0,
                max_possible_score,
                file_sha256,
                started_at: format_offset(started_at),
                completed_at: format_offset(completed_at),
                per_question: Vec::new(),
                error: Some(error),
            });
        }

        if cancelled {
            tracing::info!(submission_id = %submission_id, run_id = %run_id, "Evaluation cancelled");
            metrics::counter!(EVALUATION_RUNS_TOTAL, "status" => "cancelled").increment(1);
            return Err(EvaluationError::Cancelled(submission_id));
        }

        let per_question: Vec<QuestionResult> = slots.into_iter().flatten().collect();
        let total_score = round_to(per_question.iter().map(|result| result.final_score).sum(), 2);
        let status = if per_question.iter().all(|result| result.outcome == QuestionOutcome::Graded) {
            EvaluationStatus::Complete
        } else {
            EvaluationStatus::Partial
        };

        metrics::counter!(EVALUATION_RUNS_TOTAL, "status" => status.as_str()).increment(1);
        tracing::info!(
            submission_id = %submission_id,
            run_id = %run_id,
            status = status.as_str(),
            total_score,
            max_possible_score,
            duration_seconds = elapsed,
            "Submission evaluated"
        );

        Ok(EvaluationResult {
            run_id,
            submission_id,
            status,
            total_score,
            max_possible_score,
            file_sha256,
            started_at: format_offset(started_at),
            completed_at: format_offset(completed_at),
            per_question,
            error: None,
        })
    }
}
