pub(crate) mod core;
pub mod repositories;
pub mod schemas;
pub mod services;
pub mod tasks;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;

use anyhow::Context;
use tokio::sync::watch;

use crate::core::{shutdown, telemetry};

pub use crate::core::config::{ConfigError, Environment, Settings};
pub use crate::repositories::grades::{GradeStore, MemoryGradeStore, StoreError, SubmissionRecord};
pub use crate::schemas::evaluation::{
    EvaluationRequest, EvaluationResult, QuestionResult, QuestionSpec,
};
pub use crate::schemas::job::EvaluationJob;
pub use crate::schemas::types::{BackendKind, EvaluationStatus, QuestionOutcome, QuestionType};
pub use crate::services::extraction::{
    BackendOutput, ContentKind, CoordinatorError, ExtractedAnswer, ExtractionAttempt,
    ExtractionBackend, ExtractionCoordinator, ExtractionFailure, ExtractionInput, QuestionHint,
};
pub use crate::services::grading::{Aggregator, FeedbackThresholds, GradeReport, ScoreWeights};
pub use crate::services::scoring::{
    GrammarIssue, LexicalSimilarity, ScoreBreakdown, Scorer, ScoringConfig, ScoringError,
    SimilarityFn, SubScores,
};
pub use crate::tasks::evaluation::{EvaluationError, Evaluator};

/// Entry point of the `answer-evaluator` binary: grades the job file named on
/// the command line and prints the result as JSON on stdout.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let job_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: answer-evaluator <job.json>")?;
    let base_dir = job_path.parent().map(PathBuf::from).unwrap_or_default();
    let request = EvaluationJob::load(&job_path).await?.into_request(&base_dir).await?;

    let evaluator = Evaluator::from_settings(&settings)?;
    tracing::info!(
        environment = %settings.runtime().environment.as_str(),
        backends = ?evaluator.backend_order(),
        submission_id = %request.submission_id,
        "Answer evaluator starting"
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let shutdown_task = tokio::spawn(shutdown::cancel_on_shutdown(cancel_tx));

    let result = evaluator.evaluate_submission_with_cancel(request, cancel_rx).await;
    shutdown_task.abort();
    let result = result?;

    println!("{}", serde_json::to_string_pretty(&result).context("Failed to serialize result")?);

    if let Some(rendered) = core::metrics::render() {
        tracing::debug!(metrics = %rendered, "Final metrics snapshot");
    }

    Ok(())
}
