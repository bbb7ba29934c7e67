use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::schemas::evaluation::{EvaluationResult, QuestionResult};
use crate::schemas::types::EvaluationStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("refusing to commit a failed evaluation for submission {0}")]
    FailedRun(String),
    /// Backing storage could not be reached; returned by database-backed stores.
    #[error("grade store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence seam for graded submissions.
///
/// A commit replaces every stored answer of the submission in one step, so a
/// regrade never leaves more than one row per (submission, question).
#[async_trait]
pub trait GradeStore: Send + Sync {
    async fn commit_submission(&self, result: &EvaluationResult) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submission_id: String,
    pub processed: bool,
    pub processed_at: Option<String>,
    pub last_run_id: Option<Uuid>,
    pub status: Option<EvaluationStatus>,
    pub total_score: f64,
    pub max_possible_score: f64,
    pub answers: BTreeMap<String, QuestionResult>,
}

impl SubmissionRecord {
    fn unprocessed(submission_id: &str) -> Self {
        Self {
            submission_id: submission_id.to_string(),
            processed: false,
            processed_at: None,
            last_run_id: None,
            status: None,
            total_score: 0.0,
            max_possible_score: 0.0,
            answers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryGradeStore {
    submissions: RwLock<HashMap<String, SubmissionRecord>>,
}

impl MemoryGradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a submission before it is graded; a no-op when it already exists.
    pub async fn register_submission(&self, submission_id: &str) {
        self.submissions
            .write()
            .await
            .entry(submission_id.to_string())
            .or_insert_with(|| SubmissionRecord::unprocessed(submission_id));
    }

    pub async fn submission(&self, submission_id: &str) -> Option<SubmissionRecord> {
        self.submissions.read().await.get(submission_id).cloned()
    }

    pub async fn answer_count(&self, submission_id: &str) -> usize {
        self.submissions.read().await.get(submission_id).map_or(0, |record| record.answers.len())
    }

    pub async fn grade(&self, submission_id: &str, question_id: &str) -> Option<QuestionResult> {
        self.submissions
            .read()
            .await
            .get(submission_id)
            .and_then(|record| record.answers.get(question_id).cloned())
    }
}

#[async_trait]
impl GradeStore for MemoryGradeStore {
    async fn commit_submission(&self, result: &EvaluationResult) -> Result<(), StoreError> {
        if result.status == EvaluationStatus::Failed {
            return Err(StoreError::FailedRun(result.submission_id.clone()));
        }

        let answers: BTreeMap<String, QuestionResult> = result
            .per_question
            .iter()
            .map(|question| (question.question_id.clone(), question.clone()))
            .collect();

        let mut submissions = self.submissions.write().await;
        let record = submissions
            .entry(result.submission_id.clone())
            .or_insert_with(|| SubmissionRecord::unprocessed(&result.submission_id));
        record.answers = answers;
        record.processed = true;
        record.processed_at = Some(result.completed_at.clone());
        record.last_run_id = Some(result.run_id);
        record.status = Some(result.status);
        record.total_score = result.total_score;
        record.max_possible_score = result.max_possible_score;

        tracing::debug!(
            submission_id = %result.submission_id,
            answers = record.answers.len(),
            "Committed submission grades"
        );
        Ok(())
    }
}
