use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::schemas::types::{BackendKind, EvaluationStatus, QuestionOutcome, QuestionType};
use crate::services::extraction::ExtractionAttempt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct QuestionSpec {
    #[validate(length(min = 1, message = "question id must not be empty"))]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(alias = "answerKey")]
    pub answer_key: String,
    #[serde(alias = "maxScore")]
    #[validate(range(exclusive_min = 0.0, message = "max_score must be positive"))]
    pub max_score: f64,
    #[serde(default, alias = "minWordCount")]
    pub min_word_count: u32,
    #[serde(default, alias = "questionType")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Clone, Validate)]
pub struct EvaluationRequest {
    #[validate(length(min = 1, message = "submission_id must not be empty"))]
    pub submission_id: String,
    pub student_name: Option<String>,
    pub student_id: Option<String>,
    #[validate(length(min = 1, message = "answer file is empty"))]
    pub file_bytes: Vec<u8>,
    pub content_type: String,
    #[validate(length(min = 1, message = "at least one question is required"), nested)]
    pub questions: Vec<QuestionSpec>,
}

impl EvaluationRequest {
    pub fn new(
        submission_id: impl Into<String>,
        file_bytes: Vec<u8>,
        content_type: impl Into<String>,
        questions: Vec<QuestionSpec>,
    ) -> Self {
        Self {
            submission_id: submission_id.into(),
            student_name: None,
            student_id: None,
            file_bytes,
            content_type: content_type.into(),
            questions,
        }
    }

    /// Field rules plus question id uniqueness.
    pub(crate) fn check(&self) -> Result<(), String> {
        self.validate().map_err(|err| err.to_string())?;

        let mut seen = HashSet::new();
        for question in &self.questions {
            if !seen.insert(question.id.as_str()) {
                return Err(format!("duplicate question id `{}`", question.id));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub order: i32,
    pub max_score: f64,
    pub outcome: QuestionOutcome,
    pub extracted_text: String,
    pub source_backend: Option<BackendKind>,
    pub confidence: Option<f64>,
    pub relevance_score: f64,
    pub accuracy_score: f64,
    pub grammar_score: f64,
    pub completeness_score: f64,
    pub word_count_score: f64,
    pub final_score: f64,
    pub detailed_feedback: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub grammar_issues: Vec<String>,
    pub extraction_attempts: Vec<ExtractionAttempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub run_id: Uuid,
    pub submission_id: String,
    pub status: EvaluationStatus,
    pub total_score: f64,
    pub max_possible_score: f64,
    pub file_sha256: String,
    pub started_at: String,
    pub completed_at: String,
    pub per_question: Vec<QuestionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationResult {
    pub fn question(&self, question_id: &str) -> Option<&QuestionResult> {
        self.per_question.iter().find(|result| result.question_id == question_id)
    }
}
