use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::schemas::evaluation::{EvaluationRequest, QuestionSpec};
use crate::services::extraction::ContentKind;

/// Job file accepted by the `answer-evaluator` binary.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationJob {
    pub submission_id: String,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
    /// Answer sheet path; relative paths resolve against the job file's directory.
    pub file: PathBuf,
    #[serde(default)]
    pub content_type: Option<String>,
    pub questions: Vec<QuestionSpec>,
}

impl EvaluationJob {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read job file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse job file {}", path.display()))
    }

    pub async fn into_request(self, base_dir: &Path) -> anyhow::Result<EvaluationRequest> {
        let file = if self.file.is_absolute() { self.file.clone() } else { base_dir.join(&self.file) };
        let file_bytes = tokio::fs::read(&file)
            .await
            .with_context(|| format!("Failed to read answer file {}", file.display()))?;

        let content_type = self
            .content_type
            .filter(|value| !value.trim().is_empty())
            .or_else(|| {
                file.extension()
                    .and_then(|ext| ext.to_str())
                    .and_then(ContentKind::from_extension)
                    .map(|kind| kind.mime().to_string())
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Ok(EvaluationRequest {
            submission_id: self.submission_id,
            student_name: self.student_name,
            student_id: self.student_id,
            file_bytes,
            content_type,
            questions: self.questions,
        })
    }
}
