//! Text extraction from answer-sheet images and PDFs.
//!
//! Each backend implements [`ExtractionBackend`]; the [`ExtractionCoordinator`]
//! walks them in fixed priority order and keeps the first usable transcription.

mod cloud_vision;
mod content;
mod coordinator;
mod handwriting;
mod normalize;
mod tesseract;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::schemas::types::BackendKind;

pub use cloud_vision::CloudVisionBackend;
pub use content::ContentKind;
pub use coordinator::{CoordinatorError, ExtractedAnswer, ExtractionAttempt, ExtractionCoordinator};
pub use handwriting::HandwritingModelBackend;
pub use tesseract::TesseractBackend;

/// Which answer on a multi-question sheet the caller is after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionHint {
    /// 1-based position of the question in grading order.
    pub ordinal: usize,
    pub total: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ExtractionInput {
    pub bytes: Arc<[u8]>,
    /// `None` when neither the declared type nor the leading bytes were recognized.
    pub content: Option<ContentKind>,
    pub declared_content_type: String,
    pub hint: Option<QuestionHint>,
}

impl ExtractionInput {
    pub fn new(bytes: Arc<[u8]>, content_type: &str) -> Self {
        let content = ContentKind::detect(content_type, &bytes);
        Self { bytes, content, declared_content_type: content_type.to_string(), hint: None }
    }

    pub fn with_hint(mut self, hint: QuestionHint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub(crate) fn require_content(&self) -> Result<ContentKind, ExtractionFailure> {
        self.content.ok_or_else(|| {
            ExtractionFailure::UnsupportedContent(if self.declared_content_type.is_empty() {
                "unrecognized file signature".to_string()
            } else {
                self.declared_content_type.clone()
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendOutput {
    pub text: String,
    /// Backend-reported confidence in `[0, 1]`, when it has one.
    pub confidence: Option<f64>,
}

impl BackendOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), confidence: None }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }
}

/// Ordinary reasons a backend could not produce text. All of them send the
/// coordinator on to the next backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionFailure {
    #[error("backend is not configured: {0}")]
    NotConfigured(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend call timed out after {0} ms")]
    Timeout(u64),
    #[error("backend returned no text")]
    EmptyResult,
    #[error("unsupported content: {0}")]
    UnsupportedContent(String),
    #[error("confidence {confidence:.2} is below the {floor:.2} floor")]
    LowConfidence { confidence: f64, floor: f64 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
    #[error("corrupt input: {0}")]
    CorruptInput(String),
}

impl ExtractionFailure {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "not_configured",
            Self::Unavailable(_) => "unavailable",
            Self::Timeout(_) => "timeout",
            Self::EmptyResult => "empty",
            Self::UnsupportedContent(_) => "unsupported_content",
            Self::LowConfidence { .. } => "low_confidence",
            Self::Transport(_) => "transport",
            Self::InvalidResponse(_) => "invalid_response",
            Self::CorruptInput(_) => "corrupt_input",
        }
    }
}

#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// `true` when the backend honours [`QuestionHint`] itself, so its output
    /// is already limited to one answer and must not be segmented again.
    fn scopes_to_question(&self) -> bool {
        false
    }

    async fn extract(&self, input: &ExtractionInput) -> Result<BackendOutput, ExtractionFailure>;
}

fn classify_status(status: reqwest::StatusCode, message: String) -> ExtractionFailure {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return ExtractionFailure::Unavailable(format!("unauthorized (status {status}): {message}"));
    }
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return ExtractionFailure::Unavailable(format!("status {status}: {message}"));
    }
    ExtractionFailure::InvalidResponse(format!("status {status}: {message}"))
}

fn response_error_message(payload: &Value) -> String {
    if let Some(detail) = payload.get("detail") {
        if let Some(text) = detail.as_str() {
            return text.to_string();
        }
        if let Some(items) = detail.as_array() {
            let joined = items
                .iter()
                .filter_map(|item| {
                    item.get("msg")
                        .and_then(Value::as_str)
                        .or_else(|| item.get("message").and_then(Value::as_str))
                })
                .collect::<Vec<_>>()
                .join("; ");
            if !joined.is_empty() {
                return joined;
            }
        }
    }

    if let Some(error) = payload.get("error") {
        if let Some(text) = error.as_str() {
            return text.to_string();
        }
        if let Some(text) = error.get("message").and_then(Value::as_str) {
            return text.to_string();
        }
    }

    payload.get("message").and_then(Value::as_str).unwrap_or("unknown_error").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_message_prefers_detail_then_error() {
        assert_eq!(response_error_message(&json!({"detail": "bad key"})), "bad key");
        assert_eq!(
            response_error_message(&json!({"detail": [{"msg": "a"}, {"message": "b"}]})),
            "a; b"
        );
        assert_eq!(
            response_error_message(&json!({"error": {"message": "quota exceeded"}})),
            "quota exceeded"
        );
        assert_eq!(
            response_error_message(&json!({"error": "Model is currently loading"})),
            "Model is currently loading"
        );
        assert_eq!(response_error_message(&json!({})), "unknown_error");
    }

    #[test]
    fn status_classification() {
        let unauthorized = classify_status(reqwest::StatusCode::UNAUTHORIZED, "no".into());
        assert!(matches!(unauthorized, ExtractionFailure::Unavailable(_)));
        let overloaded = classify_status(reqwest::StatusCode::SERVICE_UNAVAILABLE, "busy".into());
        assert!(matches!(overloaded, ExtractionFailure::Unavailable(_)));
        let bad = classify_status(reqwest::StatusCode::BAD_REQUEST, "bad".into());
        assert!(matches!(bad, ExtractionFailure::InvalidResponse(_)));
    }

    #[test]
    fn input_without_known_content_reports_unsupported() {
        let input = ExtractionInput::new(Arc::from(&b"plain words"[..]), "text/plain");
        assert!(input.content.is_none());
        assert_eq!(
            input.require_content(),
            Err(ExtractionFailure::UnsupportedContent("text/plain".to_string()))
        );
    }
}
