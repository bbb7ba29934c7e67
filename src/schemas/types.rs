use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    #[default]
    Text,
    Mcq,
    Short,
}

/// Text-extraction technique that served (or failed) a request.
///
/// Declaration order is the fixed fallback priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    CloudVision,
    Handwriting,
    Tesseract,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CloudVision => "cloud_vision",
            Self::Handwriting => "handwriting",
            Self::Tesseract => "tesseract",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStatus {
    Complete,
    Partial,
    Failed,
}

impl EvaluationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionOutcome {
    Graded,
    ExtractionFailed,
    ScoringFailed,
}

impl QuestionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Graded => "graded",
            Self::ExtractionFailed => "extraction_failed",
            Self::ScoringFailed => "scoring_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_orders_by_priority() {
        let mut kinds = vec![BackendKind::Tesseract, BackendKind::CloudVision, BackendKind::Handwriting];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![BackendKind::CloudVision, BackendKind::Handwriting, BackendKind::Tesseract]
        );
    }

    #[test]
    fn enums_serialize_as_snake_case() {
        assert_eq!(serde_json::to_string(&BackendKind::CloudVision).unwrap(), "\"cloud_vision\"");
        assert_eq!(serde_json::to_string(&EvaluationStatus::Partial).unwrap(), "\"partial\"");
        assert_eq!(
            serde_json::to_string(&QuestionOutcome::ExtractionFailed).unwrap(),
            "\"extraction_failed\""
        );
        let parsed: QuestionType = serde_json::from_str("\"mcq\"").unwrap();
        assert_eq!(parsed, QuestionType::Mcq);
    }
}
