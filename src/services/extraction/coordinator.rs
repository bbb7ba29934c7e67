use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use super::normalize::{normalize_text, segment_for_question};
use super::{
    BackendOutput, CloudVisionBackend, ExtractionBackend, ExtractionFailure, ExtractionInput,
    HandwritingModelBackend, TesseractBackend,
};
use crate::core::config::Settings;
use crate::core::metrics::{EXTRACTION_ATTEMPTS_TOTAL, EXTRACTION_DURATION_SECONDS};
use crate::schemas::types::BackendKind;

/// One backend call made while extracting a single answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionAttempt {
    pub backend: BackendKind,
    /// `"accepted"` or the failure label.
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

impl ExtractionAttempt {
    pub fn accepted(&self) -> bool {
        self.outcome == "accepted"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAnswer {
    pub text: String,
    pub source_backend: BackendKind,
    pub confidence: Option<f64>,
    pub attempts: Vec<ExtractionAttempt>,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("every extraction backend failed ({} attempts)", attempts.len())]
    Exhausted { attempts: Vec<ExtractionAttempt> },
    #[error("extraction cancelled")]
    Cancelled { attempts: Vec<ExtractionAttempt> },
}

impl CoordinatorError {
    pub fn attempts(&self) -> &[ExtractionAttempt] {
        match self {
            Self::Exhausted { attempts } | Self::Cancelled { attempts } => attempts,
        }
    }
}

/// Tries backends in priority order until one yields usable text.
pub struct ExtractionCoordinator {
    backends: Vec<Arc<dyn ExtractionBackend>>,
    call_timeout: Duration,
    min_confidence: f64,
}

impl ExtractionCoordinator {
    /// Backends are sorted by [`BackendKind`] priority; registration order only
    /// breaks ties between backends of the same kind.
    pub fn new(mut backends: Vec<Arc<dyn ExtractionBackend>>, call_timeout: Duration) -> Self {
        backends.sort_by_key(|backend| backend.kind());
        Self { backends, call_timeout, min_confidence: 0.0 }
    }

    pub fn with_min_confidence(mut self, floor: f64) -> Self {
        self.min_confidence = floor.clamp(0.0, 1.0);
        self
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let backends: Vec<Arc<dyn ExtractionBackend>> = vec![
            Arc::new(CloudVisionBackend::from_settings(settings)?),
            Arc::new(HandwritingModelBackend::from_settings(settings)?),
            Arc::new(TesseractBackend::from_settings(settings)),
        ];
        let extraction = settings.extraction();
        Ok(Self::new(backends, Duration::from_secs(extraction.timeout_seconds))
            .with_min_confidence(extraction.min_confidence))
    }

    pub fn backend_order(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|backend| backend.kind()).collect()
    }

    pub async fn extract(
        &self,
        input: &ExtractionInput,
        cancel: &watch::Receiver<bool>,
    ) -> Result<ExtractedAnswer, CoordinatorError> {
        let mut attempts = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            if *cancel.borrow() {
                return Err(CoordinatorError::Cancelled { attempts });
            }

            let kind = backend.kind();
            let started = Instant::now();
            let result = match tokio::time::timeout(self.call_timeout, backend.extract(input)).await {
                Ok(result) => result,
                Err(_) => Err(ExtractionFailure::Timeout(duration_ms(self.call_timeout))),
            };
            let elapsed = started.elapsed();
            metrics::histogram!(EXTRACTION_DURATION_SECONDS, "backend" => kind.as_str())
                .record(elapsed.as_secs_f64());

            let accepted = result.and_then(|output| self.accept(backend.as_ref(), input, output));
            let outcome = match &accepted {
                Ok(_) => "accepted",
                Err(failure) => failure.label(),
            };
            metrics::counter!(
                EXTRACTION_ATTEMPTS_TOTAL,
                "backend" => kind.as_str(),
                "outcome" => outcome
            )
            .increment(1);

            let attempt = ExtractionAttempt {
                backend: kind,
                outcome: outcome.to_string(),
                detail: accepted.as_ref().err().map(ToString::to_string),
                elapsed_ms: duration_ms(elapsed),
            };

            match accepted {
                Ok((text, confidence)) => {
                    tracing::debug!(
                        backend = %kind,
                        elapsed_ms = attempt.elapsed_ms,
                        chars = text.len(),
                        "Extraction backend succeeded"
                    );
                    attempts.push(attempt);
                    return Ok(ExtractedAnswer { text, source_backend: kind, confidence, attempts });
                }
                Err(failure) => {
                    tracing::warn!(
                        backend = %kind,
                        elapsed_ms = attempt.elapsed_ms,
                        error = %failure,
                        "Extraction backend failed, trying next"
                    );
                    attempts.push(attempt);
                }
            }
        }

        Err(CoordinatorError::Exhausted { attempts })
    }

    fn accept(
        &self,
        backend: &dyn ExtractionBackend,
        input: &ExtractionInput,
        output: BackendOutput,
    ) -> Result<(String, Option<f64>), ExtractionFailure> {
        let mut text = normalize_text(&output.text);
        if let Some(hint) = input.hint.as_ref().filter(|_| !backend.scopes_to_question()) {
            text = segment_for_question(&text, hint.ordinal, hint.total);
        }
        if text.is_empty() {
            return Err(ExtractionFailure::EmptyResult);
        }

        if let Some(confidence) = output.confidence {
            if confidence < self.min_confidence {
                return Err(ExtractionFailure::LowConfidence {
                    confidence,
                    floor: self.min_confidence,
                });
            }
        }

        Ok((text, output.confidence))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
