use thiserror::Error;

/// Runtime configuration for the evaluation pipeline.
///
/// Every credential and tunable reaches the pipeline through this value; nothing
/// below the entry point reads the environment on its own.
#[derive(Debug, Clone)]
pub struct Settings {
    pub(super) runtime: RuntimeSettings,
    pub(super) telemetry: TelemetrySettings,
    pub(super) cloud: CloudVisionSettings,
    pub(super) handwriting: HandwritingSettings,
    pub(super) tesseract: TesseractSettings,
    pub(super) extraction: ExtractionSettings,
    pub(super) scoring: ScoringSettings,
    pub(super) evaluation: EvaluationSettings,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    pub(crate) strict_config: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct CloudVisionSettings {
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) model: String,
    pub(crate) max_tokens: u32,
    pub(crate) temperature: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct HandwritingSettings {
    pub(crate) endpoint: String,
    pub(crate) api_key: String,
}

#[derive(Debug, Clone)]
pub(crate) struct TesseractSettings {
    pub(crate) command: String,
    pub(crate) language: String,
    pub(crate) psm: u8,
}

#[derive(Debug, Clone)]
pub(crate) struct ExtractionSettings {
    pub(crate) timeout_seconds: u64,
    pub(crate) min_confidence: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct ScoringSettings {
    pub(crate) weight_relevance: f64,
    pub(crate) weight_accuracy: f64,
    pub(crate) weight_completeness: f64,
    pub(crate) weight_grammar: f64,
    pub(crate) weight_word_count: f64,
    pub(crate) strong_threshold: f64,
    pub(crate) weak_threshold: f64,
    pub(crate) key_point_coverage: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct EvaluationSettings {
    pub(crate) max_concurrency: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Test => "test",
        }
    }

    pub(super) fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("invalid score weights: {0}")]
    InvalidWeights(String),
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
}
