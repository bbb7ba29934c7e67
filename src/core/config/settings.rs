use super::parsing::{
    env_optional, env_or_default, is_unit_interval, parse_bool, parse_environment, parse_f64,
    parse_u32, parse_u64, parse_u8, parse_usize,
};
use super::types::{
    CloudVisionSettings, ConfigError, EvaluationSettings, ExtractionSettings, HandwritingSettings,
    RuntimeSettings, ScoringSettings, Settings, TelemetrySettings, TesseractSettings,
};
use crate::services::grading::ScoreWeights;

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            parse_environment(env_optional("GRADER_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("GRADER_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let log_level = env_or_default("GRADER_LOG_LEVEL", "info");
        let json = env_optional("GRADER_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let cloud_api_key = env_or_default("OPENAI_API_KEY", "");
        let cloud_base_url = env_or_default("OPENAI_BASE_URL", "");
        let cloud_model = env_or_default("VISION_MODEL", "gpt-4o");
        let cloud_max_tokens =
            parse_u32("VISION_MAX_TOKENS", env_or_default("VISION_MAX_TOKENS", "4096"))?;
        let cloud_temperature =
            parse_f64("VISION_TEMPERATURE", env_or_default("VISION_TEMPERATURE", "0"))?;

        let handwriting_endpoint = env_or_default("HANDWRITING_ENDPOINT", "");
        let handwriting_api_key = env_or_default("HANDWRITING_API_KEY", "");

        let tesseract_command = env_or_default("TESSERACT_CMD", "tesseract");
        let tesseract_language = env_or_default("TESSERACT_LANG", "eng");
        let tesseract_psm = parse_u8("TESSERACT_PSM", env_or_default("TESSERACT_PSM", "6"))?;

        let extraction_timeout_seconds = parse_u64(
            "EXTRACTION_TIMEOUT_SECONDS",
            env_or_default("EXTRACTION_TIMEOUT_SECONDS", "60"),
        )?;
        let extraction_min_confidence = parse_f64(
            "EXTRACTION_MIN_CONFIDENCE",
            env_or_default("EXTRACTION_MIN_CONFIDENCE", "0"),
        )?;

        let weight_relevance =
            parse_f64("SCORE_WEIGHT_RELEVANCE", env_or_default("SCORE_WEIGHT_RELEVANCE", "0.35"))?;
        let weight_accuracy =
            parse_f64("SCORE_WEIGHT_ACCURACY", env_or_default("SCORE_WEIGHT_ACCURACY", "0.30"))?;
        let weight_completeness = parse_f64(
            "SCORE_WEIGHT_COMPLETENESS",
            env_or_default("SCORE_WEIGHT_COMPLETENESS", "0.20"),
        )?;
        let weight_grammar =
            parse_f64("SCORE_WEIGHT_GRAMMAR", env_or_default("SCORE_WEIGHT_GRAMMAR", "0.10"))?;
        let weight_word_count = parse_f64(
            "SCORE_WEIGHT_WORD_COUNT",
            env_or_default("SCORE_WEIGHT_WORD_COUNT", "0.05"),
        )?;
        let strong_threshold = parse_f64(
            "FEEDBACK_STRONG_THRESHOLD",
            env_or_default("FEEDBACK_STRONG_THRESHOLD", "0.75"),
        )?;
        let weak_threshold = parse_f64(
            "FEEDBACK_WEAK_THRESHOLD",
            env_or_default("FEEDBACK_WEAK_THRESHOLD", "0.5"),
        )?;
        let key_point_coverage =
            parse_f64("KEY_POINT_COVERAGE", env_or_default("KEY_POINT_COVERAGE", "0.6"))?;

        let max_concurrency = parse_usize(
            "EVALUATION_MAX_CONCURRENCY",
            env_or_default("EVALUATION_MAX_CONCURRENCY", "4"),
        )?;

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
            cloud: CloudVisionSettings {
                api_key: cloud_api_key,
                base_url: cloud_base_url,
                model: cloud_model,
                max_tokens: cloud_max_tokens,
                temperature: cloud_temperature,
            },
            handwriting: HandwritingSettings {
                endpoint: handwriting_endpoint,
                api_key: handwriting_api_key,
            },
            tesseract: TesseractSettings {
                command: tesseract_command,
                language: tesseract_language,
                psm: tesseract_psm,
            },
            extraction: ExtractionSettings {
                timeout_seconds: extraction_timeout_seconds,
                min_confidence: extraction_min_confidence,
            },
            scoring: ScoringSettings {
                weight_relevance,
                weight_accuracy,
                weight_completeness,
                weight_grammar,
                weight_word_count,
                strong_threshold,
                weak_threshold,
                key_point_coverage,
            },
            evaluation: EvaluationSettings { max_concurrency },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn cloud(&self) -> &CloudVisionSettings {
        &self.cloud
    }

    pub(crate) fn handwriting(&self) -> &HandwritingSettings {
        &self.handwriting
    }

    pub(crate) fn tesseract(&self) -> &TesseractSettings {
        &self.tesseract
    }

    pub(crate) fn extraction(&self) -> &ExtractionSettings {
        &self.extraction
    }

    pub(crate) fn scoring(&self) -> &ScoringSettings {
        &self.scoring
    }

    pub(crate) fn evaluation(&self) -> &EvaluationSettings {
        &self.evaluation
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ScoreWeights::from_settings(self).validate()?;

        if !is_unit_interval(self.scoring.strong_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "FEEDBACK_STRONG_THRESHOLD",
                value: self.scoring.strong_threshold.to_string(),
            });
        }
        if !is_unit_interval(self.scoring.weak_threshold)
            || self.scoring.weak_threshold > self.scoring.strong_threshold
        {
            return Err(ConfigError::InvalidValue {
                field: "FEEDBACK_WEAK_THRESHOLD",
                value: self.scoring.weak_threshold.to_string(),
            });
        }
        if self.scoring.key_point_coverage <= 0.0 || self.scoring.key_point_coverage > 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "KEY_POINT_COVERAGE",
                value: self.scoring.key_point_coverage.to_string(),
            });
        }

        if self.extraction.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EXTRACTION_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }
        if !is_unit_interval(self.extraction.min_confidence) {
            return Err(ConfigError::InvalidValue {
                field: "EXTRACTION_MIN_CONFIDENCE",
                value: self.extraction.min_confidence.to_string(),
            });
        }
        if self.tesseract.psm > 13 {
            return Err(ConfigError::InvalidValue {
                field: "TESSERACT_PSM",
                value: self.tesseract.psm.to_string(),
            });
        }
        if self.evaluation.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EVALUATION_MAX_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.cloud.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }
        if self.cloud.base_url.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_BASE_URL"));
        }

        Ok(())
    }
}
