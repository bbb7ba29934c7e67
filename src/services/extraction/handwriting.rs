use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;

use super::{
    classify_status, response_error_message, BackendOutput, ContentKind, ExtractionBackend,
    ExtractionFailure, ExtractionInput,
};
use crate::core::config::Settings;
use crate::schemas::types::BackendKind;

/// Handwriting recognition model (TrOCR style) served behind an HTTP
/// inference endpoint that takes the raw image as the request body.
#[derive(Debug, Clone)]
pub struct HandwritingModelBackend {
    client: Client,
    endpoint: String,
    api_key: String,
    request_timeout: Duration,
}

impl HandwritingModelBackend {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let request_timeout = Duration::from_secs(settings.extraction().timeout_seconds);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(request_timeout)
            .build()
            .context("Failed to build handwriting HTTP client")?;

        let handwriting = settings.handwriting();
        Ok(Self {
            client,
            endpoint: handwriting.endpoint.clone(),
            api_key: handwriting.api_key.clone(),
            request_timeout,
        })
    }
}

#[async_trait]
impl ExtractionBackend for HandwritingModelBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Handwriting
    }

    async fn extract(&self, input: &ExtractionInput) -> Result<BackendOutput, ExtractionFailure> {
        if self.endpoint.is_empty() {
            return Err(ExtractionFailure::NotConfigured("HANDWRITING_ENDPOINT is empty".to_string()));
        }
        let content = input.require_content()?;
        if content == ContentKind::Pdf {
            return Err(ExtractionFailure::UnsupportedContent(
                "handwriting model only reads images".to_string(),
            ));
        }

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, content.mime())
            .body(input.bytes.to_vec());
        if !self.api_key.is_empty() {
            request = request.header("X-Api-Key", &self.api_key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                ExtractionFailure::Timeout(
                    u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX),
                )
            } else if err.is_connect() {
                ExtractionFailure::Unavailable(format!("handwriting model unreachable: {err}"))
            } else {
                ExtractionFailure::Transport(err.to_string())
            }
        })?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = response_error_message(&body);
            if status == StatusCode::SERVICE_UNAVAILABLE && message.to_lowercase().contains("loading") {
                return Err(ExtractionFailure::Unavailable(format!("model not loaded: {message}")));
            }
            return Err(classify_status(status, message));
        }

        parse_generated_text(&body)
    }
}

fn parse_generated_text(body: &Value) -> Result<BackendOutput, ExtractionFailure> {
    let item = match body {
        Value::Array(items) => items.first().ok_or(ExtractionFailure::EmptyResult)?,
        other => other,
    };

    let text = item
        .get("generated_text")
        .or_else(|| item.get("text"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ExtractionFailure::InvalidResponse("expected `generated_text` or `text`".to_string())
        })?;

    let output = BackendOutput::new(text);
    let confidence =
        item.get("score").or_else(|| item.get("confidence")).and_then(Value::as_f64);
    Ok(match confidence {
        Some(value) => output.with_confidence(value),
        None => output,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::test_support;

    async fn backend_with(endpoint: &str) -> HandwritingModelBackend {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("HANDWRITING_ENDPOINT", endpoint);
        std::env::set_var("HANDWRITING_API_KEY", "hw-key");
        let settings = Settings::load();
        std::env::remove_var("HANDWRITING_ENDPOINT");
        std::env::remove_var("HANDWRITING_API_KEY");
        HandwritingModelBackend::from_settings(&settings.expect("settings")).expect("backend")
    }

    fn png_input() -> ExtractionInput {
        ExtractionInput::new(Arc::from(&b"\x89PNG\r\n\x1a\npixels"[..]), "image/png")
    }

    #[test]
    fn parses_every_known_body_shape() {
        let list = parse_generated_text(&json!([{"generated_text": "cells divide", "score": 0.91}]))
            .expect("list body");
        assert_eq!(list.text, "cells divide");
        assert_eq!(list.confidence, Some(0.91));

        let plain = parse_generated_text(&json!({"text": "atoms bond"})).expect("text body");
        assert_eq!(plain, BackendOutput::new("atoms bond"));

        let single = parse_generated_text(&json!({"generated_text": "ions"})).expect("object body");
        assert_eq!(single.text, "ions");

        assert!(matches!(parse_generated_text(&json!([])), Err(ExtractionFailure::EmptyResult)));
        assert!(matches!(
            parse_generated_text(&json!({"label": "x"})),
            Err(ExtractionFailure::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn empty_endpoint_is_not_configured() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");
        let backend = HandwritingModelBackend::from_settings(&settings).expect("backend");

        let result = backend.extract(&png_input()).await;
        assert!(matches!(result, Err(ExtractionFailure::NotConfigured(_))));
    }

    #[tokio::test]
    async fn pdf_is_unsupported() {
        let backend = backend_with("http://localhost:1/infer").await;
        let input = ExtractionInput::new(Arc::from(&b"%PDF-1.5"[..]), "application/pdf");

        let result = backend.extract(&input).await;
        assert!(matches!(result, Err(ExtractionFailure::UnsupportedContent(_))));
    }

    #[tokio::test]
    async fn posts_raw_bytes_with_api_key() {
        let (url, request) =
            test_support::serve_json(200, json!([{"generated_text": "mitosis"}]).to_string()).await;
        let backend = backend_with(&url).await;

        let output = backend.extract(&png_input()).await.expect("extract");
        assert_eq!(output.text, "mitosis");
        let request = request.await.expect("request").to_ascii_lowercase();
        assert!(request.contains("x-api-key: hw-key"));
        assert!(request.contains("content-type: image/png"));
    }

    #[tokio::test]
    async fn loading_model_is_unavailable() {
        let (url, _request) = test_support::serve_json(
            503,
            json!({"error": "Model microsoft/trocr is currently loading"}).to_string(),
        )
        .await;
        let backend = backend_with(&url).await;

        let err = backend.extract(&png_input()).await.expect_err("loading");
        assert!(matches!(err, ExtractionFailure::Unavailable(ref msg) if msg.contains("not loaded")));
    }
}
