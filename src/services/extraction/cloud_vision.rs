use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};

use super::{
    classify_status, response_error_message, BackendOutput, ContentKind, ExtractionBackend,
    ExtractionFailure, ExtractionInput,
};
use crate::core::config::Settings;
use crate::schemas::types::BackendKind;

const TRANSCRIPTION_SYSTEM_PROMPT: &str = "You transcribe student exam answer sheets. \
Return the text exactly as the student wrote it, keeping line breaks and any question numbers. \
Do not correct spelling or grammar, do not summarize and do not add commentary. \
If nothing on the page is legible, return an empty response.";

/// Multimodal chat-completions model reached over an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct CloudVisionBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    request_timeout: Duration,
}

impl CloudVisionBackend {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let request_timeout = Duration::from_secs(settings.extraction().timeout_seconds);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(request_timeout)
            .build()
            .context("Failed to build vision HTTP client")?;

        let cloud = settings.cloud();
        Ok(Self {
            client,
            api_key: cloud.api_key.clone(),
            base_url: cloud.base_url.trim_end_matches('/').to_string(),
            model: cloud.model.clone(),
            max_tokens: cloud.max_tokens,
            temperature: cloud.temperature,
            request_timeout,
        })
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.base_url.is_empty()
    }

    fn build_payload(&self, input: &ExtractionInput, content: ContentKind) -> Value {
        let user_prompt = match &input.hint {
            Some(hint) if hint.total > 1 => format!(
                "This sheet answers {} questions. Transcribe only the student's answer to question {}{}. \
                 Return an empty response if that answer is not on the sheet.",
                hint.total,
                hint.ordinal,
                if hint.text.trim().is_empty() {
                    String::new()
                } else {
                    format!(" (\"{}\")", hint.text.trim())
                }
            ),
            _ => "Transcribe all of the student's writing on this answer sheet.".to_string(),
        };

        let encoded = BASE64.encode(&input.bytes);
        let attachment = if content.is_image() {
            json!({
                "type": "image_url",
                "image_url": {"url": format!("data:{};base64,{encoded}", content.mime())}
            })
        } else {
            json!({
                "type": "file",
                "file": {
                    "filename": format!("answer.{}", content.extension()),
                    "file_data": format!("data:{};base64,{encoded}", content.mime())
                }
            })
        };

        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": TRANSCRIPTION_SYSTEM_PROMPT},
                {"role": "user", "content": [
                    {"type": "text", "text": user_prompt},
                    attachment
                ]}
            ],
            "max_completion_tokens": self.max_tokens,
            "temperature": self.temperature
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> ExtractionFailure {
        if err.is_timeout() {
            ExtractionFailure::Timeout(u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX))
        } else if err.is_connect() {
            ExtractionFailure::Unavailable(format!("vision API unreachable: {err}"))
        } else {
            ExtractionFailure::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl ExtractionBackend for CloudVisionBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::CloudVision
    }

    fn scopes_to_question(&self) -> bool {
        true
    }

    async fn extract(&self, input: &ExtractionInput) -> Result<BackendOutput, ExtractionFailure> {
        if !self.is_configured() {
            return Err(ExtractionFailure::NotConfigured(
                "OPENAI_API_KEY and OPENAI_BASE_URL are required".to_string(),
            ));
        }
        let content = input.require_content()?;
        let payload = self.build_payload(input, content);

        tracing::debug!(model = %self.model, content = content.mime(), "Sending vision transcription request");

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| self.map_send_error(err))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(classify_status(status, response_error_message(&body)));
        }

        let text = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| ExtractionFailure::InvalidResponse("missing message content".to_string()))?;

        Ok(BackendOutput::new(text))
    }
}
