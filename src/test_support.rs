use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::schemas::evaluation::{EvaluationRequest, EvaluationResult, QuestionResult, QuestionSpec};
use crate::schemas::types::{BackendKind, EvaluationStatus, QuestionOutcome, QuestionType};
use crate::services::extraction::{BackendOutput, ExtractionBackend, ExtractionFailure, ExtractionInput};

pub(crate) const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-image-body";

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("GRADER_ENV", "test");
    std::env::set_var("GRADER_STRICT_CONFIG", "0");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    for key in [
        "OPENAI_API_KEY",
        "OPENAI_BASE_URL",
        "HANDWRITING_ENDPOINT",
        "HANDWRITING_API_KEY",
        "TESSERACT_CMD",
        "EXTRACTION_TIMEOUT_SECONDS",
        "EXTRACTION_MIN_CONFIDENCE",
        "SCORE_WEIGHT_RELEVANCE",
        "SCORE_WEIGHT_ACCURACY",
        "SCORE_WEIGHT_COMPLETENESS",
        "SCORE_WEIGHT_GRAMMAR",
        "SCORE_WEIGHT_WORD_COUNT",
        "FEEDBACK_STRONG_THRESHOLD",
        "FEEDBACK_WEAK_THRESHOLD",
        "KEY_POINT_COVERAGE",
        "EVALUATION_MAX_CONCURRENCY",
    ] {
        std::env::remove_var(key);
    }
}

/// Backend stub that replays a fixed response and counts calls.
#[derive(Clone)]
pub(crate) struct ScriptedBackend {
    kind: BackendKind,
    response: Result<BackendOutput, ExtractionFailure>,
    delay: Option<Duration>,
    scoped: bool,
    panics: bool,
    calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    fn build(kind: BackendKind, response: Result<BackendOutput, ExtractionFailure>) -> Self {
        Self { kind, response, delay: None, scoped: false, panics: false, calls: Arc::default() }
    }

    pub(crate) fn ok(kind: BackendKind, text: &str) -> Arc<Self> {
        Arc::new(Self::build(kind, Ok(BackendOutput::new(text))))
    }

    pub(crate) fn failing(kind: BackendKind, failure: ExtractionFailure) -> Arc<Self> {
        Arc::new(Self::build(kind, Err(failure)))
    }

    pub(crate) fn panicking(kind: BackendKind) -> Arc<Self> {
        Arc::new(Self { panics: true, ..Self::build(kind, Err(ExtractionFailure::EmptyResult)) })
    }

    pub(crate) fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay: Some(delay), ..(*self).clone() })
    }

    pub(crate) fn with_confidence(self: Arc<Self>, confidence: f64) -> Arc<Self> {
        let response = self.response.clone().map(|output| output.with_confidence(confidence));
        Arc::new(Self { response, ..(*self).clone() })
    }

    pub(crate) fn scoped(self: Arc<Self>) -> Arc<Self> {
        Arc::new(Self { scoped: true, ..(*self).clone() })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn scopes_to_question(&self) -> bool {
        self.scoped
    }

    async fn extract(&self, _input: &ExtractionInput) -> Result<BackendOutput, ExtractionFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panics {
            panic!("scripted backend panic");
        }
        self.response.clone()
    }
}

pub(crate) fn question(id: &str, answer_key: &str, max_score: f64) -> QuestionSpec {
    QuestionSpec {
        id: id.to_string(),
        text: String::new(),
        answer_key: answer_key.to_string(),
        max_score,
        min_word_count: 0,
        question_type: QuestionType::Text,
        order: 0,
    }
}

pub(crate) fn request(submission_id: &str, questions: Vec<QuestionSpec>) -> EvaluationRequest {
    EvaluationRequest::new(submission_id, PNG_BYTES.to_vec(), "image/png", questions)
}

pub(crate) fn evaluation_result(
    submission_id: &str,
    question_ids: &[&str],
    final_score: f64,
) -> EvaluationResult {
    let per_question: Vec<QuestionResult> = question_ids
        .iter()
        .map(|id| QuestionResult {
            question_id: id.to_string(),
            order: 0,
            max_score: 5.0,
            outcome: QuestionOutcome::Graded,
            extracted_text: "answer".to_string(),
            source_backend: Some(BackendKind::Tesseract),
            confidence: None,
            relevance_score: 1.0,
            accuracy_score: 1.0,
            grammar_score: 1.0,
            completeness_score: 1.0,
            word_count_score: 1.0,
            final_score,
            detailed_feedback: String::new(),
            strengths: Vec::new(),
            improvements: Vec::new(),
            grammar_issues: Vec::new(),
            extraction_attempts: Vec::new(),
            error: None,
        })
        .collect();

    let now = crate::core::time::format_offset(crate::core::time::now_utc());
    EvaluationResult {
        run_id: Uuid::new_v4(),
        submission_id: submission_id.to_string(),
        status: EvaluationStatus::Complete,
        total_score: final_score * per_question.len() as f64,
        max_possible_score: 5.0 * per_question.len() as f64,
        file_sha256: String::new(),
        started_at: now.clone(),
        completed_at: now,
        per_question,
        error: None,
    }
}

/// Serves one HTTP response on a local port and hands back the raw request.
pub(crate) async fn serve_json(status: u16, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut buffer = [0_u8; 4096];
        loop {
            let read = socket.read(&mut buffer).await.expect("read request");
            if read == 0 {
                break;
            }
            request.extend_from_slice(&buffer[..read]);
            if request_complete(&request) {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {status} Test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.expect("write response");
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&request).into_owned()
    });

    (format!("http://{addr}"), handle)
}

fn request_complete(request: &[u8]) -> bool {
    let Some(header_end) = request.windows(4).position(|window| window == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    request.len() >= header_end + 4 + content_length
}
