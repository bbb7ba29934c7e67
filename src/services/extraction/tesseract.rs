use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{BackendOutput, ContentKind, ExtractionBackend, ExtractionFailure, ExtractionInput};
use crate::core::config::Settings;
use crate::schemas::types::BackendKind;

/// Local Tesseract OCR engine driven as a subprocess.
#[derive(Debug, Clone)]
pub struct TesseractBackend {
    command: String,
    language: String,
    psm: u8,
}

impl TesseractBackend {
    pub fn new(command: impl Into<String>, language: impl Into<String>, psm: u8) -> Self {
        Self { command: command.into(), language: language.into(), psm }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let tesseract = settings.tesseract();
        Self::new(tesseract.command.clone(), tesseract.language.clone(), tesseract.psm)
    }
}

#[async_trait]
impl ExtractionBackend for TesseractBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Tesseract
    }

    async fn extract(&self, input: &ExtractionInput) -> Result<BackendOutput, ExtractionFailure> {
        let content = input.require_content()?;
        if content == ContentKind::Pdf {
            return Err(ExtractionFailure::UnsupportedContent(
                "tesseract reads images, not PDF".to_string(),
            ));
        }

        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", &self.language, "--psm"])
            .arg(self.psm.to_string())
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => ExtractionFailure::Unavailable(format!(
                    "tesseract binary `{}` not found",
                    self.command
                )),
                _ => ExtractionFailure::Unavailable(format!("failed to start tesseract: {err}")),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let bytes = input.bytes.clone();
            tokio::spawn(async move {
                if let Err(err) = stdin.write_all(&bytes).await {
                    tracing::debug!(error = %err, "tesseract closed stdin early");
                }
            });
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| ExtractionFailure::Transport(format!("tesseract I/O failed: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionFailure::CorruptInput(
                stderr.lines().last().unwrap_or("tesseract exited with an error").trim().to_string(),
            ));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        Ok(parse_tsv(&tsv))
    }
}

/// Rebuilds text lines from Tesseract TSV rows and averages the word
/// confidences into `[0, 1]`.
fn parse_tsv(tsv: &str) -> BackendOutput {
    let mut lines: BTreeMap<(u32, u32, u32, u32), Vec<&str>> = BTreeMap::new();
    let mut confidence_sum = 0.0;
    let mut words = 0_u32;

    for row in tsv.lines().skip(1) {
        let columns: Vec<&str> = row.split('\t').collect();
        if columns.len() < 12 || columns[0] != "5" {
            continue;
        }
        let word = columns[11].trim();
        let Ok(confidence) = columns[10].trim().parse::<f64>() else {
            continue;
        };
        if word.is_empty() || confidence < 0.0 {
            continue;
        }

        let position = |index: usize| columns[index].trim().parse::<u32>().unwrap_or(0);
        lines.entry((position(1), position(2), position(3), position(4))).or_default().push(word);
        confidence_sum += confidence;
        words += 1;
    }

    let text = lines.values().map(|words| words.join(" ")).collect::<Vec<_>>().join("\n");
    let output = BackendOutput::new(text);
    if words == 0 {
        return output;
    }
    output.with_confidence(confidence_sum / f64::from(words) / 100.0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const SAMPLE_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t
4\t1\t1\t1\t1\t0\t10\t10\t300\t20\t-1\t
5\t1\t1\t1\t1\t1\t10\t10\t80\t20\t96.5\tWater
5\t1\t1\t1\t1\t2\t95\t10\t60\t20\t91.0\tboils
5\t1\t1\t1\t2\t1\t10\t40\t40\t20\t88.5\tat
5\t1\t1\t1\t2\t2\t55\t40\t50\t20\t84.0\t100C
5\t1\t1\t1\t2\t3\t110\t40\t5\t20\t-1\t
";

    #[test]
    fn tsv_rows_become_lines_with_mean_confidence() {
        let output = parse_tsv(SAMPLE_TSV);
        assert_eq!(output.text, "Water boils\nat 100C");
        let confidence = output.confidence.expect("confidence");
        assert!((confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn empty_tsv_has_no_confidence() {
        let output = parse_tsv("level\tpage_num\n");
        assert_eq!(output.text, "");
        assert_eq!(output.confidence, None);
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let backend = TesseractBackend::new("definitely-not-a-real-tesseract-binary", "eng", 6);
        let input = ExtractionInput::new(Arc::from(&b"\x89PNG\r\n\x1a\npixels"[..]), "image/png");

        let result = backend.extract(&input).await;
        assert!(matches!(result, Err(ExtractionFailure::Unavailable(_))));
    }

    #[tokio::test]
    async fn pdf_is_unsupported() {
        let backend = TesseractBackend::new("tesseract", "eng", 6);
        let input = ExtractionInput::new(Arc::from(&b"%PDF-1.4"[..]), "");

        let result = backend.extract(&input).await;
        assert!(matches!(result, Err(ExtractionFailure::UnsupportedContent(_))));
    }
}
