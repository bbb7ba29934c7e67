use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) const EXTRACTION_ATTEMPTS_TOTAL: &str = "extraction_attempts_total";
pub(crate) const EXTRACTION_DURATION_SECONDS: &str = "extraction_duration_seconds";
pub(crate) const QUESTION_GRADES_TOTAL: &str = "question_grades_total";
pub(crate) const EVALUATION_RUNS_TOTAL: &str = "evaluation_runs_total";
pub(crate) const EVALUATION_DURATION_SECONDS: &str = "evaluation_duration_seconds";

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!(
        EXTRACTION_ATTEMPTS_TOTAL,
        "Backend extraction attempts by backend and outcome"
    );
    metrics::describe_histogram!(
        EXTRACTION_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Wall-clock time of a single backend extraction call"
    );
    metrics::describe_counter!(QUESTION_GRADES_TOTAL, "Per-question grades by outcome");
    metrics::describe_counter!(EVALUATION_RUNS_TOTAL, "Submission evaluation runs by status");
    metrics::describe_histogram!(
        EVALUATION_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Wall-clock time of a full submission evaluation"
    );
}
