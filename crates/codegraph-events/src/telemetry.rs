use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info};
use uuid::Uuid;

const TELEMETRY_TARGET: &str = "codegraph::events::telemetry";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BatchLifecycle {
    Start,
    FileSuccess,
    FileFailure,
    Finish,
}

impl fmt::Display for BatchLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "run_start"),
            Self::FileSuccess => write!(f, "file_success"),
            Self::FileFailure => write!(f, "file_failure"),
            Self::Finish => write!(f, "run_finish"),
        }
    }
}

/// A single telemetry record for one batch run, tagged with a
/// correlation id so every file-level event from the same run can be
/// grouped in a log query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTelemetry {
    pub correlation_id: String,
    pub lifecycle: BatchLifecycle,
    pub file: Option<String>,
    pub error_kind: Option<String>,
    pub message: Option<String>,
}

pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn run_start(correlation_id: &str, total_files: usize) -> BatchTelemetry {
    let telemetry = BatchTelemetry {
        correlation_id: correlation_id.to_string(),
        lifecycle: BatchLifecycle::Start,
        file: None,
        error_kind: None,
        message: None,
    };
    info!(
        target: TELEMETRY_TARGET,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        total_files,
        "run_start"
    );
    telemetry
}

pub fn file_success(correlation_id: &str, file: &str) -> BatchTelemetry {
    let telemetry = BatchTelemetry {
        correlation_id: correlation_id.to_string(),
        lifecycle: BatchLifecycle::FileSuccess,
        file: Some(file.to_string()),
        error_kind: None,
        message: None,
    };
    info!(
        target: TELEMETRY_TARGET,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        file = %file,
        "file_success"
    );
    telemetry
}

pub fn file_failure(correlation_id: &str, file: &str, error_kind: &str, message: &str) -> BatchTelemetry {
    let telemetry = BatchTelemetry {
        correlation_id: correlation_id.to_string(),
        lifecycle: BatchLifecycle::FileFailure,
        file: Some(file.to_string()),
        error_kind: Some(error_kind.to_string()),
        message: Some(message.to_string()),
    };
    error!(
        target: TELEMETRY_TARGET,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        file = %file,
        error_kind = %error_kind,
        message = %message,
        "file_failure"
    );
    telemetry
}

pub fn run_success(correlation_id: &str, successful: usize) -> BatchTelemetry {
    let telemetry = BatchTelemetry {
        correlation_id: correlation_id.to_string(),
        lifecycle: BatchLifecycle::Finish,
        file: None,
        error_kind: None,
        message: Some(format!("{successful} file(s) succeeded")),
    };
    info!(
        target: TELEMETRY_TARGET,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        successful,
        "run_finish"
    );
    telemetry
}

pub fn run_failure(correlation_id: &str, successful: usize, failed: usize, cancelled: bool) -> BatchTelemetry {
    let telemetry = BatchTelemetry {
        correlation_id: correlation_id.to_string(),
        lifecycle: BatchLifecycle::Finish,
        file: None,
        error_kind: None,
        message: Some(format!("{successful} succeeded, {failed} failed, cancelled={cancelled}")),
    };
    error!(
        target: TELEMETRY_TARGET,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        successful,
        failed,
        cancelled,
        "run_finish"
    );
    telemetry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_uuid_like() {
        let id = new_correlation_id();
        assert!(!id.is_empty());
        assert_eq!(id.len(), 36);
    }

    #[test]
    fn lifecycle_events_carry_correlation_id() {
        let correlation_id = new_correlation_id();
        let start = run_start(&correlation_id, 3);
        let success = file_success(&correlation_id, "a.ts");
        let failure = file_failure(&correlation_id, "b.ts", "ParseError", "boom");

        assert_eq!(start.lifecycle, BatchLifecycle::Start);
        assert_eq!(success.lifecycle, BatchLifecycle::FileSuccess);
        assert_eq!(success.file.as_deref(), Some("a.ts"));
        assert_eq!(failure.lifecycle, BatchLifecycle::FileFailure);
        assert_eq!(failure.error_kind.as_deref(), Some("ParseError"));
    }
}
