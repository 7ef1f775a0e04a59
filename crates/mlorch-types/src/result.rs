//! Step and flow result types.
//!
//! A `StepResult` is the terminal record of one step; a `FlowResult` is the
//! aggregated report returned to the caller once a workflow has finished.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Step results
// ---------------------------------------------------------------------------

/// Terminal status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Classification of a step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    /// The call exceeded its timeout on the final attempt.
    Timeout,
    /// Connection-level failure or a 5xx response on the final attempt.
    Transport,
    /// The remote function rejected the call (4xx) or returned an unusable body.
    RemoteRejected,
    /// The payload could not be built from the context.
    Mapping,
    /// The step task panicked or was cancelled unexpectedly.
    Internal,
    /// A transient failure could not be retried before the flow deadline.
    DeadlineExceeded,
}

impl std::fmt::Display for StepErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepErrorKind::Timeout => "timeout",
            StepErrorKind::Transport => "transport",
            StepErrorKind::RemoteRejected => "remote_rejected",
            StepErrorKind::Mapping => "mapping",
            StepErrorKind::Internal => "internal",
            StepErrorKind::DeadlineExceeded => "deadline_exceeded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: StepErrorKind,
    pub message: String,
}

/// Terminal record of one step.
///
/// `output` is set iff `status == Success`, `error` iff `Failed`,
/// `skip_reason` iff `Skipped`. `error` is always serialized (`null` when
/// absent); the other optional fields are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub stage_index: usize,
    pub status: StepStatus,
    /// Wall-clock time in milliseconds, serialized as `duration`.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    /// Number of remote calls made (0 when the step never reached the network).
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<StepError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Last HTTP status code observed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl StepResult {
    pub fn success(
        step_name: impl Into<String>,
        stage_index: usize,
        output: Value,
        attempts: u32,
        duration_ms: u64,
        status_code: Option<u16>,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            stage_index,
            status: StepStatus::Success,
            duration_ms,
            attempts,
            output: Some(output),
            error: None,
            skip_reason: None,
            status_code,
        }
    }

    pub fn failed(
        step_name: impl Into<String>,
        stage_index: usize,
        kind: StepErrorKind,
        message: impl Into<String>,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            stage_index,
            status: StepStatus::Failed,
            duration_ms,
            attempts,
            output: None,
            error: Some(StepError {
                kind,
                message: message.into(),
            }),
            skip_reason: None,
            status_code: None,
        }
    }

    pub fn skipped(
        step_name: impl Into<String>,
        stage_index: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            stage_index,
            status: StepStatus::Skipped,
            duration_ms: 0,
            attempts: 0,
            output: None,
            error: None,
            skip_reason: Some(reason.into()),
            status_code: None,
        }
    }

    pub fn with_status_code(mut self, status_code: Option<u16>) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn error_kind(&self) -> Option<StepErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

// ---------------------------------------------------------------------------
// Flow results
// ---------------------------------------------------------------------------

/// Overall outcome of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    /// Every executed step succeeded.
    Success,
    /// Only optional steps failed.
    Partial,
    /// A critical step failed or the overall deadline aborted the run.
    Failed,
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowStatus::Success => write!(f, "success"),
            FlowStatus::Partial => write!(f, "partial"),
            FlowStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Reason a flow was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowErrorKind {
    DeadlineExceeded,
    CriticalStepFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowError {
    pub kind: FlowErrorKind,
    pub message: String,
}

/// Per-status step counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSummary {
    pub total_steps: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl FlowSummary {
    pub fn from_results(results: &[StepResult]) -> Self {
        let mut summary = Self {
            total_steps: results.len(),
            ..Self::default()
        };
        for r in results {
            match r.status {
                StepStatus::Success => summary.successful += 1,
                StepStatus::Failed => summary.failed += 1,
                StepStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }
}

/// Aggregated report for one orchestration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowResult {
    pub execution_id: Uuid,
    pub flow_name: String,
    pub user_id: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    /// Wall-clock time in milliseconds, serialized as `duration`.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    pub status: FlowStatus,
    /// Flow-level abort reason; `null` unless the flow was aborted.
    #[serde(default)]
    pub error: Option<FlowError>,
    pub summary: FlowSummary,
    /// Step results in stage order, then declaration order.
    pub results: Vec<StepResult>,
    /// Request parameters echoed back (identifier, vacancy_id, ...).
    #[serde(default, flatten)]
    pub echoed: BTreeMap<String, Value>,
}

impl FlowResult {
    pub fn is_success(&self) -> bool {
        self.status == FlowStatus::Success
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.step_name == name)
    }
}
