//! Execution events emitted by the flow executor.
//!
//! `FlowEvent` is Clone + Send + Sync so it can travel over tokio broadcast
//! channels as well as into the tracing sink.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::result::{FlowStatus, StepErrorKind, StepStatus};

/// Lifecycle events of a single workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    /// A flow was selected for a request and is about to run.
    FlowStarted {
        execution_id: Uuid,
        flow_name: String,
        total_stages: usize,
    },

    /// A stage began dispatching its steps.
    StageStarted {
        execution_id: Uuid,
        stage_index: usize,
        steps: Vec<String>,
    },

    /// A step was handed to the step executor.
    StepStarted {
        execution_id: Uuid,
        stage_index: usize,
        step_name: String,
    },

    /// A step reached a terminal status.
    StepFinished {
        execution_id: Uuid,
        stage_index: usize,
        step_name: String,
        status: StepStatus,
        error_kind: Option<StepErrorKind>,
        attempts: u32,
        duration_ms: u64,
    },

    /// The flow completed or was aborted.
    FlowFinished {
        execution_id: Uuid,
        flow_name: String,
        status: FlowStatus,
        duration_ms: u64,
    },
}

impl FlowEvent {
    pub fn execution_id(&self) -> Uuid {
        match self {
            FlowEvent::FlowStarted { execution_id, .. }
            | FlowEvent::StageStarted { execution_id, .. }
            | FlowEvent::StepStarted { execution_id, .. }
            | FlowEvent::StepFinished { execution_id, .. }
            | FlowEvent::FlowFinished { execution_id, .. } => *execution_id,
        }
    }

    /// Short event name, matching the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            FlowEvent::FlowStarted { .. } => "flow_started",
            FlowEvent::StageStarted { .. } => "stage_started",
            FlowEvent::StepStarted { .. } => "step_started",
            FlowEvent::StepFinished { .. } => "step_finished",
            FlowEvent::FlowFinished { .. } => "flow_finished",
        }
    }
}
