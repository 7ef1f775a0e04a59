//! The logging collaborator contract.

use mlorch_types::event::FlowEvent;
use mlorch_types::result::StepStatus;

/// Receiver of flow lifecycle events.
///
/// Implementations must be fire-and-forget: `emit` never blocks on I/O and
/// never fails the flow.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &FlowEvent);
}

/// Writes every event as a structured `tracing` record tagged with the
/// execution id.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &FlowEvent) {
        match event {
            FlowEvent::FlowStarted {
                execution_id,
                flow_name,
                total_stages,
            } => {
                tracing::info!(
                    execution_id = %execution_id,
                    flow = flow_name.as_str(),
                    stages = total_stages,
                    "flow_started"
                );
            }
            FlowEvent::StageStarted {
                execution_id,
                stage_index,
                steps,
            } => {
                tracing::info!(
                    execution_id = %execution_id,
                    stage = stage_index,
                    steps = ?steps,
                    "stage_started"
                );
            }
            FlowEvent::StepStarted {
                execution_id,
                stage_index,
                step_name,
            } => {
                tracing::debug!(
                    execution_id = %execution_id,
                    stage = stage_index,
                    step = step_name.as_str(),
                    "step_started"
                );
            }
            FlowEvent::StepFinished {
                execution_id,
                stage_index,
                step_name,
                status,
                error_kind,
                attempts,
                duration_ms,
            } => {
                if *status == StepStatus::Failed {
                    tracing::warn!(
                        execution_id = %execution_id,
                        stage = stage_index,
                        step = step_name.as_str(),
                        status = %status,
                        error_kind = ?error_kind,
                        attempts,
                        duration_ms,
                        "step_finished"
                    );
                } else {
                    tracing::info!(
                        execution_id = %execution_id,
                        stage = stage_index,
                        step = step_name.as_str(),
                        status = %status,
                        attempts,
                        duration_ms,
                        "step_finished"
                    );
                }
            }
            FlowEvent::FlowFinished {
                execution_id,
                flow_name,
                status,
                duration_ms,
            } => {
                tracing::info!(
                    execution_id = %execution_id,
                    flow = flow_name.as_str(),
                    status = %status,
                    duration_ms,
                    "flow_finished"
                );
            }
        }
    }
}
