//! Flow executor: stage-by-stage execution with bounded parallelism.
//!
//! The `FlowExecutor` runs a workflow's stages strictly in order. Steps of a
//! stage run concurrently via `tokio::JoinSet`, at most `max_concurrency` at
//! a time (a per-stage `Semaphore`). Each stage ends at a barrier: every
//! dispatched step must be terminal, and successful outputs are folded into
//! the context, before the next stage begins.
//!
//! # Abort policy
//!
//! - A failed `critical` step lets in-flight calls of its stage finish,
//!   cancels the queued ones (recorded `skipped`) and skips every later stage.
//! - The overall deadline is checked before each stage, before each queued
//!   step starts and at every barrier, the last one included. Once it has
//!   passed nothing new starts and the flow is `failed` with
//!   `deadline_exceeded`; calls already in flight run to completion.
//! - `optional` failures never stop the flow.
//!
//! The executor performs no I/O itself; remote calls go through the
//! `StepExecutor`. A panicking step task is reported as a failed step of
//! kind `internal`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use mlorch_types::event::FlowEvent;
use mlorch_types::request::ECHOED_FIELDS;
use mlorch_types::result::{
    FlowError, FlowErrorKind, FlowResult, FlowStatus, FlowSummary, StepErrorKind, StepResult,
    StepStatus,
};
use mlorch_types::workflow::{Stage, StepSpec, WorkflowDefinition};

use crate::event::EventSink;

use super::context::ExecutionContext;
use super::expression::WorkflowEvaluator;
use super::invoker::RemoteInvoker;
use super::step_executor::{StepDefaults, StepExecutor};

/// Default overall deadline for one flow (matches the service request timeout).
pub const DEFAULT_FLOW_DEADLINE: Duration = Duration::from_secs(540);

// ---------------------------------------------------------------------------
// Event fan-out
// ---------------------------------------------------------------------------

/// Shared, cheaply clonable list of sinks.
#[derive(Clone, Default)]
struct Emitter(Arc<Vec<Arc<dyn EventSink>>>);

impl Emitter {
    fn emit(&self, event: FlowEvent) {
        for sink in self.0.iter() {
            sink.emit(&event);
        }
    }

    fn step_finished(&self, execution_id: uuid::Uuid, result: &StepResult) {
        self.emit(FlowEvent::StepFinished {
            execution_id,
            stage_index: result.stage_index,
            step_name: result.step_name.clone(),
            status: result.status,
            error_kind: result.error_kind(),
            attempts: result.attempts,
            duration_ms: result.duration_ms,
        });
    }
}

// ---------------------------------------------------------------------------
// Task outcome
// ---------------------------------------------------------------------------

/// What a spawned step task reports back to the stage collector.
enum TaskOutcome {
    Finished(StepResult),
    /// The step never started: the stage was aborted while it was queued.
    Cancelled,
    /// The step never started: the flow deadline passed while it was queued.
    DeadlineReached,
}

// ---------------------------------------------------------------------------
// FlowExecutor
// ---------------------------------------------------------------------------

/// Staged workflow executor, generic over the remote-call collaborator.
pub struct FlowExecutor<I> {
    step_executor: Arc<StepExecutor<I>>,
    defaults: StepDefaults,
    flow_deadline: Duration,
    emitter: Emitter,
}

impl<I: RemoteInvoker + 'static> FlowExecutor<I> {
    pub fn new(invoker: Arc<I>, defaults: StepDefaults) -> Self {
        Self {
            step_executor: Arc::new(StepExecutor::new(invoker)),
            defaults,
            flow_deadline: DEFAULT_FLOW_DEADLINE,
            emitter: Emitter::default(),
        }
    }

    /// Set the overall deadline used when a workflow does not set its own.
    pub fn with_flow_deadline(mut self, deadline: Duration) -> Self {
        self.flow_deadline = deadline;
        self
    }

    /// Register an event sink. Events go to every registered sink in order.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        Arc::make_mut(&mut self.emitter.0).push(sink);
        self
    }

    /// Deadline for a run of `workflow` starting now.
    pub fn deadline_for(&self, workflow: &WorkflowDefinition) -> Instant {
        let budget = workflow
            .deadline_secs
            .map(Duration::from_secs)
            .unwrap_or(self.flow_deadline);
        Instant::now() + budget
    }

    /// Run `workflow` with its configured overall deadline.
    pub async fn run(&self, workflow: &WorkflowDefinition, ctx: ExecutionContext) -> FlowResult {
        let deadline = self.deadline_for(workflow);
        self.run_until(workflow, ctx, deadline).await
    }

    /// Run `workflow` until completion, abort, or `deadline`.
    pub async fn run_until(
        &self,
        workflow: &WorkflowDefinition,
        mut ctx: ExecutionContext,
        deadline: Instant,
    ) -> FlowResult {
        let run_start = Instant::now();
        let execution_id = ctx.execution_id;

        tracing::info!(
            execution_id = %execution_id,
            flow = workflow.name.as_str(),
            user_id = ctx.request.user_id.as_str(),
            stages = workflow.stages.len(),
            steps = workflow.step_count(),
            "starting flow execution"
        );
        self.emitter.emit(FlowEvent::FlowStarted {
            execution_id,
            flow_name: workflow.name.clone(),
            total_stages: workflow.stages.len(),
        });

        let mut results: Vec<StepResult> = Vec::with_capacity(workflow.step_count());
        let mut abort: Option<FlowError> = None;

        for (stage_idx, stage) in workflow.stages.iter().enumerate() {
            if abort.is_none() && Instant::now() >= deadline {
                tracing::warn!(
                    execution_id = %execution_id,
                    stage = stage_idx,
                    "flow deadline exceeded before stage start"
                );
                abort = Some(deadline_error());
            }

            if let Some(reason) = &abort {
                for step in &stage.steps {
                    let skipped = StepResult::skipped(&step.name, stage_idx, skip_reason(reason));
                    self.emitter.step_finished(execution_id, &skipped);
                    results.push(skipped);
                }
                continue;
            }

            self.emitter.emit(FlowEvent::StageStarted {
                execution_id,
                stage_index: stage_idx,
                steps: stage.steps.iter().map(|s| s.name.clone()).collect(),
            });

            let (stage_results, stage_abort) =
                self.run_stage(stage_idx, stage, &ctx, deadline).await;

            // Barrier: fold outputs before the next stage may read them.
            for result in &stage_results {
                if let (StepStatus::Success, Some(output)) = (result.status, &result.output) {
                    if let Err(err) = ctx.record_output(&result.step_name, output.clone()) {
                        tracing::error!(
                            execution_id = %execution_id,
                            error = %err,
                            "duplicate step output"
                        );
                    }
                }
            }
            results.extend(stage_results);
            abort = stage_abort;

            if abort.is_none() && Instant::now() >= deadline {
                tracing::warn!(
                    execution_id = %execution_id,
                    stage = stage_idx,
                    "flow deadline exceeded while stage was running"
                );
                abort = Some(deadline_error());
            }
        }

        let status = flow_status(&results, abort.as_ref());
        let duration_ms = run_start.elapsed().as_millis() as u64;

        tracing::info!(
            execution_id = %execution_id,
            flow = workflow.name.as_str(),
            status = %status,
            duration_ms,
            outputs = ctx.output_count(),
            "flow execution finished"
        );
        self.emitter.emit(FlowEvent::FlowFinished {
            execution_id,
            flow_name: workflow.name.clone(),
            status,
            duration_ms,
        });

        let echoed: BTreeMap<String, serde_json::Value> = ECHOED_FIELDS
            .iter()
            .filter_map(|field| ctx.request_field(field).map(|v| (field.to_string(), v.clone())))
            .collect();

        FlowResult {
            execution_id,
            flow_name: workflow.name.clone(),
            user_id: ctx.request.user_id.clone(),
            session_id: ctx.request.session_id.clone(),
            started_at: ctx.started_at,
            duration_ms,
            status,
            error: abort,
            summary: FlowSummary::from_results(&results),
            results,
            echoed,
        }
    }

    /// Run one stage to its barrier.
    ///
    /// Returns the stage's results in declaration order and the abort reason,
    /// if the stage ended the flow.
    async fn run_stage(
        &self,
        stage_idx: usize,
        stage: &Stage,
        ctx: &ExecutionContext,
        deadline: Instant,
    ) -> (Vec<StepResult>, Option<FlowError>) {
        let execution_id = ctx.execution_id;
        let mut slots = evaluate_conditions(stage_idx, stage, ctx);
        for result in slots.iter().flatten() {
            self.emitter.step_finished(execution_id, result);
        }

        let snapshot = Arc::new(ctx.clone());
        let semaphore = Arc::new(Semaphore::new(stage.effective_concurrency()));
        let cancel = CancellationToken::new();
        let mut join_set = JoinSet::new();
        let mut task_slots: HashMap<tokio::task::Id, usize> = HashMap::new();

        for (slot, step) in stage.steps.iter().enumerate() {
            if slots[slot].is_some() {
                continue;
            }

            let step = step.clone();
            let step_ctx = Arc::clone(&snapshot);
            let runner = Arc::clone(&self.step_executor);
            let semaphore = Arc::clone(&semaphore);
            let token = cancel.clone();
            let emitter = self.emitter.clone();
            let defaults = self.defaults;

            let handle = join_set.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = token.cancelled() => return (slot, TaskOutcome::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => {
                        return (slot, TaskOutcome::DeadlineReached);
                    }
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_closed) => return (slot, TaskOutcome::Cancelled),
                    },
                };
                if token.is_cancelled() {
                    return (slot, TaskOutcome::Cancelled);
                }
                if Instant::now() >= deadline {
                    return (slot, TaskOutcome::DeadlineReached);
                }

                emitter.emit(FlowEvent::StepStarted {
                    execution_id: step_ctx.execution_id,
                    stage_index: stage_idx,
                    step_name: step.name.clone(),
                });
                let result = runner
                    .execute(&step, stage_idx, &step_ctx, &defaults, deadline)
                    .await;
                (slot, TaskOutcome::Finished(result))
            });
            task_slots.insert(handle.id(), slot);
        }

        let mut abort: Option<FlowError> = None;

        while let Some(joined) = join_set.join_next().await {
            let (slot, outcome) = match joined {
                Ok(pair) => pair,
                Err(join_err) => {
                    let Some(&slot) = task_slots.get(&join_err.id()) else {
                        tracing::error!(
                            execution_id = %execution_id,
                            error = %join_err,
                            "unknown step task failed"
                        );
                        continue;
                    };
                    tracing::error!(
                        execution_id = %execution_id,
                        step = stage.steps[slot].name.as_str(),
                        error = %join_err,
                        "step task panicked"
                    );
                    let failed = StepResult::failed(
                        &stage.steps[slot].name,
                        stage_idx,
                        StepErrorKind::Internal,
                        format!("step task failed: {join_err}"),
                        0,
                        0,
                    );
                    (slot, TaskOutcome::Finished(failed))
                }
            };

            let step: &StepSpec = &stage.steps[slot];
            let result = match outcome {
                TaskOutcome::Finished(result) => {
                    let failed = result.status == StepStatus::Failed;
                    if failed && step.is_critical() && abort.is_none() {
                        tracing::error!(
                            execution_id = %execution_id,
                            stage = stage_idx,
                            step = step.name.as_str(),
                            "critical step failed, aborting flow"
                        );
                        let kind = result.error_kind();
                        abort = Some(if kind == Some(StepErrorKind::DeadlineExceeded) {
                            deadline_error()
                        } else {
                            FlowError {
                                kind: FlowErrorKind::CriticalStepFailed,
                                message: format!("critical step '{}' failed", step.name),
                            }
                        });
                        cancel.cancel();
                    }
                    result
                }
                TaskOutcome::DeadlineReached => {
                    if abort.is_none() {
                        abort = Some(deadline_error());
                        cancel.cancel();
                    }
                    StepResult::skipped(&step.name, stage_idx, skip_reason(&deadline_error()))
                }
                TaskOutcome::Cancelled => {
                    let reason = abort
                        .as_ref()
                        .map(skip_reason)
                        .unwrap_or_else(|| "cancelled".to_string());
                    StepResult::skipped(&step.name, stage_idx, reason)
                }
            };

            self.emitter.step_finished(execution_id, &result);
            slots[slot] = Some(result);
        }

        let results = slots
            .into_iter()
            .zip(&stage.steps)
            .map(|(slot, step)| {
                slot.unwrap_or_else(|| {
                    StepResult::failed(
                        &step.name,
                        stage_idx,
                        StepErrorKind::Internal,
                        "step produced no result",
                        0,
                        0,
                    )
                })
            })
            .collect();

        (results, abort)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Evaluate step conditions for a stage. Steps whose condition is false (or
/// fails to evaluate) get a `skipped` result; the rest are left `None`.
///
/// Kept synchronous so the evaluator never lives across an `.await`.
fn evaluate_conditions(
    stage_idx: usize,
    stage: &Stage,
    ctx: &ExecutionContext,
) -> Vec<Option<StepResult>> {
    let evaluator = WorkflowEvaluator::new();
    let expr_ctx = serde_json::json!({ "request": ctx.request_value() });

    stage
        .steps
        .iter()
        .map(|step| {
            let condition = step.condition.as_deref()?;
            match evaluator.evaluate_bool(condition, &expr_ctx) {
                Ok(true) => None,
                Ok(false) => {
                    tracing::debug!(
                        execution_id = %ctx.execution_id,
                        step = step.name.as_str(),
                        condition,
                        "step condition false, skipping"
                    );
                    Some(StepResult::skipped(
                        &step.name,
                        stage_idx,
                        format!("condition not met: {condition}"),
                    ))
                }
                Err(err) => {
                    tracing::warn!(
                        execution_id = %ctx.execution_id,
                        step = step.name.as_str(),
                        error = %err,
                        "step condition failed to evaluate, skipping"
                    );
                    Some(StepResult::skipped(
                        &step.name,
                        stage_idx,
                        format!("condition error: {err}"),
                    ))
                }
            }
        })
        .collect()
}

fn deadline_error() -> FlowError {
    FlowError {
        kind: FlowErrorKind::DeadlineExceeded,
        message: "overall flow deadline exceeded".to_string(),
    }
}

fn skip_reason(abort: &FlowError) -> String {
    match abort.kind {
        FlowErrorKind::DeadlineExceeded => "deadline exceeded".to_string(),
        FlowErrorKind::CriticalStepFailed => format!("flow aborted: {}", abort.message),
    }
}

/// `failed` if the flow was aborted, `partial` if any (optional) step
/// failed, otherwise `success`.
fn flow_status(results: &[StepResult], abort: Option<&FlowError>) -> FlowStatus {
    if abort.is_some() {
        FlowStatus::Failed
    } else if results.iter().any(|r| r.status == StepStatus::Failed) {
        FlowStatus::Partial
    } else {
        FlowStatus::Success
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use mlorch_types::request::OrchestrationRequest;
    use mlorch_types::workflow::Catalog;
    use serde_json::json;

    use crate::workflow::invoker::TransportError;
    use crate::workflow::testing::{Scripted, ScriptedInvoker};

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<FlowEvent>>);

    impl EventSink for RecordingSink {
        fn emit(&self, event: &FlowEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    impl RecordingSink {
        fn events(&self) -> Vec<FlowEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    fn workflow(yaml: &str) -> WorkflowDefinition {
        let catalog: Catalog = serde_yaml_ng::from_str(yaml).unwrap();
        catalog.workflows.into_iter().next().unwrap()
    }

    fn defaults() -> StepDefaults {
        StepDefaults {
            timeout: Duration::from_secs(10),
            retry_count: 0,
            retry_backoff: Duration::from_millis(100),
        }
    }

    fn executor(
        invoker: &Arc<ScriptedInvoker>,
    ) -> (FlowExecutor<ScriptedInvoker>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let exec = FlowExecutor::new(Arc::clone(invoker), defaults()).with_sink(sink.clone());
        (exec, sink)
    }

    fn ctx(flow: &str) -> ExecutionContext {
        ExecutionContext::new(flow, OrchestrationRequest::new("u1", "s1"))
    }

    fn statuses(result: &FlowResult) -> Vec<(&str, StepStatus)> {
        result
            .results
            .iter()
            .map(|r| (r.step_name.as_str(), r.status))
            .collect()
    }

    const THREE_STAGES: &str = r#"
workflows:
  - name: staged
    selector: "true"
    stages:
      - steps:
          - { name: a, target: a }
          - { name: b, target: b }
      - steps:
          - name: c
            target: c
            input:
              from_a: steps.a.output.value
      - steps:
          - { name: d, target: d }
"#;

    #[tokio::test]
    async fn test_all_success_in_declaration_order() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let reply = Scripted::Ok(json!({"value": 1})).after(Duration::from_millis(30));
        invoker.script("a", vec![reply]);
        invoker.script("b", vec![Scripted::Ok(json!({"value": 2}))]);
        let (exec, _) = executor(&invoker);

        let wf = workflow(THREE_STAGES);
        let result = exec.run(&wf, ctx("staged")).await;

        assert_eq!(result.status, FlowStatus::Success);
        assert!(result.error.is_none());
        assert_eq!(
            statuses(&result),
            vec![
                ("a", StepStatus::Success),
                ("b", StepStatus::Success),
                ("c", StepStatus::Success),
                ("d", StepStatus::Success),
            ]
        );
        assert_eq!(result.summary.successful, 4);

        // The stage-1 step saw the stage-0 output.
        let c_call = invoker.calls().into_iter().find(|c| c.target == "c").unwrap();
        assert_eq!(c_call.payload.get("from_a"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_barrier_orders_step_starts_by_stage() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let reply = Scripted::Ok(json!({"value": 1})).after(Duration::from_millis(50));
        invoker.script("a", vec![reply]);
        invoker.script("b", vec![Scripted::Ok(json!({})).after(Duration::from_millis(5))]);
        let (exec, sink) = executor(&invoker);

        exec.run(&workflow(THREE_STAGES), ctx("staged")).await;

        let events = sink.events();
        let started: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                FlowEvent::StepStarted { stage_index, .. } => Some(*stage_index),
                _ => None,
            })
            .collect();
        assert_eq!(started.len(), 4);
        assert!(started.windows(2).all(|w| w[0] <= w[1]));

        // Every stage-0 step finished before any stage-1 step started.
        let first_stage1_start = events
            .iter()
            .position(|e| matches!(e, FlowEvent::StepStarted { stage_index: 1, .. }))
            .unwrap();
        let last_stage0_finish = events
            .iter()
            .rposition(|e| matches!(e, FlowEvent::StepFinished { stage_index: 0, .. }))
            .unwrap();
        assert!(last_stage0_finish < first_stage1_start);

        assert!(matches!(events.first(), Some(FlowEvent::FlowStarted { .. })));
        assert!(matches!(events.last(), Some(FlowEvent::FlowFinished { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_timeout_aborts_later_stages() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.script("a", vec![Scripted::Hang, Scripted::Hang, Scripted::Hang]);
        let (exec, _) = executor(&invoker);

        let wf = workflow(
            r#"
workflows:
  - name: scenario_b
    selector: "true"
    stages:
      - steps:
          - { name: a, target: a, timeout_secs: 1, retry_count: 2 }
      - steps:
          - { name: b, target: b }
          - { name: c, target: c }
"#,
        );
        let result = exec.run(&wf, ctx("scenario_b")).await;

        assert_eq!(result.status, FlowStatus::Failed);
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(FlowErrorKind::CriticalStepFailed));

        let a = result.step("a").unwrap();
        assert_eq!(a.status, StepStatus::Failed);
        assert_eq!(a.error_kind(), Some(StepErrorKind::Timeout));
        assert_eq!(a.attempts, 3);

        assert_eq!(result.step("b").unwrap().status, StepStatus::Skipped);
        assert_eq!(result.step("c").unwrap().status, StepStatus::Skipped);
        assert_eq!(invoker.call_count("b") + invoker.call_count("c"), 0);
    }

    #[tokio::test]
    async fn test_optional_failure_yields_partial_and_continues() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.script(
            "opt",
            vec![Scripted::Err(TransportError::Status { code: 404, body: None })],
        );
        let (exec, _) = executor(&invoker);

        let wf = workflow(
            r#"
workflows:
  - name: scenario_c
    selector: "true"
    stages:
      - steps:
          - { name: opt, target: opt, criticality: optional }
          - { name: crit, target: crit }
      - steps:
          - { name: after, target: after }
"#,
        );
        let result = exec.run(&wf, ctx("scenario_c")).await;

        assert_eq!(result.status, FlowStatus::Partial);
        assert!(result.error.is_none());
        assert_eq!(
            statuses(&result),
            vec![
                ("opt", StepStatus::Failed),
                ("crit", StepStatus::Success),
                ("after", StepStatus::Success),
            ]
        );
    }

    #[tokio::test]
    async fn test_dependent_of_failed_optional_gets_mapping_error() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.script(
            "up",
            vec![Scripted::Err(TransportError::Status { code: 500, body: None })],
        );
        let (exec, _) = executor(&invoker);

        let wf = workflow(
            r#"
workflows:
  - name: deps
    selector: "true"
    stages:
      - steps:
          - { name: up, target: up, criticality: optional }
      - steps:
          - name: down
            target: down
            criticality: optional
            input:
              x: steps.up.output
"#,
        );
        let result = exec.run(&wf, ctx("deps")).await;

        let down = result.step("down").unwrap();
        assert_eq!(down.status, StepStatus::Failed);
        assert_eq!(down.error_kind(), Some(StepErrorKind::Mapping));
        assert_eq!(invoker.call_count("down"), 0);
        assert_eq!(result.status, FlowStatus::Partial);
    }

    #[tokio::test]
    async fn test_false_condition_skips_without_call() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let (exec, _) = executor(&invoker);

        let wf = workflow(
            r#"
workflows:
  - name: conditional
    selector: "true"
    stages:
      - steps:
          - { name: embed, target: embed, condition: "request.create_user_embedding" }
          - { name: matcher, target: matcher }
"#,
        );
        let result = exec.run(&wf, ctx("conditional")).await;

        assert_eq!(result.status, FlowStatus::Success);
        let embed = result.step("embed").unwrap();
        assert_eq!(embed.status, StepStatus::Skipped);
        assert!(embed.skip_reason.as_deref().unwrap().contains("condition"));
        assert_eq!(invoker.call_count("embed"), 0);
        assert_eq!(result.summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_max_concurrency_bounds_in_flight_calls() {
        let invoker = Arc::new(ScriptedInvoker::new());
        for target in ["s1", "s2", "s3", "s4", "s5"] {
            invoker.script(target, vec![Scripted::Ok(json!({})).after(Duration::from_millis(20))]);
        }
        let (exec, _) = executor(&invoker);

        let wf = workflow(
            r#"
workflows:
  - name: bounded
    selector: "true"
    stages:
      - max_concurrency: 2
        steps:
          - { name: s1, target: s1 }
          - { name: s2, target: s2 }
          - { name: s3, target: s3 }
          - { name: s4, target: s4 }
          - { name: s5, target: s5 }
"#,
        );
        let result = exec.run(&wf, ctx("bounded")).await;

        assert_eq!(result.status, FlowStatus::Success);
        assert_eq!(invoker.total_calls(), 5);
        assert!(invoker.max_in_flight() <= 2);
    }

    #[tokio::test]
    async fn test_critical_failure_cancels_queued_steps_in_stage() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.script(
            "first",
            vec![Scripted::Err(TransportError::Status { code: 400, body: None })],
        );
        invoker.script("second", vec![Scripted::Ok(json!({})).after(Duration::from_millis(10))]);
        let (exec, _) = executor(&invoker);

        let wf = workflow(
            r#"
workflows:
  - name: serial
    selector: "true"
    stages:
      - max_concurrency: 1
        steps:
          - { name: first, target: first }
          - { name: second, target: second }
          - { name: third, target: third }
"#,
        );
        let result = exec.run(&wf, ctx("serial")).await;

        assert_eq!(result.status, FlowStatus::Failed);
        assert_eq!(result.step("first").unwrap().status, StepStatus::Failed);
        // Whatever had not started when the failure landed was skipped.
        assert_eq!(result.step("third").unwrap().status, StepStatus::Skipped);
        assert_eq!(invoker.call_count("third"), 0);
        assert_eq!(result.results.len(), 3);
    }

    #[tokio::test]
    async fn test_in_flight_steps_finish_after_critical_failure() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.script(
            "fast_fail",
            vec![Scripted::Err(TransportError::Status { code: 400, body: None })],
        );
        let reply = Scripted::Ok(json!({"done": true})).after(Duration::from_millis(50));
        invoker.script("slow_ok", vec![reply]);
        let (exec, _) = executor(&invoker);

        let wf = workflow(
            r#"
workflows:
  - name: parallel
    selector: "true"
    stages:
      - steps:
          - { name: fast_fail, target: fast_fail }
          - { name: slow_ok, target: slow_ok, criticality: optional }
"#,
        );
        let result = exec.run(&wf, ctx("parallel")).await;

        assert_eq!(result.status, FlowStatus::Failed);
        let slow = result.step("slow_ok").unwrap();
        assert_eq!(slow.status, StepStatus::Success);
        assert_eq!(slow.output, Some(json!({"done": true})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_skips_remaining_stages() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.script("slow", vec![Scripted::Ok(json!({})).after(Duration::from_secs(5))]);
        let (exec, _) = executor(&invoker);

        let wf = workflow(
            r#"
workflows:
  - name: deadline
    selector: "true"
    deadline_secs: 2
    stages:
      - steps:
          - { name: slow, target: slow, criticality: optional }
      - steps:
          - { name: later, target: later }
"#,
        );
        let result = exec.run(&wf, ctx("deadline")).await;

        assert_eq!(result.status, FlowStatus::Failed);
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(FlowErrorKind::DeadlineExceeded));
        // The in-flight call was allowed to complete.
        assert_eq!(result.step("slow").unwrap().status, StepStatus::Success);
        let later = result.step("later").unwrap();
        assert_eq!(later.status, StepStatus::Skipped);
        assert_eq!(later.skip_reason.as_deref(), Some("deadline exceeded"));
        assert_eq!(invoker.call_count("later"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_passing_in_last_stage_fails_flow() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.script("slow", vec![Scripted::Ok(json!({})).after(Duration::from_secs(5))]);
        let (exec, sink) = executor(&invoker);

        let wf = workflow(
            r#"
workflows:
  - name: single
    selector: "true"
    deadline_secs: 2
    stages:
      - steps:
          - { name: slow, target: slow }
"#,
        );
        let result = exec.run(&wf, ctx("single")).await;

        assert_eq!(result.status, FlowStatus::Failed);
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(FlowErrorKind::DeadlineExceeded));
        assert_eq!(result.step("slow").unwrap().status, StepStatus::Success);
        assert!(sink.events().iter().any(|e| matches!(
            e,
            FlowEvent::FlowFinished { status: FlowStatus::Failed, .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_cut_by_deadline_reports_deadline() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.script(
            "flaky",
            vec![
                Scripted::Err(TransportError::Connection("refused".into())),
                Scripted::Ok(json!({})),
            ],
        );
        let (exec, _) = executor(&invoker);

        let wf = workflow(
            r#"
workflows:
  - name: retry_deadline
    selector: "true"
    deadline_secs: 2
    stages:
      - steps:
          - { name: flaky, target: flaky, retry_count: 1, retry_backoff_ms: 5000 }
      - steps:
          - { name: after, target: after }
"#,
        );
        let result = exec.run(&wf, ctx("retry_deadline")).await;

        assert_eq!(result.status, FlowStatus::Failed);
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(FlowErrorKind::DeadlineExceeded));
        assert_eq!(
            result.step("flaky").unwrap().error_kind(),
            Some(StepErrorKind::DeadlineExceeded)
        );
        assert_eq!(result.step("after").unwrap().skip_reason.as_deref(), Some("deadline exceeded"));
        assert_eq!(invoker.call_count("flaky"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_skips_queued_steps() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.script("one", vec![Scripted::Ok(json!({})).after(Duration::from_secs(5))]);
        let (exec, _) = executor(&invoker);

        let wf = workflow(
            r#"
workflows:
  - name: queued
    selector: "true"
    stages:
      - max_concurrency: 1
        steps:
          - { name: one, target: one, criticality: optional }
          - { name: two, target: two }
"#,
        );
        let deadline = Instant::now() + Duration::from_secs(1);
        let result = exec.run_until(&wf, ctx("queued"), deadline).await;

        assert_eq!(result.status, FlowStatus::Failed);
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(FlowErrorKind::DeadlineExceeded));
        assert_eq!(result.step("one").unwrap().status, StepStatus::Success);
        assert_eq!(result.step("two").unwrap().status, StepStatus::Skipped);
        assert_eq!(invoker.call_count("two"), 0);
    }

    #[tokio::test]
    async fn test_panicking_step_is_internal_failure() {
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker.script("boom", vec![Scripted::Panic]);
        let (exec, _) = executor(&invoker);

        let wf = workflow(
            r#"
workflows:
  - name: panics
    selector: "true"
    stages:
      - steps:
          - { name: boom, target: boom, criticality: optional }
          - { name: fine, target: fine }
"#,
        );
        let result = exec.run(&wf, ctx("panics")).await;

        let boom = result.step("boom").unwrap();
        assert_eq!(boom.status, StepStatus::Failed);
        assert_eq!(boom.error_kind(), Some(StepErrorKind::Internal));
        assert_eq!(result.step("fine").unwrap().status, StepStatus::Success);
        assert_eq!(result.status, FlowStatus::Partial);
    }

    #[tokio::test]
    async fn test_identical_requests_produce_identical_reports() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let (exec, _) = executor(&invoker);
        let wf = workflow(THREE_STAGES);

        let mut req = OrchestrationRequest::new("u1", "s1");
        req.vacancy_id = Some("v-9".to_string());
        invoker.script(
            "a",
            vec![Scripted::Ok(json!({"value": 1})), Scripted::Ok(json!({"value": 1}))],
        );

        let first = exec.run(&wf, ExecutionContext::new("staged", req.clone())).await;
        let second = exec.run(&wf, ExecutionContext::new("staged", req)).await;

        assert_ne!(first.execution_id, second.execution_id);
        assert_eq!(first.status, second.status);
        assert_eq!(first.summary, second.summary);
        assert_eq!(first.echoed, second.echoed);
        assert_eq!(first.echoed.get("vacancy_id"), Some(&json!("v-9")));

        let strip = |r: &FlowResult| -> Vec<StepResult> {
            r.results
                .iter()
                .cloned()
                .map(|mut s| {
                    s.duration_ms = 0;
                    s
                })
                .collect()
        };
        assert_eq!(strip(&first), strip(&second));
    }

    #[tokio::test]
    async fn test_default_first_login_applies_skip_rules() {
        let catalog = crate::workflow::catalog::default_catalog().unwrap();
        let wf = catalog.get("first_login").unwrap();
        let invoker = Arc::new(ScriptedInvoker::new());
        let (exec, _) = executor(&invoker);

        let mut req = OrchestrationRequest::new("u1", "s1");
        req.vacancy_id = Some("v-1".to_string());
        req.position_id = Some("p-1".to_string());
        req.career_name = Some("Data".to_string());
        req.process_vacancy_orchestrator = false;
        req.extra.insert("match_user_career_token".to_string(), json!("tok"));

        let result = exec.run(wf, ExecutionContext::new("first_login", req)).await;

        assert_eq!(result.status, FlowStatus::Success);
        for skipped in [
            "match_usuario_profissao",
            "match_candidato",
            "match_usuario_carreira",
            "match_analysis_user_vacancy",
            "gap_analysis_user_vacancy",
            "suggest_course_vacancy",
        ] {
            assert_eq!(result.step(skipped).unwrap().status, StepStatus::Skipped, "{skipped}");
        }
        assert_eq!(invoker.total_calls(), 3);

        let call = invoker
            .calls()
            .into_iter()
            .find(|c| c.target == "gap_analysis_user_profession")
            .unwrap();
        assert_eq!(call.payload.get("position_id"), Some(&json!("p-1")));
        assert!(call.payload.get("position_name").is_none());
        assert_eq!(call.bearer_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_flow_status_rules() {
        let ok = StepResult::success("a", 0, json!(1), 1, 1, None);
        let failed = StepResult::failed("b", 0, StepErrorKind::Transport, "x", 1, 1);
        assert_eq!(flow_status(&[ok.clone()], None), FlowStatus::Success);
        assert_eq!(flow_status(&[ok.clone(), failed.clone()], None), FlowStatus::Partial);
        assert_eq!(flow_status(&[ok], Some(&deadline_error())), FlowStatus::Failed);
    }
}
