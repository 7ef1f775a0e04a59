//! Step executor: one remote call with timeout, retry and outcome
//! classification.
//!
//! `execute` never fails past its own boundary. Every failure mode is
//! turned into a `StepResult` with `status = failed` (or `skipped` when the
//! target has no configured endpoint).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use mlorch_types::result::{StepErrorKind, StepResult};
use mlorch_types::workflow::StepSpec;

use super::context::ExecutionContext;
use super::invoker::{RemoteCall, RemoteInvoker, TransportError};
use super::mapping::{build_payload, resolve_bearer_token};
use super::retry::RetryHandler;

/// Skip reason recorded when a target resolves to no URL.
pub const ENDPOINT_NOT_CONFIGURED: &str = "endpoint not configured";

/// Per-step policy values used when a step does not override them.
#[derive(Debug, Clone, Copy)]
pub struct StepDefaults {
    pub timeout: Duration,
    pub retry_count: u32,
    pub retry_backoff: Duration,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            retry_count: 0,
            retry_backoff: Duration::from_millis(1_000),
        }
    }
}

/// Runs a single step against the remote-call collaborator.
pub struct StepExecutor<I> {
    invoker: Arc<I>,
}

impl<I: RemoteInvoker> StepExecutor<I> {
    pub fn new(invoker: Arc<I>) -> Self {
        Self { invoker }
    }

    /// Execute `step` and return its terminal result.
    ///
    /// No retry is started whose backoff would end past `deadline`.
    pub async fn execute(
        &self,
        step: &StepSpec,
        stage_index: usize,
        ctx: &ExecutionContext,
        defaults: &StepDefaults,
        deadline: Instant,
    ) -> StepResult {
        let started = Instant::now();
        let elapsed_ms = || started.elapsed().as_millis() as u64;

        let payload = match build_payload(step, ctx) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(
                    execution_id = %ctx.execution_id,
                    step = step.name.as_str(),
                    error = %err,
                    "input mapping failed"
                );
                return StepResult::failed(
                    &step.name,
                    stage_index,
                    StepErrorKind::Mapping,
                    err.to_string(),
                    0,
                    elapsed_ms(),
                );
            }
        };
        let bearer_token = resolve_bearer_token(step, ctx);

        let timeout = step
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        let retry_count = step.retry_count.unwrap_or(defaults.retry_count);
        let base_backoff = step
            .retry_backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_backoff);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            tracing::debug!(
                execution_id = %ctx.execution_id,
                step = step.name.as_str(),
                target = step.target.as_str(),
                attempt,
                has_auth = bearer_token.is_some(),
                "invoking remote function"
            );

            let call = RemoteCall {
                target: step.target.clone(),
                payload: payload.clone(),
                bearer_token: bearer_token.clone(),
                timeout,
            };
            let outcome = match tokio::time::timeout(timeout, self.invoker.invoke(call)).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => Err(TransportError::Timeout {
                    after_ms: timeout.as_millis() as u64,
                }),
            };

            let err = match outcome {
                Ok(response) => {
                    return StepResult::success(
                        &step.name,
                        stage_index,
                        response.body,
                        attempt,
                        elapsed_ms(),
                        Some(response.status_code),
                    );
                }
                Err(TransportError::Unconfigured(target)) => {
                    tracing::warn!(
                        execution_id = %ctx.execution_id,
                        step = step.name.as_str(),
                        target = target.as_str(),
                        "step url not configured, skipping"
                    );
                    return StepResult::skipped(&step.name, stage_index, ENDPOINT_NOT_CONFIGURED);
                }
                Err(err) => err,
            };

            if RetryHandler::should_retry(&err, attempt, retry_count) {
                let delay = RetryHandler::backoff_delay(base_backoff, attempt);
                if Instant::now() + delay < deadline {
                    tracing::warn!(
                        execution_id = %ctx.execution_id,
                        step = step.name.as_str(),
                        attempt,
                        max_attempts = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                tracing::warn!(
                    execution_id = %ctx.execution_id,
                    step = step.name.as_str(),
                    attempt,
                    "retry would pass the flow deadline, giving up"
                );
                return StepResult::failed(
                    &step.name,
                    stage_index,
                    StepErrorKind::DeadlineExceeded,
                    format!("{err}; no time left to retry before the flow deadline"),
                    attempt,
                    elapsed_ms(),
                )
                .with_status_code(err.status_code());
            }

            return StepResult::failed(
                &step.name,
                stage_index,
                classify(&err),
                err.to_string(),
                attempt,
                elapsed_ms(),
            )
            .with_status_code(err.status_code());
        }
    }
}

/// Map a final transport failure onto the step error taxonomy.
pub fn classify(err: &TransportError) -> StepErrorKind {
    match err {
        TransportError::Timeout { .. } => StepErrorKind::Timeout,
        TransportError::Connection(_) => StepErrorKind::Transport,
        TransportError::Status { code, .. } if (500..600).contains(code) => {
            StepErrorKind::Transport
        }
        TransportError::Status { .. } | TransportError::MalformedBody(_) => {
            StepErrorKind::RemoteRejected
        }
        TransportError::Unconfigured(_) => StepErrorKind::Transport,
    }
}
