//! Orchestration request handling shared by the HTTP surface and the CLI.
//!
//! validate -> duplicate check -> route -> execute -> webhook. Every flow
//! that starts produces a report, whatever its status; only malformed
//! requests and routing misses are errors.

use serde_json::Value;

use mlorch_core::workflow::ExecutionContext;
use mlorch_types::request::{OrchestrationRequest, RequestError};
use mlorch_types::result::FlowResult;

use crate::http::error::AppError;
use crate::state::AppState;

/// Decode a request body, reporting missing or mistyped required fields
/// before any other decoding error.
pub fn parse_request(body: Value) -> Result<OrchestrationRequest, RequestError> {
    let Some(fields) = body.as_object() else {
        return Err(RequestError::Malformed("request body must be a JSON object".to_string()));
    };

    let mut errors = Vec::new();
    for field in ["user_id", "session_id"] {
        match fields.get(field) {
            None | Some(Value::Null) => errors.push(format!("Missing required field: {field}")),
            Some(Value::String(s)) if s.trim().is_empty() => {
                errors.push(format!("Missing required field: {field}"));
            }
            Some(Value::String(_)) => {}
            Some(_) => errors.push(format!("Field '{field}' must be a string")),
        }
    }
    if !errors.is_empty() {
        return Err(RequestError::Invalid(errors));
    }

    OrchestrationRequest::from_json(body)
}

/// Run one orchestration request to completion.
pub async fn orchestrate(state: &AppState, body: Value) -> Result<FlowResult, AppError> {
    let request = parse_request(body)?;

    if let Some(tracker) = &state.dedup {
        if tracker.check_and_record(&request.dedup_key()) {
            tracing::warn!(
                user_id = request.user_id.as_str(),
                session_id = request.session_id.as_str(),
                "duplicate request detected, processing anyway"
            );
        }
    }

    let workflow = state.router.select(&request)?;
    let ctx = ExecutionContext::new(&workflow.name, request);
    let report = state.executor.run(workflow, ctx).await;

    state.webhook.notify(&report).await;
    Ok(report)
}
