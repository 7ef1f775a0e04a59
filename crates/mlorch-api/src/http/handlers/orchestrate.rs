//! Orchestration endpoint.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;

use mlorch_types::request::RequestError;
use mlorch_types::result::FlowResult;

use crate::http::error::AppError;
use crate::service;
use crate::state::AppState;

/// POST /orchestrate (and POST /) - run the workflow selected by the request.
///
/// The body is decoded by hand so that JSON syntax errors use the same error
/// envelope as validation failures. Every flow that starts answers 200 with
/// its report, including partial and failed runs.
pub async fn orchestrate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<FlowResult>, AppError> {
    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| RequestError::Malformed(format!("invalid JSON body: {e}")))?;

    let report = service::orchestrate(&state, value).await?;
    Ok(Json(report))
}
