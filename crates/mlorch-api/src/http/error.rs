//! Application error type mapping to HTTP status codes and the error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use mlorch_core::workflow::RouterError;
use mlorch_types::request::RequestError;

/// Application-level error that maps to HTTP responses.
///
/// Only caller-input failures live here. A flow that started always yields a
/// report, whatever its status.
#[derive(Debug)]
pub enum AppError {
    /// The request body could not be decoded or failed validation.
    Request(RequestError),
    /// No workflow selector matched the request.
    Route(RouterError),
}

impl From<RequestError> for AppError {
    fn from(e: RequestError) -> Self {
        AppError::Request(e)
    }
}

impl From<RouterError> for AppError {
    fn from(e: RouterError) -> Self {
        AppError::Route(e)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Request(e) => write!(f, "{e}"),
            AppError::Route(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    fn status_and_errors(&self) -> (StatusCode, Vec<(&'static str, String)>) {
        match self {
            AppError::Request(RequestError::Malformed(msg)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                vec![("MALFORMED_REQUEST", msg.clone())],
            ),
            AppError::Request(RequestError::Invalid(messages)) => (
                StatusCode::BAD_REQUEST,
                messages
                    .iter()
                    .map(|m| ("VALIDATION_ERROR", m.clone()))
                    .collect(),
            ),
            AppError::Route(e) => (
                StatusCode::BAD_REQUEST,
                vec![("NO_MATCHING_WORKFLOW", e.to_string())],
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, errors) = self.status_and_errors();

        tracing::info!(status = status.as_u16(), error = %self, "request rejected");

        let body = json!({
            "errors": errors
                .into_iter()
                .map(|(code, message)| json!({ "code": code, "message": message }))
                .collect::<Vec<_>>(),
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
